//! Gateway application state.

use std::sync::Arc;

use grendel_auth::JwtValidator;
use grendel_control::ControlPlane;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
///
/// `jwt_validator` must accept the session tokens issued by `control`.
pub struct GatewayState<C, V>
where
    C: ControlPlane,
    V: JwtValidator,
{
    /// Inventory, orchestration, boot and account operations.
    pub control: Arc<C>,
    /// Session token validation and revocation.
    pub jwt_validator: Arc<V>,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl<C, V> GatewayState<C, V>
where
    C: ControlPlane,
    V: JwtValidator,
{
    /// Create a new gateway state.
    #[must_use]
    pub fn new(control: Arc<C>, jwt_validator: Arc<V>, config: GatewayConfig) -> Self {
        Self {
            control,
            jwt_validator,
            config,
        }
    }
}

impl<C, V> Clone for GatewayState<C, V>
where
    C: ControlPlane,
    V: JwtValidator,
{
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            jwt_validator: Arc::clone(&self.jwt_validator),
            config: self.config.clone(),
        }
    }
}

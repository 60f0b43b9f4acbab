//! HTTP API for the grendel provisioning server.
//!
//! This crate exposes the control plane over REST:
//!
//! - Bearer token authentication and per-role authorization
//! - Inventory, boot image, account and role endpoints under `/v1`
//! - BMC fan-out endpoints under `/v1/bmc`
//! - iPXE scripts for network-booting nodes under `/boot`
//! - Problem-details bodies on every error response
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────┐     ┌──────────────────────┐
//! │  CLI / UI clients (Bearer)    │     │  iPXE firmware       │
//! └───────────────────────────────┘     └──────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      grendel-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  AuthUser   │ │   Router    │ │  problem_details    │    │
//! │  │  extractor  │ │  + handlers │ │  middleware         │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!               ┌──────────────┼──────────────┐
//!               ▼              ▼              ▼
//!        ┌──────────┐   ┌──────────┐   ┌──────────┐
//!        │ Control  │   │  Store   │   │  BMCs    │
//!        │ Plane    │   │ (RocksDB)│   │(Redfish) │
//!        └──────────┘   └──────────┘   └──────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use grendel_auth::{AuthConfig, HmacValidator};
//! use grendel_bmc::{BmcConfig, RedfishConnector};
//! use grendel_control::{ControlPlaneService, EngineConfig};
//! use grendel_gateway::{create_router, GatewayConfig, GatewayState};
//! use grendel_store::RocksStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/grendel")?);
//! let auth = AuthConfig::random();
//! let sessions = Arc::new(HmacValidator::new(&auth));
//! let connector = Arc::new(RedfishConnector::new(BmcConfig::default()));
//! let control = Arc::new(ControlPlaneService::new(
//!     store,
//!     connector,
//!     Arc::clone(&sessions),
//!     &auth,
//!     EngineConfig::default(),
//! ));
//!
//! let state = GatewayState::new(control, sessions, GatewayConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ConfigError, GatewayConfig, Settings};
pub use error::{ApiError, Problem};
pub use routes::create_router;
pub use state::GatewayState;

pub use auth::AuthUser;

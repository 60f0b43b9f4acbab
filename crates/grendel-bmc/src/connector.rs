//! Vendor-probing connector.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::client::{BmcClient, BmcConnector};
use crate::dell::DellClient;
use crate::error::{BmcError, Result};
use crate::http::{base_url_for, RedfishHttp, SERVICE_ROOT};
use crate::redfish::RedfishClient;

/// BMC credentials and transport settings shared by every node.
#[derive(Clone, Deserialize)]
pub struct BmcConfig {
    /// Redfish username.
    #[serde(default = "BmcConfig::default_username")]
    pub username: String,
    /// Redfish password.
    #[serde(default)]
    pub password: String,
    /// Accept self-signed BMC certificates.
    #[serde(default)]
    pub insecure_tls: bool,
    /// TCP connect timeout.
    #[serde(default = "BmcConfig::default_connect_timeout_seconds")]
    pub connect_timeout_seconds: u64,
    /// Upper bound for a single HTTP request.
    #[serde(default = "BmcConfig::default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl BmcConfig {
    fn default_username() -> String {
        "root".to_string()
    }

    const fn default_connect_timeout_seconds() -> u64 {
        10
    }

    const fn default_request_timeout_seconds() -> u64 {
        300
    }
}

impl Default for BmcConfig {
    fn default() -> Self {
        Self {
            username: Self::default_username(),
            password: String::new(),
            insecure_tls: false,
            connect_timeout_seconds: Self::default_connect_timeout_seconds(),
            request_timeout_seconds: Self::default_request_timeout_seconds(),
        }
    }
}

impl fmt::Debug for BmcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BmcConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure_tls", &self.insecure_tls)
            .field("connect_timeout_seconds", &self.connect_timeout_seconds)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Connector that reads the Redfish service root and picks an adapter.
///
/// BMCs reporting `Vendor: Dell` (or a `Dell` OEM block) get a
/// [`DellClient`]; everything else gets a [`RedfishClient`].
pub struct RedfishConnector {
    config: BmcConfig,
}

impl RedfishConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new(config: BmcConfig) -> Self {
        Self { config }
    }

    fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .use_rustls_tls()
            .danger_accept_invalid_certs(self.config.insecure_tls)
            .connect_timeout(Duration::from_secs(self.config.connect_timeout_seconds))
            .timeout(Duration::from_secs(self.config.request_timeout_seconds))
            .user_agent(concat!("grendel/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BmcError::Config(e.to_string()))
    }

    fn is_dell(root: &Value) -> bool {
        let vendor = root.get("Vendor").and_then(Value::as_str).unwrap_or_default();
        vendor.eq_ignore_ascii_case("dell") || root.pointer("/Oem/Dell").is_some()
    }
}

#[async_trait]
impl BmcConnector for RedfishConnector {
    async fn connect(&self, host: &str) -> Result<Box<dyn BmcClient>> {
        let http = RedfishHttp::new(
            self.build_client()?,
            base_url_for(host),
            &self.config.username,
            &self.config.password,
        );

        let root = http.get(SERVICE_ROOT).await?;
        let client: Box<dyn BmcClient> = if Self::is_dell(&root) {
            Box::new(DellClient::new(http))
        } else {
            Box::new(RedfishClient::discover(http, &root).await?)
        };

        tracing::debug!(host, vendor = client.vendor(), "Connected to BMC");
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vendor_detection() {
        assert!(RedfishConnector::is_dell(&json!({"Vendor": "Dell"})));
        assert!(RedfishConnector::is_dell(&json!({"Oem": {"Dell": {}}})));
        assert!(!RedfishConnector::is_dell(&json!({"Vendor": "HPE"})));
        assert!(!RedfishConnector::is_dell(&json!({})));
    }

    #[test]
    fn debug_hides_password() {
        let config = BmcConfig {
            password: "calvin".to_string(),
            ..BmcConfig::default()
        };
        assert!(!format!("{config:?}").contains("calvin"));
    }
}

//! Gateway configuration types.
//!
//! The server binary builds a [`Settings`] from environment variables; every
//! variable is optional and falls back to the defaults below.

use std::path::PathBuf;
use std::time::Duration;

use grendel_auth::{AuthConfig, AuthError};
use grendel_bmc::BmcConfig;
use grendel_control::EngineConfig;
use serde::Deserialize;
use thiserror::Error;

/// Errors raised while reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A variable is set to a value that cannot be parsed.
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
        /// Parse error.
        reason: String,
    },

    /// The signing secret is unusable.
    #[error("invalid AUTH_SECRET: {0}")]
    Secret(#[from] AuthError),
}

/// Configuration for the HTTP layer.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// RocksDB data directory.
    #[serde(default = "GatewayConfig::default_data_dir")]
    pub data_dir: PathBuf,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds. Must exceed the engine's batch timeout.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Prefix for relative kernel and initrd paths in iPXE scripts.
    #[serde(default)]
    pub boot_base_url: Option<String>,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    fn default_data_dir() -> PathBuf {
        PathBuf::from("/var/lib/grendel")
    }

    const fn default_max_body() -> usize {
        16 * 1024 * 1024 // 16 MB, database restores can be large
    }

    const fn default_request_timeout() -> u64 {
        960
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: Self::default_data_dir(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            boot_base_url: None,
        }
    }
}

/// Everything the server binary needs.
#[derive(Debug, Clone)]
pub struct Settings {
    /// HTTP layer.
    pub gateway: GatewayConfig,
    /// Token signing.
    pub auth: AuthConfig,
    /// True if no `AUTH_SECRET` was given and a random one is in use.
    pub ephemeral_secret: bool,
    /// BMC credentials and transport.
    pub bmc: BmcConfig,
    /// Orchestration tuning.
    pub engine: EngineConfig,
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but malformed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut gateway = GatewayConfig::default();
        if let Some(addr) = get("LISTEN_ADDR") {
            gateway.listen_addr = addr;
        }
        if let Some(dir) = get("DATA_DIR") {
            gateway.data_dir = PathBuf::from(dir);
        }
        gateway.boot_base_url = get("BOOT_BASE_URL");

        let (mut auth, ephemeral_secret) = match get("AUTH_SECRET") {
            Some(secret) => (AuthConfig::from_base64_secret(&secret)?, false),
            None => (AuthConfig::random(), true),
        };
        if let Some(ttl) = parse(&lookup, "TOKEN_TTL_SECONDS")? {
            auth.token_ttl_seconds = ttl;
        }
        if let Some(ttl) = parse(&lookup, "BOOT_TOKEN_TTL_SECONDS")? {
            auth.boot_token_ttl_seconds = ttl;
        }

        let mut bmc = BmcConfig::default();
        if let Some(username) = get("BMC_USERNAME") {
            bmc.username = username;
        }
        if let Some(password) = lookup("BMC_PASSWORD") {
            bmc.password = password;
        }
        if let Some(insecure) = parse(&lookup, "BMC_INSECURE_TLS")? {
            bmc.insecure_tls = insecure;
        }

        let mut engine = EngineConfig::default();
        if let Some(n) = parse(&lookup, "BMC_MAX_CONCURRENCY")? {
            engine.max_concurrency = n;
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "BMC_CONTROL_TIMEOUT_SECONDS")? {
            engine.control_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "BMC_TRANSFER_TIMEOUT_SECONDS")? {
            engine.transfer_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(secs) = parse::<u64, _>(&lookup, "BMC_BATCH_TIMEOUT_SECONDS")? {
            engine.batch_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(retries) = parse(&lookup, "BMC_RETRIES")? {
            engine.retries = retries;
        }
        engine.template_dir = get("TEMPLATE_DIR").map(PathBuf::from);

        // Keep HTTP requests alive for the whole batch.
        let batch_secs = engine.batch_timeout_ms.div_ceil(1000);
        gateway.request_timeout_seconds = gateway.request_timeout_seconds.max(batch_secs + 60);

        Ok(Self {
            gateway,
            auth,
            ephemeral_secret,
            bmc,
            engine,
        })
    }
}

fn parse<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(None);
    };
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => Err(ConfigError::Invalid {
            key,
            value,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.max_body_bytes, 16 * 1024 * 1024);
        assert_eq!(config.request_timeout(), Duration::from_secs(960));
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let settings = settings(&[]).unwrap();
        assert!(settings.ephemeral_secret);
        assert_eq!(settings.engine.max_concurrency, 32);
        assert_eq!(settings.bmc.username, "root");
        assert_eq!(settings.gateway.boot_base_url, None);
    }

    #[test]
    fn environment_overrides() {
        let settings = settings(&[
            ("LISTEN_ADDR", "127.0.0.1:9000"),
            ("AUTH_SECRET", "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY="),
            ("TOKEN_TTL_SECONDS", "3600"),
            ("BMC_USERNAME", "admin"),
            ("BMC_INSECURE_TLS", "true"),
            ("BMC_MAX_CONCURRENCY", "8"),
            ("BMC_CONTROL_TIMEOUT_SECONDS", "10"),
            ("BMC_BATCH_TIMEOUT_SECONDS", "1800"),
            ("BMC_RETRIES", "0"),
            ("TEMPLATE_DIR", "/etc/grendel/templates"),
            ("BOOT_BASE_URL", "http://10.0.0.254"),
        ])
        .unwrap();

        assert_eq!(settings.gateway.listen_addr, "127.0.0.1:9000");
        assert!(!settings.ephemeral_secret);
        assert_eq!(settings.auth.token_ttl_seconds, 3600);
        assert_eq!(settings.bmc.username, "admin");
        assert!(settings.bmc.insecure_tls);
        assert_eq!(settings.engine.max_concurrency, 8);
        assert_eq!(settings.engine.control_timeout_ms, 10_000);
        assert_eq!(settings.engine.retries, 0);
        assert_eq!(
            settings.engine.template_dir,
            Some(PathBuf::from("/etc/grendel/templates"))
        );
        assert_eq!(settings.gateway.request_timeout_seconds, 1860);
        assert_eq!(
            settings.gateway.boot_base_url.as_deref(),
            Some("http://10.0.0.254")
        );
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(matches!(
            settings(&[("BMC_RETRIES", "many")]),
            Err(ConfigError::Invalid { key: "BMC_RETRIES", .. })
        ));
        assert!(matches!(
            settings(&[("AUTH_SECRET", "c2hvcnQ=")]),
            Err(ConfigError::Secret(_))
        ));
    }
}

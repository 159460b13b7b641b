//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the client.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::net::endpoint::{Endpoint, EndpointError};
use crate::resilience::RetryPolicy;

/// Root configuration for the push client.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ClientConfig {
    /// Which gateway to talk to.
    pub endpoint: EndpointConfig,

    /// Client certificate. Required for TLS endpoints.
    pub tls: Option<TlsConfig>,

    /// Per-connection timing and retry behaviour.
    pub connection: ConnectionConfig,

    /// Number of connections and when they connect.
    pub pool: PoolConfig,

    /// Request group defaults.
    pub group: GroupConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Gateway environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// Endpoint selection.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct EndpointConfig {
    /// Well-known gateway to use when `url` is unset.
    pub environment: Environment,

    /// Explicit gateway URL (e.g., "https://api.push.apple.com:443").
    pub url: Option<String>,

    /// Topic used for notifications that do not carry one.
    pub default_topic: Option<String>,
}

impl EndpointConfig {
    /// Resolve to a concrete endpoint.
    pub fn resolve(&self) -> Result<Endpoint, EndpointError> {
        match &self.url {
            Some(url) => Endpoint::parse(url),
            None => Ok(Endpoint::for_environment(
                self.environment == Environment::Production,
            )),
        }
    }
}

/// Client certificate files (PEM).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to the certificate chain.
    pub cert_path: String,

    /// Path to the private key. Defaults to `cert_path` for combined files.
    #[serde(default)]
    pub key_path: Option<String>,
}

/// Connection timing and retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Connect retries before a failure becomes fatal.
    pub connect_retries: u32,

    /// Base retry delay; failure `n` waits `n` times this.
    pub retry_backoff_ms: u64,

    /// Deadline for TCP/TLS setup and again for the peer's SETTINGS.
    pub connect_timeout_ms: u64,

    /// Interval between heartbeat PINGs once connected.
    pub heartbeat_interval_ms: u64,

    /// Deadline for a heartbeat PING acknowledgement.
    pub heartbeat_timeout_ms: u64,

    /// Stream limit assumed when the peer does not declare one.
    pub fallback_max_concurrent_streams: u32,

    /// Start a fresh connect sequence after a retryable fault.
    pub reconnect: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_retries: 5,
            retry_backoff_ms: 5_000,
            connect_timeout_ms: 10_000,
            heartbeat_interval_ms: 10_000,
            heartbeat_timeout_ms: 10_000,
            fallback_max_concurrent_streams: 100,
            reconnect: true,
        }
    }
}

impl ConnectionConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.connect_retries,
            Duration::from_millis(self.retry_backoff_ms),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }
}

/// Connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of connections.
    pub size: usize,

    /// Connect every connection as soon as the pool is built.
    pub connect_on_start: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 1,
            connect_on_start: false,
        }
    }
}

/// Request group configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GroupConfig {
    /// How long `flush` waits for outstanding responses.
    pub timeout_secs: u64,
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self { timeout_secs: 3600 }
    }
}

impl GroupConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json_logs: bool,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_gateway_constants() {
        let config = ClientConfig::default();
        assert_eq!(config.connection.connect_retries, 5);
        assert_eq!(config.connection.retry_policy().delay_for(1), Some(Duration::from_secs(5)));
        assert_eq!(config.connection.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.connection.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(config.connection.heartbeat_timeout(), Duration::from_secs(10));
        assert_eq!(config.group.timeout(), Duration::from_secs(3600));
        assert_eq!(config.pool.size, 1);
        assert_eq!(config.endpoint.resolve().unwrap(), Endpoint::production());
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            [endpoint]
            environment = "development"
            default_topic = "com.example.app"

            [connection]
            connect_retries = 2

            [tls]
            cert_path = "/etc/push/cert.pem"
            "#,
        )
        .unwrap();
        assert_eq!(config.endpoint.resolve().unwrap(), Endpoint::development());
        assert_eq!(config.endpoint.default_topic.as_deref(), Some("com.example.app"));
        assert_eq!(config.connection.connect_retries, 2);
        assert_eq!(config.connection.retry_backoff_ms, 5_000);
        let tls = config.tls.unwrap();
        assert_eq!(tls.cert_path, "/etc/push/cert.pem");
        assert!(tls.key_path.is_none());
    }

    #[test]
    fn explicit_url_wins_over_environment() {
        let endpoint = EndpointConfig {
            environment: Environment::Development,
            url: Some("http://127.0.0.1:9000".into()),
            default_topic: None,
        };
        assert_eq!(endpoint.resolve().unwrap(), Endpoint::new("127.0.0.1", 9000, false));
    }
}

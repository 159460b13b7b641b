//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, pool size > 0)
//! - Check that TLS endpoints have a client certificate configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ClientConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ClientConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a parsed configuration.
pub fn validate_config(config: &ClientConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.endpoint.resolve() {
        Ok(endpoint) => {
            if endpoint.is_tls() && config.tls.is_none() {
                errors.push(ValidationError::new(
                    "tls",
                    "a client certificate is required for TLS endpoints",
                ));
            }
        }
        Err(err) => errors.push(ValidationError::new("endpoint.url", err.to_string())),
    }

    if let Some(tls) = &config.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("tls.cert_path", "must not be empty"));
        }
    }

    let connection = &config.connection;
    for (field, value) in [
        ("connection.connect_timeout_ms", connection.connect_timeout_ms),
        ("connection.heartbeat_interval_ms", connection.heartbeat_interval_ms),
        ("connection.heartbeat_timeout_ms", connection.heartbeat_timeout_ms),
    ] {
        if value == 0 {
            errors.push(ValidationError::new(field, "must be greater than zero"));
        }
    }
    if connection.connect_retries > 0 && connection.retry_backoff_ms == 0 {
        errors.push(ValidationError::new(
            "connection.retry_backoff_ms",
            "must be greater than zero when retries are enabled",
        ));
    }
    if connection.fallback_max_concurrent_streams == 0 {
        errors.push(ValidationError::new(
            "connection.fallback_max_concurrent_streams",
            "must be greater than zero",
        ));
    }

    if config.pool.size == 0 {
        errors.push(ValidationError::new("pool.size", "must be at least 1"));
    }
    if config.group.timeout_secs == 0 {
        errors.push(ValidationError::new("group.timeout_secs", "must be greater than zero"));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::TlsConfig;

    fn valid() -> ClientConfig {
        ClientConfig {
            tls: Some(TlsConfig {
                cert_path: "cert.pem".into(),
                key_path: None,
            }),
            ..ClientConfig::default()
        }
    }

    #[test]
    fn default_with_certificate_is_valid() {
        assert_eq!(validate_config(&valid()), Ok(()));
    }

    #[test]
    fn tls_endpoint_requires_certificate() {
        let errors = validate_config(&ClientConfig::default()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "tls");
    }

    #[test]
    fn cleartext_endpoint_needs_no_certificate() {
        let mut config = ClientConfig::default();
        config.endpoint.url = Some("http://127.0.0.1:8080".into());
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = valid();
        config.connection.connect_timeout_ms = 0;
        config.connection.heartbeat_interval_ms = 0;
        config.pool.size = 0;
        config.endpoint.url = Some("gopher://example.com".into());
        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "endpoint.url",
                "connection.connect_timeout_ms",
                "connection.heartbeat_interval_ms",
                "pool.size"
            ]
        );
        assert_eq!(errors[3].to_string(), "pool.size: must be at least 1");
    }
}

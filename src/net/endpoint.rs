//! Gateway endpoint addressing.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Production push gateway.
pub const PRODUCTION_URL: &str = "https://api.push.apple.com:443";
/// Development (sandbox) push gateway.
pub const DEVELOPMENT_URL: &str = "https://api.development.push.apple.com:443";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unsupported endpoint scheme '{0}' (expected https or http)")]
    UnsupportedScheme(String),

    #[error("endpoint URL has no host")]
    MissingHost,
}

/// Where a connection dials.
///
/// `https` endpoints are reached over TLS; `http` endpoints use
/// prior-knowledge cleartext HTTP/2 and exist for local testing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
    tls: bool,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16, tls: bool) -> Self {
        Self {
            host: host.into(),
            port,
            tls,
        }
    }

    pub fn production() -> Self {
        Self::new("api.push.apple.com", 443, true)
    }

    pub fn development() -> Self {
        Self::new("api.development.push.apple.com", 443, true)
    }

    /// Production or development gateway.
    pub fn for_environment(production: bool) -> Self {
        if production {
            Self::production()
        } else {
            Self::development()
        }
    }

    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let url = Url::parse(input)?;
        let tls = match url.scheme() {
            "https" => true,
            "http" => false,
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };
        let host = url.host_str().ok_or(EndpointError::MissingHost)?;
        let port = url
            .port_or_known_default()
            .unwrap_or(if tls { 443 } else { 80 });
        Ok(Self::new(host, port, tls))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn scheme(&self) -> &'static str {
        if self.tls {
            "https"
        } else {
            "http"
        }
    }

    /// Value for the `:authority` pseudo-header.
    pub fn authority(&self) -> String {
        let default_port = if self.tls { 443 } else { 80 };
        if self.port == default_port {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme(), self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_gateways() {
        assert_eq!(Endpoint::parse(PRODUCTION_URL).unwrap(), Endpoint::production());
        assert_eq!(Endpoint::parse(DEVELOPMENT_URL).unwrap(), Endpoint::development());
        assert_eq!(Endpoint::for_environment(false).host(), "api.development.push.apple.com");
    }

    #[test]
    fn parse_cleartext_with_port() {
        let endpoint: Endpoint = "http://127.0.0.1:8443".parse().unwrap();
        assert!(!endpoint.is_tls());
        assert_eq!(endpoint.port(), 8443);
        assert_eq!(endpoint.authority(), "127.0.0.1:8443");
        assert_eq!(endpoint.to_string(), "http://127.0.0.1:8443");
    }

    #[test]
    fn default_port_omitted_from_authority() {
        let endpoint = Endpoint::parse("https://gateway.example").unwrap();
        assert_eq!(endpoint.port(), 443);
        assert_eq!(endpoint.authority(), "gateway.example");
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Endpoint::parse("ftp://example.com"),
            Err(EndpointError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoint::parse("not a url"),
            Err(EndpointError::InvalidUrl(_))
        ));
    }
}

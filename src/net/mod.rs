//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Connection worker (connect attempt)
//!     → endpoint.rs (host, port, scheme)
//!     → connector.rs (TCP dial, optional TLS handshake with ALPN h2)
//!         tls.rs supplies the rustls ClientConfig with the client certificate
//!     → BoxedIo handed back to the worker
//! ```
//!
//! # Design Decisions
//! - Connectors are trait objects so tests can supply in-memory transports
//! - Connect futures own their inputs, letting the worker race them
//!   against its mailbox without borrowing
//! - A TLS session that does not select `h2` is treated as a connect failure

pub mod connector;
pub mod endpoint;
pub mod tls;

pub use connector::{AsyncIo, BoxedIo, Connector, PlainConnector, TlsConnector};
pub use endpoint::{Endpoint, EndpointError};

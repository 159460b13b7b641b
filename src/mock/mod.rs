//! In-process push gateway for exercising code that sends notifications.
//!
//! # Data Flow
//! ```text
//! mock::client(&connector, &config)
//!     → Client over a pool whose connector is a MockConnector
//!     → each connect attempt: tokio::io::duplex pair
//!         → client half returned to the connection worker
//!         → server half served by MockGateway on its own task
//!
//! MockGateway::serve
//!     → SETTINGS (advertised limit), ack, WINDOW_UPDATE, PONG
//!     → request recorded (path, headers, body, response)
//!     → stubbed response, or 200 echoing apns-id
//! ```
//!
//! # Responsibilities
//! - Speak enough HTTP/2 for the client's connection engine (gateway.rs)
//! - Record requests and rebuild them as notifications
//! - Count connect attempts and refuse the first few on request (connector.rs)
//!
//! # Design Decisions
//! - The real connection engine runs unchanged; only the transport is
//!   swapped
//! - Requests carrying `test-close-connection` make the gateway close the
//!   connection instead of answering

pub mod connector;
pub mod gateway;

use std::sync::Arc;

use crate::client::Client;
use crate::config::ConnectionConfig;
use crate::connection::ConnectionPool;
use crate::net::Endpoint;

pub use connector::MockConnector;
pub use gateway::{GatewayOptions, MockGateway, RecordedRequest, CLOSE_CONNECTION_HEADER};

/// Host the mock endpoint claims to be.
pub const MOCK_HOST: &str = "gateway.test";

/// Topic used by [`client`] when a notification names none.
pub const DEFAULT_TOPIC: &str = "com.example.MockApp";

pub fn endpoint() -> Endpoint {
    Endpoint::new(MOCK_HOST, 443, true)
}

/// A single-connection client whose transports come from `connector`.
///
/// Must be called from within a tokio runtime.
pub fn client(connector: &MockConnector, config: &ConnectionConfig) -> Client {
    let pool = ConnectionPool::new(endpoint(), Arc::new(connector.clone()), config, 1);
    Client::new(pool, Some(DEFAULT_TOPIC.to_string()))
}

//! HTTP/2 push notification client library.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod mock;
pub mod monitor;
pub mod net;
pub mod observability;
pub mod protocol;
pub mod resilience;
pub mod threading;

pub use client::{Client, Notification, RequestGroup};
pub use config::ClientConfig;
pub use connection::{Connection, ConnectionPool, ConnectionState, Request, Response};
pub use error::{Error, Result};

//! Push notification client.
//!
//! # Data Flow
//! ```text
//! Notification
//!     → notification.rs (id, headers, payload layout)
//!     → Client::build_request (POST /3/device/{token})
//!     → ConnectionPool::next().post(request)
//!
//! Client::group(timeout, f)
//!     → group.rs (callbacks keyed by apns-id, registered with the monitor)
//!     → f(&group) submits sends
//!     → flush: done, timeout, or propagated connection failure
//! ```
//!
//! # Design Decisions
//! - The client is a thin translation layer; connections own all I/O
//! - Group callbacks run on the group's own task, never on the submitter
//! - `with_connection` always disconnects, even when the group fails

pub mod group;
pub mod notification;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::connection::{ConnectionPool, Context, Delegate, Request};
use crate::error::{Error, Result, SubmissionError};
use crate::monitor::Monitor;
use crate::net::{tls, Connector, PlainConnector, TlsConnector};

pub use group::{Callback, RequestGroup};
pub use notification::{format_id, generate_id, Notification, APS_KEYS};

/// Group wait used when the caller does not pick one.
pub const DEFAULT_GROUP_TIMEOUT: Duration = Duration::from_secs(3600);

/// Sends notifications over a pool of connections.
#[derive(Debug, Clone)]
pub struct Client {
    pool: ConnectionPool,
    default_topic: Option<String>,
}

impl Client {
    pub fn new(pool: ConnectionPool, default_topic: Option<String>) -> Self {
        Self {
            pool,
            default_topic,
        }
    }

    /// Build the endpoint, connector and pool described by `config`.
    ///
    /// Connects immediately when `pool.connect_on_start` is set.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let endpoint = config.endpoint.resolve()?;
        let connector: Arc<dyn Connector> = if endpoint.is_tls() {
            let Some(tls_config) = &config.tls else {
                return Err(Error::Tls(format!(
                    "{endpoint} requires a client certificate"
                )));
            };
            let client_config = tls::load_client_config(
                Path::new(&tls_config.cert_path),
                tls_config.key_path.as_deref().map(Path::new),
            )?;
            Arc::new(TlsConnector::new(client_config))
        } else {
            Arc::new(PlainConnector)
        };

        let pool = ConnectionPool::new(endpoint, connector, &config.connection, config.pool.size);
        let client = Self::new(pool, config.endpoint.default_topic.clone());
        if config.pool.connect_on_start {
            client.connect()?;
        }
        Ok(client)
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn monitor(&self) -> &Monitor {
        self.pool.monitor()
    }

    pub fn default_topic(&self) -> Option<&str> {
        self.default_topic.as_deref()
    }

    /// Start connecting every pooled connection.
    pub fn connect(&self) -> Result<()> {
        self.pool.connect_all()
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.pool.disconnect_all().await
    }

    pub fn is_connected(&self) -> bool {
        self.pool.is_connected()
    }

    /// The request that delivers `notification`.
    pub fn build_request(&self, notification: &Notification) -> Result<Request> {
        if !notification.is_valid() {
            return Err(SubmissionError::InvalidNotification(format!(
                "token and payload are required (id {})",
                notification.formatted_id()
            ))
            .into());
        }

        let body = serde_json::to_vec(&notification.formatted_payload())
            .map_err(|err| SubmissionError::InvalidNotification(err.to_string()))?;
        let mut request = Request::post(format!("/3/device/{}", notification.token()), body)
            .with_header("apns-expiration", notification.expiration_secs())
            .with_header("apns-id", notification.formatted_id());
        if let Some(priority) = notification.priority() {
            request = request.with_header("apns-priority", priority);
        }
        if let Some(topic) = notification.topic().or(self.default_topic()) {
            request = request.with_header("apns-topic", topic);
        }
        Ok(request)
    }

    /// Send `notification`; `delegate` receives the response on the
    /// connection's worker task.
    pub fn send_notification(
        &self,
        notification: &Notification,
        delegate: Arc<dyn Delegate>,
        context: Option<Context>,
    ) -> Result<()> {
        let mut request = self.build_request(notification)?.with_delegate(delegate);
        if let Some(context) = context {
            request = request.with_context(context);
        }
        self.post(request)
    }

    /// Post a prepared request on the next pooled connection.
    pub fn post(&self, request: Request) -> Result<()> {
        self.pool.next().post(request)
    }

    /// Run `f` with a fresh group, then wait up to `timeout` for every
    /// callback it registered.
    pub async fn group<F, T>(&self, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&RequestGroup) -> Result<T>,
    {
        let group = RequestGroup::new(self.clone());
        let value = f(&group)?;
        group.flush(timeout).await?;
        Ok(value)
    }

    /// Connect, run a group and disconnect again.
    pub async fn with_connection<F, T>(&self, timeout: Duration, f: F) -> Result<T>
    where
        F: FnOnce(&RequestGroup) -> Result<T>,
    {
        self.connect()?;
        let result = self.group(timeout, f).await;
        let disconnected = self.disconnect().await;
        let value = result?;
        disconnected?;
        Ok(value)
    }
}

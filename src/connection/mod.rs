//! Persistent HTTP/2 connections to the push gateway.
//!
//! # Data Flow
//! ```text
//! Connection::post(request)
//!     → mailbox (Command::Post, never blocks)
//!     → worker.rs queue
//!     → drain while active streams < peer limit
//!         → Session::open_stream + send (HEADERS, DATA + END_STREAM)
//!     → transport write
//!
//! transport read
//!     → Session::feed
//!     → SessionEvent::{Headers, Data, StreamClosed}
//!     → Response assembled per stream
//!     → Delegate::handle_response(response, context)
//!     → in-flight counter decremented, queue drained again
//! ```
//!
//! # Responsibilities
//! - Connect with bounded linear backoff (state.rs, resilience::backoff)
//! - Keep concurrently open streams within the peer's advertised limit
//! - Detect half-open connections by PING (heartbeat.rs)
//! - Propagate fatal faults to the pool monitor
//! - Spread requests over interchangeable connections (pool.rs)
//!
//! # Design Decisions
//! - One worker task per connection owns the socket, session and queue;
//!   handles only send commands
//! - Socket reads and writes are both branches of the worker's select
//!   loop; a peer that stops reading cannot hold off deadlines or commands
//! - Queued and in-flight requests are discarded on disconnect or fault,
//!   except after a graceful GOAWAY, where unaccepted streams are requeued
//! - Protocol errors close the connection without retrying
//! - Dropping the last handle stops the worker and closes the socket

mod heartbeat;
pub mod pool;
pub mod request;
pub mod response;
pub mod state;
mod worker;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};

use crate::config::ConnectionConfig;
use crate::error::{Deadline, Error, Result, SubmissionError};
use crate::monitor::Monitor;
use crate::net::{Connector, Endpoint};
use crate::threading::{mailbox, Counter, MailboxSender};

pub use pool::ConnectionPool;
pub use request::{Context, Delegate, Request, CORRELATION_HEADER};
pub use response::{ErrorBody, Response, STATUS_CODES};
pub use state::{ConnectionId, ConnectionState};

use worker::{Command, Worker};

/// Handle to a connection worker. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    id: ConnectionId,
    endpoint: Endpoint,
    commands: MailboxSender<Command>,
    state: watch::Receiver<ConnectionState>,
    in_flight: Counter,
    ping_timeout: Duration,
}

impl Connection {
    /// Spawn the worker for a new, disconnected connection.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        endpoint: Endpoint,
        connector: Arc<dyn Connector>,
        config: &ConnectionConfig,
        monitor: Monitor,
    ) -> Self {
        let id = ConnectionId::next();
        let (commands, inbox) = mailbox();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);
        let in_flight = Counter::new();

        let worker = Worker::new(
            id,
            endpoint.clone(),
            connector,
            config.clone(),
            monitor,
            state_tx,
            in_flight.clone(),
            inbox,
        );
        tokio::spawn(worker.run());

        Self {
            id,
            endpoint,
            commands,
            state,
            in_flight,
            ping_timeout: config.heartbeat_timeout(),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Start connecting. Does nothing if already connecting or connected.
    pub fn connect(&self) -> Result<()> {
        self.submit(Command::Connect)
    }

    /// Close the transport and drop queued requests. Resolves once the
    /// connection is disconnected.
    pub async fn disconnect(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.submit(Command::Disconnect { ack })?;
        done.await.map_err(|_| Error::WorkerStopped)
    }

    /// Disconnect and stop the worker. Later calls on any clone of this
    /// handle fail with [`Error::WorkerStopped`].
    pub async fn shutdown(&self) -> Result<()> {
        let (ack, done) = oneshot::channel();
        self.submit(Command::Shutdown { ack })?;
        done.await.map_err(|_| Error::WorkerStopped)
    }

    /// Queue a request. Never blocks; the response reaches the request's
    /// delegate on the worker task.
    pub fn post(&self, request: Request) -> Result<()> {
        if request.delegate().is_none() {
            return Err(SubmissionError::MissingDelegate.into());
        }
        self.in_flight.increment();
        if self.commands.send(Command::Post(request)).is_err() {
            self.in_flight.decrement();
            return Err(Error::WorkerStopped);
        }
        Ok(())
    }

    /// Send a PING and wait for its acknowledgement, bounded by the
    /// heartbeat timeout.
    pub async fn ping(&self) -> Result<()> {
        let (reply, pong) = oneshot::channel();
        self.submit(Command::Ping { reply })?;
        match tokio::time::timeout(self.ping_timeout, pong).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::WorkerStopped),
            Err(_) => Err(Error::TimedOut {
                deadline: Deadline::Ping,
                after: self.ping_timeout,
            }),
        }
    }

    /// Whether the peer acknowledges a PING within `timeout`.
    pub async fn is_alive(&self, timeout: Duration) -> bool {
        matches!(tokio::time::timeout(timeout, self.ping()).await, Ok(Ok(())))
    }

    /// Wait until the connection reaches [`ConnectionState::Connected`].
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.clone();
        let waited = tokio::time::timeout(timeout, state.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .map(|reached| reached.map(|_| ()));
        match waited {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(Error::WorkerStopped),
            Err(_) => Err(Error::TimedOut {
                deadline: Deadline::Connect,
                after: timeout,
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Requests posted and not yet answered or discarded.
    pub fn in_flight(&self) -> usize {
        self.in_flight.value()
    }

    /// Receiver of the latest state. Transitions made within one worker
    /// turn are coalesced, so intermediate states may never be seen.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    fn submit(&self, command: Command) -> Result<()> {
        self.commands.send(command).map_err(|_| Error::WorkerStopped)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

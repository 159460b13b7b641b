//! Error types shared across the client.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::net::EndpointError;
use crate::protocol::{ErrorCode, ProtocolError};

/// Which deadline expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// Opening the TCP/TLS transport.
    Connect,
    /// Waiting for the peer's SETTINGS after the preface.
    Handshake,
    /// Waiting for a heartbeat PING acknowledgement.
    Heartbeat,
    /// Waiting for a caller-issued PING acknowledgement.
    Ping,
    /// Waiting for a request group to finish.
    Group,
}

impl std::fmt::Display for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Deadline::Connect => "connect",
            Deadline::Handshake => "handshake",
            Deadline::Heartbeat => "heartbeat",
            Deadline::Ping => "ping",
            Deadline::Group => "group",
        };
        f.write_str(name)
    }
}

/// Problems with a single submission. These are raised synchronously to
/// the submitter and never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubmissionError {
    #[error("request has no correlation id")]
    MissingCorrelationId,

    #[error("request has no response delegate")]
    MissingDelegate,

    #[error("request group has already been flushed")]
    GroupFinalized,

    #[error("invalid notification: {0}")]
    InvalidNotification(String),
}

/// Errors produced by connections, groups and the client.
#[derive(Debug, Error)]
pub enum Error {
    /// DNS, TCP or TLS failure while opening the transport.
    #[error("Connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The connect retry budget ran out.
    #[error("Connect failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },

    #[error("Timed out after {after:?} waiting for {deadline}")]
    TimedOut { deadline: Deadline, after: Duration },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The peer closed the transport.
    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Peer sent GOAWAY ({code}, last stream {last_stream_id})")]
    GoAway { code: ErrorCode, last_stream_id: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection is not connected")]
    NotConnected,

    #[error("Submission rejected: {0}")]
    Submission(#[from] SubmissionError),

    /// A connection failure was propagated to a waiting group.
    #[error("Request group aborted: {0}")]
    GroupWait(Arc<Error>),

    /// The background task owning a connection or group has stopped.
    #[error("Worker stopped")]
    WorkerStopped,

    #[error("TLS configuration error: {0}")]
    Tls(String),

    #[error("Invalid endpoint: {0}")]
    Endpoint(#[from] EndpointError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether a fresh connect sequence may recover from this error.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Connect(_)
            | Error::ConnectionClosed
            | Error::GoAway { .. }
            | Error::Io(_) => true,
            Error::TimedOut { deadline, .. } => matches!(
                deadline,
                Deadline::Connect | Deadline::Handshake | Deadline::Heartbeat
            ),
            Error::RetriesExhausted { .. }
            | Error::Protocol(_)
            | Error::NotConnected
            | Error::Submission(_)
            | Error::GroupWait(_)
            | Error::WorkerStopped
            | Error::Tls(_)
            | Error::Endpoint(_) => false,
        }
    }
}

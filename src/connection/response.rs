//! Gateway responses.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::connection::request::CORRELATION_HEADER;
use crate::protocol::{ErrorCode, Headers};

/// Descriptions of the status codes the gateway returns.
pub const STATUS_CODES: [(u16, &str); 9] = [
    (200, "Success"),
    (400, "Bad request"),
    (403, "There was an error with the certificate"),
    (
        405,
        "The request used a bad :method value. Only POST requests are supported",
    ),
    (410, "The device token is no longer active for the topic"),
    (413, "The notification payload was too large"),
    (
        429,
        "The server received too many requests for the same device token",
    ),
    (500, "Internal server error"),
    (503, "The server is shutting down and unavailable"),
];

/// JSON body sent with unsuccessful responses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub reason: Option<String>,
    /// Seconds since the epoch at which the token was last known valid.
    pub timestamp: Option<u64>,
}

/// The outcome of one request: response headers plus raw body.
///
/// `reset` is set when the peer aborted the stream with RST_STREAM
/// instead of answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    headers: Headers,
    body: Vec<u8>,
    reset: Option<ErrorCode>,
}

impl Response {
    pub fn new(headers: Headers, body: Vec<u8>, reset: Option<ErrorCode>) -> Self {
        Self {
            headers,
            body,
            reset,
        }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub(crate) fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn raw_body(&self) -> &[u8] {
        &self.body
    }

    pub fn reset(&self) -> Option<ErrorCode> {
        self.reset
    }

    /// The correlation id echoed by the gateway.
    pub fn id(&self) -> Option<&str> {
        self.headers.get(CORRELATION_HEADER)
    }

    /// The id with separators removed. With `length` the last `length`
    /// digits are returned, otherwise leading zeroes are stripped.
    pub fn unformatted_id(&self, length: Option<usize>) -> Option<String> {
        let digits: String = self.id()?.chars().filter(|c| *c != '-').collect();
        Some(match length {
            Some(length) => {
                let count = digits.chars().count();
                digits.chars().skip(count.saturating_sub(length)).collect()
            }
            None => digits.trim_start_matches('0').to_string(),
        })
    }

    pub fn status(&self) -> Option<u16> {
        self.headers.get(":status")?.parse().ok()
    }

    /// Description of the status code, if it is a known one.
    pub fn message(&self) -> Option<&'static str> {
        let status = self.status()?;
        STATUS_CODES
            .iter()
            .find(|(code, _)| *code == status)
            .map(|(_, message)| *message)
    }

    pub fn is_success(&self) -> bool {
        self.status() == Some(200)
    }

    pub fn is_invalid_token(&self) -> bool {
        self.status() == Some(410)
    }

    /// The parsed JSON error body, if there is one.
    pub fn error_body(&self) -> Option<ErrorBody> {
        if self.body.is_empty() {
            return None;
        }
        serde_json::from_slice(&self.body).ok()
    }

    /// The gateway's reason for rejecting the request.
    pub fn failure_reason(&self) -> Option<String> {
        if self.is_success() {
            return None;
        }
        self.error_body()?.reason
    }

    /// When the token was last confirmed valid. Only present on 410.
    pub fn validity_last_checked_at(&self) -> Option<SystemTime> {
        if !self.is_invalid_token() {
            return None;
        }
        let seconds = self.error_body()?.timestamp?;
        Some(UNIX_EPOCH + Duration::from_secs(seconds))
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "{status} ({})", self.message().unwrap_or("Unknown status"))?,
            None => match self.reset {
                Some(code) => write!(f, "stream reset ({code})")?,
                None => write!(f, "no status")?,
            },
        }
        if !self.is_success() {
            if let Some(reason) = self.failure_reason() {
                write!(f, ": {reason}")?;
            }
        }
        Ok(())
    }
}

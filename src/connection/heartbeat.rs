//! Heartbeat scheduling for half-open connection detection.

use std::time::Duration;

use tokio::time::Instant;

/// What the worker should do when the heartbeat deadline passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Beat {
    /// Send a PING with this payload.
    Send([u8; 8]),
    /// The outstanding PING was not acknowledged in time.
    Expired,
    /// Nothing due yet.
    Idle,
}

/// PING schedule for one connected session.
///
/// Holds no timer itself; the worker sleeps until [`Heartbeat::deadline`]
/// and then calls [`Heartbeat::poll`].
#[derive(Debug)]
pub(crate) struct Heartbeat {
    interval: Duration,
    timeout: Duration,
    next_ping: Option<Instant>,
    outstanding: Option<([u8; 8], Instant)>,
}

impl Heartbeat {
    pub(crate) fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            next_ping: None,
            outstanding: None,
        }
    }

    pub(crate) fn start(&mut self, now: Instant) {
        self.next_ping = Some(now + self.interval);
        self.outstanding = None;
    }

    pub(crate) fn stop(&mut self) {
        self.next_ping = None;
        self.outstanding = None;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.next_ping.is_some()
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Earliest instant at which [`Heartbeat::poll`] has work to do.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        match (self.next_ping, self.outstanding) {
            (Some(next), Some((_, expiry))) => Some(next.min(expiry)),
            (next, outstanding) => next.or(outstanding.map(|(_, expiry)| expiry)),
        }
    }

    pub(crate) fn poll(&mut self, now: Instant) -> Beat {
        if let Some((_, expiry)) = self.outstanding {
            if now >= expiry {
                self.stop();
                return Beat::Expired;
            }
        }
        match self.next_ping {
            Some(at) if now >= at => {
                self.next_ping = Some(now + self.interval);
                if self.outstanding.is_some() {
                    return Beat::Idle;
                }
                let payload: [u8; 8] = rand::random();
                self.outstanding = Some((payload, now + self.timeout));
                Beat::Send(payload)
            }
            _ => Beat::Idle,
        }
    }

    /// Record a PING acknowledgement. Returns `true` if it answered the
    /// outstanding heartbeat.
    pub(crate) fn on_pong(&mut self, payload: [u8; 8]) -> bool {
        match self.outstanding {
            Some((expected, _)) if expected == payload => {
                self.outstanding = None;
                true
            }
            _ => false,
        }
    }
}

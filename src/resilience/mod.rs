//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Connect attempt fails (DNS, TCP, TLS, handshake timeout)
//!     → backoff.rs (delay for this failure count, or budget spent)
//!     → worker schedules the retry on its own timer
//!     → budget spent: failure escalated to the Monitor
//! ```
//!
//! # Design Decisions
//! - Every external wait has a deadline (connect, handshake, heartbeat)
//! - Retries happen inside the connection worker, never by blocking it
//! - A successful handshake resets the failure count

pub mod backoff;

pub use backoff::RetryPolicy;

//! Concurrency primitives used by connections and request groups.
//!
//! # Responsibilities
//! - `counter.rs`: atomic count of requests submitted but not yet answered
//! - `mailbox.rs`: unbounded single-consumer queue feeding a worker task
//!
//! # Design Decisions
//! - Every mutable structure has exactly one owning task; other tasks talk
//!   to it through a mailbox, never through shared locks
//! - Producers never block, so `post()` is safe to call from any context

pub mod counter;
pub mod mailbox;

pub use counter::Counter;
pub use mailbox::{mailbox, Mailbox, MailboxSender};

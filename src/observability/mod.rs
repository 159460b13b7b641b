//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Connections, groups and the client produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Connection id and apns-id flow through every log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;

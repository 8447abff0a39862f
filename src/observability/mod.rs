//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! bulkhead / fallback / transport produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (tracing-subscriber fmt layer)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ids from the envelopes flow into log fields
//! - Metrics are cheap facade calls; no recorder means no cost

pub mod logging;
pub mod metrics;

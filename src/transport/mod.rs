//! Transport subsystem: pooled provider clients with bounded retries.
//!
//! # Data Flow
//! ```text
//! Caller → ConnectionPool::do_request(ctx, provider, request)
//!     → pool.rs lookup (ProviderNotFound if unknown)
//!     → attempt n: backoff.rs delay (n > 1) → in-flight slot → reqwest send
//!     → status < 500 → response
//!     → error / 5xx  → next attempt, or RetriesExhausted with error_counts
//! ```
//!
//! # Design Decisions
//! - One `reqwest::Client` per provider; its pool keeps idle connections
//! - 4xx responses are successes at this layer; callers interpret them
//! - Every wait (backoff, slot, send) races the caller's context

pub mod backoff;
pub mod config;
pub mod pool;
pub mod stats;

pub use backoff::linear_backoff;
pub use config::{PoolConfig, ResolvedPoolConfig};
pub use pool::ConnectionPool;
pub use stats::{PoolStats, ProviderStats};

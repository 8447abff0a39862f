//! Resilience layer for a risk-assessment service.
//!
//! Three independent wrappers around calls to external dependencies:
//!
//! ```text
//!   caller ──▶ Bulkhead::execute ─────────────▶ processor        (admission)
//!   caller ──▶ FallbackStrategy::execute_with_fallback ─▶ primary  (degraded response)
//!   caller ──▶ ConnectionPool::do_request ────▶ provider HTTP    (transport retry)
//! ```
//!
//! Every call takes a [`CallContext`] carrying the caller's cancellation and
//! deadline. The layers compose but do not depend on each other.

pub mod admin;
pub mod bulkhead;
pub mod config;
pub mod context;
pub mod error;
pub mod fallback;
pub mod lifecycle;
pub mod observability;
pub mod stats;
pub mod transport;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadManager, BulkheadRequest, BulkheadResponse, PoolCapacity};
pub use config::ResilienceConfig;
pub use context::CallContext;
pub use error::{BoxError, ResilienceError, ResilienceResult};
pub use fallback::{
    DegradedProvider, FallbackConfig, FallbackHandler, FallbackManager, FallbackRequest,
    FallbackResponse, FallbackStrategy, FallbackType,
};
pub use lifecycle::{ResilienceLayer, Shutdown};
pub use transport::{ConnectionPool, PoolConfig};

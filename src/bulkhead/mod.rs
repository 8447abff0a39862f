//! Bulkhead subsystem.
//!
//! # Data Flow
//! ```text
//! Caller → Bulkhead::execute(ctx, request, processor)
//!     → executor.rs (resolve pool for request.service, lazily)
//!     → pool.rs (admit, queue by priority, or reject)
//!     → processor runs holding a SlotGuard
//!     → stats updated, slot handed to next waiter
//! ```
//!
//! # Design Decisions
//! - One pool per dependency so an overloaded dependency cannot starve others
//! - Rejection and wait timeout are errors; retrying is the caller's call
//! - Slot release is tied to a guard, never to the happy path
//! - Processor failures are counted but never trigger a fallback here

pub mod executor;
pub mod manager;
pub mod pool;
pub mod types;

pub use executor::Bulkhead;
pub use manager::{BulkheadManager, BulkheadReport};
pub use pool::ResourcePool;
pub use types::{
    BulkheadConfig, BulkheadRequest, BulkheadResponse, BulkheadStats, Data, PoolCapacity,
    ResourcePoolStats,
};

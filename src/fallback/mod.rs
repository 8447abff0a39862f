//! Fallback (degraded mode) subsystem.
//!
//! # Data Flow
//! ```text
//! Caller → FallbackStrategy::execute_with_fallback(ctx, request, primary)
//!     → primary ok  → response (fallback_used = false), cache refreshed
//!     → primary err → predicate → handler.rs lookup (enabled?)
//!     → provider.rs (DegradedProvider under handler deadline)
//!     → response tagged fallback_used + fallback_type
//! ```
//!
//! # Design Decisions
//! - Handlers are registered explicitly; there is no implicit default
//! - Degraded logic is pluggable; built-in providers are only defaults
//! - A failed fallback is terminal
//! - Independent of the bulkhead; callers compose the two

pub mod handler;
pub mod manager;
pub mod provider;
pub mod strategy;
pub mod types;

pub use handler::FallbackHandler;
pub use manager::{FallbackManager, FallbackReport};
pub use provider::{builtin_provider, DegradedProvider, FallbackInput, FnProvider};
pub use strategy::{FallbackPredicate, FallbackStrategy};
pub use types::{
    FallbackConfig, FallbackRequest, FallbackResponse, FallbackStats, FallbackType, HandlerStats,
};

//! Error taxonomy for the resilience layer.
//!
//! # Propagation
//! - Lower layers never swallow errors; they classify and forward with the
//!   service/provider and attempt attached.
//! - Callers decide whether `ProcessorFailed` should trigger a fallback.
//! - Configuration errors fail fast and are never retried.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Boxed error returned by caller-supplied processors and degraded providers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by bulkheads, fallback strategies and the connection pool.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// Pool at capacity with no queue room.
    #[error("admission rejected for '{service}': {active}/{max_concurrency} active, queue full ({max_queue_size})")]
    AdmissionRejected {
        service: String,
        active: usize,
        max_concurrency: usize,
        max_queue_size: usize,
    },

    /// Waited past the admission ceiling without getting a slot.
    #[error("admission timeout for '{service}' after {waited:?}")]
    AdmissionTimeout { service: String, waited: Duration },

    /// The wrapped operation itself failed.
    #[error("processor failed for '{service}': {source}")]
    ProcessorFailed {
        service: String,
        #[source]
        source: BoxError,
    },

    /// No handler registered for the service, or it is disabled.
    #[error("fallback unavailable for '{service}': {reason}")]
    FallbackUnavailable { service: String, reason: String },

    /// The degraded path itself failed. Terminal.
    #[error("fallback failed for '{service}' (primary error: {primary_error}): {source}")]
    FallbackFailed {
        service: String,
        primary_error: String,
        #[source]
        source: BoxError,
    },

    /// All attempts used without a response below 500.
    #[error("provider '{provider}' failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        provider: String,
        attempts: u32,
        last_error: String,
    },

    #[error("provider '{0}' not found")]
    ProviderNotFound(String),

    #[error("resource pool '{0}' already exists")]
    DuplicatePool(String),

    #[error("fallback handler for '{0}' already registered")]
    DuplicateFallback(String),

    #[error("provider '{0}' already registered")]
    DuplicateProvider(String),

    /// The caller cancelled while the call was suspended.
    #[error("'{target}' cancelled during {stage}")]
    Cancelled { target: String, stage: &'static str },

    /// The caller's deadline fired while the call was suspended.
    #[error("'{target}' deadline exceeded during {stage}")]
    DeadlineExceeded { target: String, stage: &'static str },

    /// Request could not be prepared for sending (e.g. non-clonable body).
    #[error("invalid request for provider '{provider}': {reason}")]
    InvalidRequest { provider: String, reason: String },

    /// Settings that cannot produce a working pool or client.
    #[error("invalid configuration for '{target}': {reason}")]
    InvalidConfig { target: String, reason: String },

    /// Health probe failed.
    #[error("provider '{provider}' unhealthy: {reason}")]
    Unhealthy { provider: String, reason: String },

    /// HTTP client construction failed.
    #[error("failed to build client for provider '{provider}': {source}")]
    Client {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Result type for resilience operations.
pub type ResilienceResult<T> = Result<T, ResilienceError>;

impl ResilienceError {
    /// True for the backpressure class that callers should surface as
    /// "retry later".
    pub fn is_retry_later(&self) -> bool {
        matches!(
            self,
            ResilienceError::AdmissionRejected { .. } | ResilienceError::AdmissionTimeout { .. }
        )
    }

    /// Suggested HTTP status for the owning API layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResilienceError::AdmissionRejected { .. } | ResilienceError::AdmissionTimeout { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ResilienceError::ProcessorFailed { .. }
            | ResilienceError::FallbackUnavailable { .. }
            | ResilienceError::FallbackFailed { .. }
            | ResilienceError::RetriesExhausted { .. }
            | ResilienceError::Unhealthy { .. } => StatusCode::BAD_GATEWAY,
            ResilienceError::Cancelled { .. } | ResilienceError::DeadlineExceeded { .. } => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ResilienceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ResilienceError::ProviderNotFound(_)
            | ResilienceError::DuplicatePool(_)
            | ResilienceError::DuplicateFallback(_)
            | ResilienceError::DuplicateProvider(_)
            | ResilienceError::InvalidConfig { .. }
            | ResilienceError::Client { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let rejected = ResilienceError::AdmissionRejected {
            service: "sanctions".into(),
            active: 2,
            max_concurrency: 2,
            max_queue_size: 0,
        };
        assert!(rejected.is_retry_later());
        assert_eq!(rejected.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let exhausted = ResilienceError::RetriesExhausted {
            provider: "pep".into(),
            attempts: 3,
            last_error: "status_503".into(),
        };
        assert!(!exhausted.is_retry_later());
        assert_eq!(exhausted.status_code(), StatusCode::BAD_GATEWAY);
        assert!(exhausted.to_string().contains("after 3 attempts"));

        let dup = ResilienceError::DuplicatePool("ml".into());
        assert_eq!(dup.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

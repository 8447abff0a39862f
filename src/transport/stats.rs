//! Connection pool statistics snapshots.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stats::{now_epoch_ms, running_average};

/// Aggregate counters across every provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retry_attempts: u64,
    pub average_latency_ms: f64,
    pub last_request_at_ms: Option<u64>,
    pub providers: usize,
}

/// Counters for one provider. `error_counts` is keyed by `status_<code>` or
/// the transport error text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderStats {
    pub name: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retry_attempts: u64,
    pub average_latency_ms: f64,
    pub last_request_at_ms: Option<u64>,
    pub error_counts: HashMap<String, u64>,
}

/// Mutable counters shared by the global and per-provider views.
#[derive(Debug, Default)]
pub(crate) struct RequestCounters {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub retry_attempts: u64,
    pub average_latency_ms: f64,
    pub latency_samples: u64,
    pub last_request_at_ms: Option<u64>,
    pub error_counts: HashMap<String, u64>,
}

impl RequestCounters {
    pub fn record_request(&mut self) {
        self.total_requests += 1;
        self.last_request_at_ms = Some(now_epoch_ms());
    }

    pub fn record_latency(&mut self, latency: Duration) {
        self.latency_samples += 1;
        self.average_latency_ms =
            running_average(self.average_latency_ms, self.latency_samples, latency);
    }

    pub fn record_failure(&mut self, signature: &str) {
        self.failed_requests += 1;
        *self.error_counts.entry(signature.to_string()).or_insert(0) += 1;
    }

    pub fn pool_stats(&self, providers: usize) -> PoolStats {
        PoolStats {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            retry_attempts: self.retry_attempts,
            average_latency_ms: self.average_latency_ms,
            last_request_at_ms: self.last_request_at_ms,
            providers,
        }
    }

    pub fn provider_stats(&self, name: &str) -> ProviderStats {
        ProviderStats {
            name: name.to_string(),
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            retry_attempts: self.retry_attempts,
            average_latency_ms: self.average_latency_ms,
            last_request_at_ms: self.last_request_at_ms,
            error_counts: self.error_counts.clone(),
        }
    }
}

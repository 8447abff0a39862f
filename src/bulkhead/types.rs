//! Bulkhead configuration, envelopes and statistics snapshots.

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ResilienceError, ResilienceResult};

/// Opaque key-value payload carried through the resilience layer.
pub type Data = HashMap<String, serde_json::Value>;

/// Capacity of a single resource pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolCapacity {
    /// Maximum requests executing at once.
    pub max_concurrency: usize,
    /// Maximum requests waiting for a slot. Zero means reject when full.
    pub max_queue_size: usize,
    /// Admission wait ceiling.
    pub timeout: Duration,
}

impl Default for PoolCapacity {
    fn default() -> Self {
        Self {
            max_concurrency: 10,
            max_queue_size: 50,
            timeout: Duration::from_secs(30),
        }
    }
}

impl PoolCapacity {
    /// A pool with no slots can never admit a request.
    pub fn validate(&self, pool: &str) -> ResilienceResult<()> {
        if self.max_concurrency == 0 {
            return Err(ResilienceError::InvalidConfig {
                target: pool.to_string(),
                reason: "max_concurrency must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Configuration for a bulkhead instance.
#[derive(Debug, Clone, Default)]
pub struct BulkheadConfig {
    /// Capacity used for pools created lazily on first use.
    pub default_capacity: PoolCapacity,
}

/// One unit of work submitted to a bulkhead.
#[derive(Debug, Clone)]
pub struct BulkheadRequest {
    pub id: String,
    pub service: String,
    pub operation: String,
    pub data: Data,
    /// Per-request admission ceiling; the shorter of this and the pool timeout wins.
    pub timeout: Option<Duration>,
    /// Higher values are admitted first when callers are queued.
    pub priority: i32,
    pub created_at: SystemTime,
}

impl BulkheadRequest {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service: service.into(),
            operation: operation.into(),
            data: Data::new(),
            timeout: None,
            priority: 0,
            created_at: SystemTime::now(),
        }
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Result of a successful bulkhead execution.
#[derive(Debug, Clone)]
pub struct BulkheadResponse {
    pub id: String,
    pub service: String,
    pub data: Data,
    pub wait_time: Duration,
    pub process_time: Duration,
}

/// Point-in-time copy of a resource pool's state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePoolStats {
    pub name: String,
    pub max_concurrency: usize,
    pub max_queue_size: usize,
    pub timeout_ms: u64,
    pub active_requests: usize,
    pub queued_requests: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub timed_out_requests: u64,
    pub average_wait_ms: f64,
    pub average_process_ms: f64,
    pub last_request_at_ms: Option<u64>,
}

/// Aggregate counters across every pool of a bulkhead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkheadStats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rejected_requests: u64,
    pub timed_out_requests: u64,
    pub average_wait_ms: f64,
    pub average_process_ms: f64,
}

//! Bulkhead: a registry of resource pools keyed by dependency name.

use std::future::Future;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::bulkhead::pool::ResourcePool;
use crate::bulkhead::types::{
    BulkheadConfig, BulkheadRequest, BulkheadResponse, BulkheadStats, Data, PoolCapacity,
    ResourcePoolStats,
};
use crate::context::CallContext;
use crate::error::{BoxError, ResilienceError, ResilienceResult};
use crate::observability::metrics;
use crate::stats::running_average;

#[derive(Default)]
struct GlobalCounters {
    stats: BulkheadStats,
    completed: u64,
}

/// Admission controller isolating each dependency in its own pool.
pub struct Bulkhead {
    name: String,
    config: BulkheadConfig,
    pools: DashMap<String, Arc<ResourcePool>>,
    counters: Mutex<GlobalCounters>,
}

impl std::fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bulkhead")
            .field("name", &self.name)
            .field("pools", &self.pools.len())
            .finish()
    }
}

impl Bulkhead {
    pub fn new(name: impl Into<String>, config: BulkheadConfig) -> Self {
        Self {
            name: name.into(),
            config,
            pools: DashMap::new(),
            counters: Mutex::new(GlobalCounters::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Register a pool with explicit capacity. Fails if the name is taken,
    /// including by a pool created lazily on first use.
    pub fn create_pool(
        &self,
        name: &str,
        capacity: PoolCapacity,
    ) -> ResilienceResult<Arc<ResourcePool>> {
        capacity.validate(name)?;
        match self.pools.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ResilienceError::DuplicatePool(name.to_string())),
            Entry::Vacant(slot) => {
                tracing::info!(
                    bulkhead = %self.name,
                    pool = %name,
                    max_concurrency = capacity.max_concurrency,
                    max_queue_size = capacity.max_queue_size,
                    timeout_ms = capacity.timeout.as_millis() as u64,
                    "Resource pool created"
                );
                let pool = Arc::new(ResourcePool::new(name, capacity));
                slot.insert(pool.clone());
                Ok(pool)
            }
        }
    }

    pub fn get_pool(&self, name: &str) -> Option<Arc<ResourcePool>> {
        self.pools.get(name).map(|p| p.value().clone())
    }

    /// Existing pool, or one with default capacity created exactly once.
    /// Fails instead of creating a pool that could never admit anything.
    fn pool_for(&self, service: &str) -> ResilienceResult<Arc<ResourcePool>> {
        if let Some(pool) = self.pools.get(service) {
            return Ok(pool.value().clone());
        }
        self.config.default_capacity.validate(service)?;
        Ok(self
            .pools
            .entry(service.to_string())
            .or_insert_with(|| {
                tracing::debug!(bulkhead = %self.name, pool = %service, "Creating default resource pool on first use");
                Arc::new(ResourcePool::new(service, self.config.default_capacity.clone()))
            })
            .value()
            .clone())
    }

    /// Run `processor` inside the pool for `request.service`.
    ///
    /// Rejects immediately when the pool and its queue are full, waits for a
    /// slot otherwise. The slot is released on every exit path.
    pub async fn execute<F, Fut>(
        &self,
        ctx: &CallContext,
        request: BulkheadRequest,
        processor: F,
    ) -> ResilienceResult<BulkheadResponse>
    where
        F: FnOnce(CallContext, BulkheadRequest) -> Fut,
        Fut: Future<Output = Result<Data, BoxError>>,
    {
        let pool = self.pool_for(&request.service)?;
        let id = request.id.clone();
        let service = request.service.clone();

        let (slot, wait_time) = match pool.acquire(ctx, request.timeout, request.priority).await {
            Ok(acquired) => acquired,
            Err(e) => {
                self.record_admission_failure(&e);
                return Err(e);
            }
        };

        let started = Instant::now();
        let outcome = tokio::select! {
            result = processor(ctx.clone(), request) => result.map_err(|source| {
                ResilienceError::ProcessorFailed { service: service.clone(), source }
            }),
            reason = ctx.done() => Err(reason.into_error(&service, "processing")),
        };
        let process_time = started.elapsed();
        drop(slot);

        pool.record_completion(process_time, outcome.is_err());
        self.record_completion(wait_time, process_time, outcome.is_ok());
        metrics::record_bulkhead_process(&service, process_time, outcome.is_err());

        match outcome {
            Ok(data) => Ok(BulkheadResponse {
                id,
                service,
                data,
                wait_time,
                process_time,
            }),
            Err(e) => {
                tracing::debug!(request_id = %id, service = %service, error = %e, "Bulkhead processor failed");
                Err(e)
            }
        }
    }

    fn record_admission_failure(&self, error: &ResilienceError) {
        let mut counters = self.counters.lock();
        match error {
            ResilienceError::AdmissionRejected { .. } => counters.stats.rejected_requests += 1,
            ResilienceError::AdmissionTimeout { .. } => counters.stats.timed_out_requests += 1,
            _ => {}
        }
    }

    fn record_completion(
        &self,
        wait_time: std::time::Duration,
        process_time: std::time::Duration,
        success: bool,
    ) {
        let mut counters = self.counters.lock();
        counters.completed += 1;
        let n = counters.completed;
        let stats = &mut counters.stats;
        stats.total_requests += 1;
        if success {
            stats.successful_requests += 1;
        } else {
            stats.failed_requests += 1;
        }
        stats.average_wait_ms = running_average(stats.average_wait_ms, n, wait_time);
        stats.average_process_ms = running_average(stats.average_process_ms, n, process_time);
    }

    /// Aggregate statistics across all pools.
    pub fn get_stats(&self) -> BulkheadStats {
        self.counters.lock().stats.clone()
    }

    pub fn get_pool_stats(&self, name: &str) -> Option<ResourcePoolStats> {
        self.pools.get(name).map(|p| p.stats())
    }

    /// Snapshot of every pool, sorted by name.
    pub fn all_pool_stats(&self) -> Vec<ResourcePoolStats> {
        let mut all: Vec<_> = self.pools.iter().map(|p| p.stats()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub fn list_pools(&self) -> Vec<String> {
        let mut names: Vec<_> = self.pools.iter().map(|p| p.key().clone()).collect();
        names.sort();
        names
    }

    /// Zero one pool's counters. Returns false if the pool does not exist.
    pub fn reset_stats(&self, name: &str) -> bool {
        match self.pools.get(name) {
            Some(pool) => {
                pool.reset_stats();
                true
            }
            None => false,
        }
    }

    /// Zero every pool's counters and the aggregate.
    pub fn reset_all_stats(&self) {
        for pool in self.pools.iter() {
            pool.reset_stats();
        }
        *self.counters.lock() = GlobalCounters::default();
    }
}

//! Resource pool: the per-dependency admission unit.
//!
//! # Admission
//! ```text
//! active < max_concurrency            → granted immediately
//! active == max, queued < max_queue   → enqueue waiter (priority, FIFO)
//! active == max, queue full           → rejected (rejected_requests += 1)
//! ```
//!
//! Releasing a slot hands it straight to the highest-priority waiter, so
//! `active` only drops when nobody is queued. All admission state lives
//! under one mutex per pool, which keeps `0 <= active <= max_concurrency`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::bulkhead::types::{PoolCapacity, ResourcePoolStats};
use crate::context::CallContext;
use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::metrics;
use crate::stats::{now_epoch_ms, running_average};

/// A caller parked until a slot is handed to it.
struct Waiter {
    priority: i32,
    seq: u64,
    tx: oneshot::Sender<()>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    // Max-heap: higher priority first, then lower sequence (earlier arrival).
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct PoolState {
    active: usize,
    waiters: BinaryHeap<Waiter>,
    next_seq: u64,

    total_requests: u64,
    completed_requests: u64,
    failed_requests: u64,
    rejected_requests: u64,
    timed_out_requests: u64,
    average_wait_ms: f64,
    average_process_ms: f64,
    last_request_at_ms: Option<u64>,
}

enum Admission {
    Granted,
    Queued(QueuedTicket),
    Rejected { active: usize },
}

/// Per-dependency concurrency and queue limiter.
pub struct ResourcePool {
    name: String,
    capacity: PoolCapacity,
    state: Mutex<PoolState>,
}

impl std::fmt::Debug for ResourcePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePool")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("active", &self.active_requests())
            .finish()
    }
}

impl ResourcePool {
    pub fn new(name: impl Into<String>, capacity: PoolCapacity) -> Self {
        Self {
            name: name.into(),
            capacity,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> &PoolCapacity {
        &self.capacity
    }

    /// Requests currently holding a slot.
    pub fn active_requests(&self) -> usize {
        self.state.lock().active
    }

    /// Requests currently parked waiting for a slot.
    pub fn queued_requests(&self) -> usize {
        self.state.lock().waiters.len()
    }

    /// Wait for a slot, honouring the pool timeout, the optional per-request
    /// timeout and the caller's context. Returns the slot and the time spent
    /// waiting.
    pub(crate) async fn acquire(
        self: &Arc<Self>,
        ctx: &CallContext,
        request_timeout: Option<Duration>,
        priority: i32,
    ) -> ResilienceResult<(SlotGuard, Duration)> {
        let start = Instant::now();

        if let Some(reason) = ctx.done_reason() {
            return Err(reason.into_error(&self.name, "admission"));
        }

        let mut ticket = match self.admit(priority) {
            Admission::Granted => {
                let waited = start.elapsed();
                self.record_admitted(waited);
                return Ok((SlotGuard::new(self.clone()), waited));
            }
            Admission::Rejected { active } => {
                tracing::warn!(
                    service = %self.name,
                    active,
                    max_concurrency = self.capacity.max_concurrency,
                    "Bulkhead rejected request: pool and queue full"
                );
                metrics::record_bulkhead_admission(&self.name, "rejected");
                return Err(ResilienceError::AdmissionRejected {
                    service: self.name.clone(),
                    active,
                    max_concurrency: self.capacity.max_concurrency,
                    max_queue_size: self.capacity.max_queue_size,
                });
            }
            Admission::Queued(ticket) => ticket,
        };

        let wait_limit = match request_timeout {
            Some(t) if t < self.capacity.timeout => t,
            _ => self.capacity.timeout,
        };

        tracing::debug!(service = %self.name, priority, "Waiting for bulkhead slot");

        tokio::select! {
            granted = &mut ticket.rx => {
                match granted {
                    Ok(()) => {
                        ticket.resolved = true;
                        let waited = start.elapsed();
                        self.record_admitted(waited);
                        Ok((SlotGuard::new(self.clone()), waited))
                    }
                    // Sender dropped without a grant; treat as a timeout.
                    Err(_) => {
                        let waited = start.elapsed();
                        drop(ticket);
                        self.record_timeout(waited);
                        Err(ResilienceError::AdmissionTimeout { service: self.name.clone(), waited })
                    }
                }
            }
            _ = tokio::time::sleep(wait_limit) => {
                let waited = start.elapsed();
                drop(ticket);
                self.record_timeout(waited);
                Err(ResilienceError::AdmissionTimeout { service: self.name.clone(), waited })
            }
            reason = ctx.done() => {
                drop(ticket);
                metrics::record_bulkhead_admission(&self.name, "cancelled");
                Err(reason.into_error(&self.name, "admission"))
            }
        }
    }

    fn admit(self: &Arc<Self>, priority: i32) -> Admission {
        let mut state = self.state.lock();
        if state.active < self.capacity.max_concurrency {
            state.active += 1;
            return Admission::Granted;
        }
        if state.waiters.len() < self.capacity.max_queue_size {
            let seq = state.next_seq;
            state.next_seq += 1;
            let (tx, rx) = oneshot::channel();
            state.waiters.push(Waiter { priority, seq, tx });
            return Admission::Queued(QueuedTicket {
                pool: self.clone(),
                seq,
                rx,
                resolved: false,
            });
        }
        state.rejected_requests += 1;
        Admission::Rejected {
            active: state.active,
        }
    }

    /// Hand the slot to the next live waiter, or free it.
    fn release(&self) {
        let mut state = self.state.lock();
        while let Some(waiter) = state.waiters.pop() {
            if waiter.tx.send(()).is_ok() {
                return;
            }
        }
        state.active = state.active.saturating_sub(1);
        metrics::record_bulkhead_active(&self.name, state.active);
    }

    fn record_admitted(&self, waited: Duration) {
        let mut state = self.state.lock();
        state.total_requests += 1;
        state.average_wait_ms = running_average(state.average_wait_ms, state.total_requests, waited);
        state.last_request_at_ms = Some(now_epoch_ms());
        metrics::record_bulkhead_active(&self.name, state.active);
        drop(state);
        metrics::record_bulkhead_admission(&self.name, "admitted");
        metrics::record_bulkhead_wait(&self.name, waited);
    }

    fn record_timeout(&self, waited: Duration) {
        self.state.lock().timed_out_requests += 1;
        tracing::warn!(service = %self.name, waited_ms = waited.as_millis() as u64, "Bulkhead admission timed out");
        metrics::record_bulkhead_admission(&self.name, "timeout");
    }

    pub(crate) fn record_completion(&self, process_time: Duration, failed: bool) {
        let mut state = self.state.lock();
        state.completed_requests += 1;
        state.average_process_ms =
            running_average(state.average_process_ms, state.completed_requests, process_time);
        if failed {
            state.failed_requests += 1;
        }
    }

    /// Zero the counters; capacity and in-flight slots are untouched.
    pub fn reset_stats(&self) {
        let mut state = self.state.lock();
        state.total_requests = 0;
        state.completed_requests = 0;
        state.failed_requests = 0;
        state.rejected_requests = 0;
        state.timed_out_requests = 0;
        state.average_wait_ms = 0.0;
        state.average_process_ms = 0.0;
        state.last_request_at_ms = None;
    }

    pub fn stats(&self) -> ResourcePoolStats {
        let state = self.state.lock();
        ResourcePoolStats {
            name: self.name.clone(),
            max_concurrency: self.capacity.max_concurrency,
            max_queue_size: self.capacity.max_queue_size,
            timeout_ms: self.capacity.timeout.as_millis() as u64,
            active_requests: state.active,
            queued_requests: state.waiters.len(),
            total_requests: state.total_requests,
            failed_requests: state.failed_requests,
            rejected_requests: state.rejected_requests,
            timed_out_requests: state.timed_out_requests,
            average_wait_ms: state.average_wait_ms,
            average_process_ms: state.average_process_ms,
            last_request_at_ms: state.last_request_at_ms,
        }
    }
}

/// A queued admission. Dropping it unresolved removes the waiter, or gives
/// back a slot that was handed over concurrently.
struct QueuedTicket {
    pool: Arc<ResourcePool>,
    seq: u64,
    rx: oneshot::Receiver<()>,
    resolved: bool,
}

impl Drop for QueuedTicket {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }
        let still_queued = {
            let mut state = self.pool.state.lock();
            let before = state.waiters.len();
            let seq = self.seq;
            state.waiters.retain(|w| w.seq != seq);
            state.waiters.len() != before
        };
        if !still_queued && self.rx.try_recv().is_ok() {
            self.pool.release();
        }
    }
}

/// RAII slot. Releases exactly once on drop, including during unwinding.
#[derive(Debug)]
pub(crate) struct SlotGuard {
    pool: Arc<ResourcePool>,
}

impl SlotGuard {
    fn new(pool: Arc<ResourcePool>) -> Self {
        Self { pool }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.pool.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(max_concurrency: usize, max_queue_size: usize) -> Arc<ResourcePool> {
        Arc::new(ResourcePool::new(
            "sanctions",
            PoolCapacity {
                max_concurrency,
                max_queue_size,
                timeout: Duration::from_millis(200),
            },
        ))
    }

    #[tokio::test]
    async fn test_guard_releases_slot() {
        let p = pool(1, 0);
        let ctx = CallContext::new();
        let (guard, _) = p.acquire(&ctx, None, 0).await.unwrap();
        assert_eq!(p.active_requests(), 1);
        drop(guard);
        assert_eq!(p.active_requests(), 0);
    }

    #[tokio::test]
    async fn test_reject_when_queue_is_zero() {
        let p = pool(1, 0);
        let ctx = CallContext::new();
        let (_guard, _) = p.acquire(&ctx, None, 0).await.unwrap();

        let started = std::time::Instant::now();
        let err = p.acquire(&ctx, None, 0).await.unwrap_err();
        assert!(matches!(err, ResilienceError::AdmissionRejected { .. }));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(p.stats().rejected_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_waiter_times_out() {
        let p = pool(1, 1);
        let ctx = CallContext::new();
        let (_guard, _) = p.acquire(&ctx, None, 0).await.unwrap();

        let err = p.acquire(&ctx, None, 0).await.unwrap_err();
        assert!(matches!(err, ResilienceError::AdmissionTimeout { .. }));
        let stats = p.stats();
        assert_eq!(stats.timed_out_requests, 1);
        assert_eq!(stats.queued_requests, 0);
        assert_eq!(stats.active_requests, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_shortens_wait() {
        let p = pool(1, 1);
        let ctx = CallContext::new();
        let (_guard, _) = p.acquire(&ctx, None, 0).await.unwrap();

        let started = Instant::now();
        let err = p
            .acquire(&ctx, Some(Duration::from_millis(20)), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::AdmissionTimeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_release_hands_slot_to_waiter() {
        let p = pool(1, 4);
        let ctx = CallContext::new();
        let (guard, _) = p.acquire(&ctx, None, 0).await.unwrap();

        let p2 = p.clone();
        let waiter = tokio::spawn(async move {
            let ctx = CallContext::new();
            let (g, waited) = p2.acquire(&ctx, None, 0).await.unwrap();
            drop(g);
            waited
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(p.queued_requests(), 1);
        drop(guard);

        let waited = waiter.await.unwrap();
        assert!(waited >= Duration::from_millis(10));
        assert_eq!(p.active_requests(), 0);
        assert_eq!(p.queued_requests(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_queued() {
        let p = pool(1, 4);
        let holder = CallContext::new();
        let (_guard, _) = p.acquire(&holder, None, 0).await.unwrap();

        let ctx = CallContext::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = p.acquire(&ctx, None, 0).await.unwrap_err();
        assert!(matches!(err, ResilienceError::Cancelled { .. }));
        assert_eq!(p.queued_requests(), 0);
        assert_eq!(p.active_requests(), 1);
    }

    #[tokio::test]
    async fn test_reset_keeps_capacity() {
        let p = pool(3, 2);
        let ctx = CallContext::new();
        let (g, _) = p.acquire(&ctx, None, 0).await.unwrap();
        drop(g);
        p.reset_stats();
        let stats = p.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.max_concurrency, 3);
        assert_eq!(stats.max_queue_size, 2);
    }
}

//! Fallback handler: one registered degraded path per service.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::bulkhead::types::Data;
use crate::fallback::provider::{builtin_provider, DegradedProvider};
use crate::fallback::types::{FallbackRequest, FallbackType, HandlerStats};
use crate::stats::{now_epoch_ms, running_average};

struct CachedEntry {
    data: Data,
    stored_at: Instant,
}

#[derive(Default)]
struct HandlerCounters {
    total_requests: u64,
    fallback_requests: u64,
    successful_fallbacks: u64,
    failed_fallbacks: u64,
    average_fallback_ms: f64,
    last_fallback_at_ms: Option<u64>,
}

/// Degraded-mode handler for a single service.
pub struct FallbackHandler {
    service: String,
    fallback_type: FallbackType,
    enabled: AtomicBool,
    timeout: Option<Duration>,
    cache_ttl: Option<Duration>,
    provider: Arc<dyn DegradedProvider>,
    cache: DashMap<String, CachedEntry>,
    counters: Mutex<HandlerCounters>,
}

impl std::fmt::Debug for FallbackHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackHandler")
            .field("service", &self.service)
            .field("fallback_type", &self.fallback_type)
            .field("enabled", &self.is_enabled())
            .field("timeout", &self.timeout)
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl FallbackHandler {
    /// Enabled handler using the built-in provider for `fallback_type`.
    pub fn new(service: impl Into<String>, fallback_type: FallbackType) -> Self {
        Self {
            service: service.into(),
            fallback_type,
            enabled: AtomicBool::new(true),
            timeout: None,
            cache_ttl: None,
            provider: builtin_provider(fallback_type),
            cache: DashMap::new(),
            counters: Mutex::new(HandlerCounters::default()),
        }
    }

    /// Replace the built-in provider with caller-supplied degraded logic.
    pub fn with_provider(mut self, provider: Arc<dyn DegradedProvider>) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Remember successful primary results for `ttl` and hand them to the provider.
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn with_enabled(self, enabled: bool) -> Self {
        self.enabled.store(enabled, Ordering::Relaxed);
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn fallback_type(&self) -> FallbackType {
        self.fallback_type
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn provider(&self) -> &Arc<dyn DegradedProvider> {
        &self.provider
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_ttl.is_some()
    }

    pub(crate) fn store(&self, request: &FallbackRequest, data: Data) {
        if self.cache_ttl.is_none() {
            return;
        }
        self.cache.insert(
            request.cache_key(),
            CachedEntry {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Fresh cached result for the request; expired entries are evicted.
    pub(crate) fn cached(&self, request: &FallbackRequest) -> Option<Data> {
        let ttl = self.cache_ttl?;
        let key = request.cache_key();
        let fresh = self
            .cache
            .get(&key)
            .map(|entry| (entry.stored_at.elapsed() <= ttl, entry.data.clone()));
        match fresh {
            Some((true, data)) => Some(data),
            Some((false, _)) => {
                self.cache.remove(&key);
                None
            }
            None => None,
        }
    }

    pub(crate) fn record_request(&self) {
        self.counters.lock().total_requests += 1;
    }

    pub(crate) fn record_fallback(&self, elapsed: Duration, success: bool) {
        let mut counters = self.counters.lock();
        counters.fallback_requests += 1;
        if success {
            counters.successful_fallbacks += 1;
            counters.average_fallback_ms = running_average(
                counters.average_fallback_ms,
                counters.successful_fallbacks,
                elapsed,
            );
            counters.last_fallback_at_ms = Some(now_epoch_ms());
        } else {
            counters.failed_fallbacks += 1;
        }
    }

    pub fn stats(&self) -> HandlerStats {
        let counters = self.counters.lock();
        HandlerStats {
            service: self.service.clone(),
            fallback_type: self.fallback_type,
            enabled: self.is_enabled(),
            cache_enabled: self.cache_enabled(),
            cached_entries: self.cache.len(),
            total_requests: counters.total_requests,
            fallback_requests: counters.fallback_requests,
            successful_fallbacks: counters.successful_fallbacks,
            failed_fallbacks: counters.failed_fallbacks,
            average_fallback_ms: counters.average_fallback_ms,
            last_fallback_at_ms: counters.last_fallback_at_ms,
        }
    }
}

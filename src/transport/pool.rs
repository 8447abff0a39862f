//! Connection pool: one pooled HTTP client per provider with bounded retries.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::Mutex;
use reqwest::{Client, Request, Response};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::context::CallContext;
use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::metrics;
use crate::transport::backoff::linear_backoff;
use crate::transport::config::{PoolConfig, ResolvedPoolConfig};
use crate::transport::stats::{PoolStats, ProviderStats, RequestCounters};

struct ProviderEntry {
    name: String,
    config: ResolvedPoolConfig,
    client: Client,
    /// Caps requests in flight to `max_conns_per_host`. Closed on removal.
    in_flight: Semaphore,
    counters: Mutex<RequestCounters>,
}

/// Registry of provider clients plus global and per-provider statistics.
#[derive(Default)]
pub struct ConnectionPool {
    providers: DashMap<String, Arc<ProviderEntry>>,
    counters: Mutex<RequestCounters>,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("providers", &self.list_providers())
            .finish()
    }
}

fn build_client(provider: &str, config: &ResolvedPoolConfig) -> ResilienceResult<Client> {
    let mut builder = Client::builder()
        .pool_max_idle_per_host(config.idle_per_host())
        .pool_idle_timeout(config.idle_conn_timeout)
        .timeout(config.timeout);
    if config.no_proxy {
        builder = builder.no_proxy();
    }
    builder.build().map_err(|source| ResilienceError::Client {
        provider: provider.to_string(),
        source,
    })
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `name` with its own client. A second registration fails and
    /// leaves the first client in place.
    pub fn add_provider(&self, name: &str, config: PoolConfig) -> ResilienceResult<()> {
        let resolved = config.resolve(name)?;
        match self.providers.entry(name.to_string()) {
            Entry::Occupied(_) => Err(ResilienceError::DuplicateProvider(name.to_string())),
            Entry::Vacant(slot) => {
                let client = build_client(name, &resolved)?;
                tracing::info!(
                    provider = %name,
                    max_conns_per_host = resolved.max_conns_per_host,
                    max_retries = resolved.max_retries,
                    timeout_ms = resolved.timeout.as_millis() as u64,
                    "Provider registered"
                );
                slot.insert(Arc::new(ProviderEntry {
                    name: name.to_string(),
                    in_flight: Semaphore::new(resolved.max_conns_per_host),
                    config: resolved,
                    client,
                    counters: Mutex::new(RequestCounters::default()),
                }));
                Ok(())
            }
        }
    }

    /// Drop the provider's client. Requests already sending keep their handle
    /// and finish; requests waiting for a connection slot fail.
    pub fn remove_provider(&self, name: &str) -> ResilienceResult<()> {
        let (_, entry) = self
            .providers
            .remove(name)
            .ok_or_else(|| ResilienceError::ProviderNotFound(name.to_string()))?;
        entry.in_flight.close();
        tracing::info!(provider = %name, "Provider removed");
        Ok(())
    }

    /// Remove every provider.
    pub fn close(&self) {
        let names = self.list_providers();
        for name in &names {
            if let Some((_, entry)) = self.providers.remove(name) {
                entry.in_flight.close();
            }
        }
        tracing::info!(providers = names.len(), "Connection pool closed");
    }

    /// Send `request` to `provider`, retrying transport errors and 5xx
    /// responses up to `max_retries` times with linear backoff.
    ///
    /// Any status below 500 is a success and is returned as-is. A request
    /// whose body cannot be cloned is sent once.
    pub async fn do_request(
        &self,
        ctx: &CallContext,
        provider: &str,
        request: Request,
    ) -> ResilienceResult<Response> {
        let entry = self.entry(provider)?;
        self.counters.lock().record_request();
        entry.counters.lock().record_request();

        let max_attempts = entry.config.max_retries.saturating_add(1);
        let mut pending = Some(request);
        let mut attempts = 0;
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                if pending.is_none() {
                    tracing::debug!(provider = %provider, "Request body is not replayable");
                    break;
                }
                let delay = linear_backoff(attempt, entry.config.retry_delay);
                tracing::debug!(
                    provider = %provider,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying provider request"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    reason = ctx.done() => {
                        return Err(self.abort(&entry, reason.into_error(provider, "retry backoff")));
                    }
                }
                // Counted only once the retry is actually sent.
                self.counters.lock().retry_attempts += 1;
                entry.counters.lock().retry_attempts += 1;
                metrics::record_provider_retry(provider);
            }

            let outgoing = match pending.as_ref().and_then(Request::try_clone) {
                Some(copy) if attempt < max_attempts => copy,
                _ => pending.take().ok_or_else(|| ResilienceError::InvalidRequest {
                    provider: provider.to_string(),
                    reason: "request already consumed".to_string(),
                })?,
            };

            let permit = tokio::select! {
                permit = entry.in_flight.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(self.abort(&entry, ResilienceError::ProviderNotFound(provider.to_string())));
                    }
                },
                reason = ctx.done() => {
                    return Err(self.abort(&entry, reason.into_error(provider, "connection wait")));
                }
            };

            attempts = attempt;
            let started = Instant::now();
            let result = tokio::select! {
                result = entry.client.execute(outgoing) => result,
                reason = ctx.done() => {
                    return Err(self.abort(&entry, reason.into_error(provider, "request")));
                }
            };
            drop(permit);

            let latency = started.elapsed();
            self.counters.lock().record_latency(latency);
            entry.counters.lock().record_latency(latency);
            metrics::record_provider_latency(provider, latency);

            match result {
                Ok(response) if response.status().as_u16() < 500 => {
                    self.counters.lock().successful_requests += 1;
                    entry.counters.lock().successful_requests += 1;
                    metrics::record_provider_request(provider, "success");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status().as_u16();
                    tracing::warn!(provider = %provider, attempt, status, "Provider returned server error");
                    last_error = format!("status_{}", status);
                }
                Err(e) => {
                    tracing::warn!(provider = %provider, attempt, error = %e, "Provider request failed");
                    last_error = e.to_string();
                }
            }
        }

        self.record_failure(&entry, &last_error);
        Err(ResilienceError::RetriesExhausted {
            provider: provider.to_string(),
            attempts,
            last_error,
        })
    }

    /// Probe every provider concurrently.
    pub async fn health(&self) -> HashMap<String, ResilienceResult<()>> {
        let entries: Vec<Arc<ProviderEntry>> =
            self.providers.iter().map(|e| e.value().clone()).collect();

        let probes = entries.into_iter().map(|entry| async move {
            let result = probe(&entry).await;
            metrics::record_provider_health(&entry.name, result.is_ok());
            if let Err(e) = &result {
                tracing::warn!(provider = %entry.name, error = %e, "Provider health check failed");
            }
            (entry.name.clone(), result)
        });

        join_all(probes).await.into_iter().collect()
    }

    pub fn get_stats(&self) -> PoolStats {
        self.counters.lock().pool_stats(self.providers.len())
    }

    pub fn get_provider_stats(&self, name: &str) -> Option<ProviderStats> {
        self.providers
            .get(name)
            .map(|entry| entry.counters.lock().provider_stats(name))
    }

    pub fn all_provider_stats(&self) -> Vec<ProviderStats> {
        let mut stats: Vec<_> = self
            .providers
            .iter()
            .map(|entry| entry.counters.lock().provider_stats(entry.key()))
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Effective settings for `name` after defaults were applied.
    pub fn provider_config(&self, name: &str) -> Option<ResolvedPoolConfig> {
        self.providers.get(name).map(|entry| entry.config.clone())
    }

    fn entry(&self, provider: &str) -> ResilienceResult<Arc<ProviderEntry>> {
        self.providers
            .get(provider)
            .map(|e| e.value().clone())
            .ok_or_else(|| ResilienceError::ProviderNotFound(provider.to_string()))
    }

    fn record_failure(&self, entry: &ProviderEntry, signature: &str) {
        self.counters.lock().record_failure(signature);
        entry.counters.lock().record_failure(signature);
        metrics::record_provider_request(&entry.name, "failure");
    }

    fn abort(&self, entry: &ProviderEntry, error: ResilienceError) -> ResilienceError {
        let signature = match &error {
            ResilienceError::Cancelled { .. } => "cancelled".to_string(),
            ResilienceError::DeadlineExceeded { .. } => "deadline_exceeded".to_string(),
            other => other.to_string(),
        };
        self.record_failure(entry, &signature);
        error
    }
}

async fn probe(entry: &ProviderEntry) -> ResilienceResult<()> {
    let Some(url) = entry.config.health_url() else {
        return Ok(());
    };
    let response = entry
        .client
        .get(url)
        .send()
        .await
        .map_err(|e| ResilienceError::Unhealthy {
            provider: entry.name.clone(),
            reason: e.to_string(),
        })?;
    let status = response.status().as_u16();
    if status < 500 {
        Ok(())
    } else {
        Err(ResilienceError::Unhealthy {
            provider: entry.name.clone(),
            reason: format!("status_{}", status),
        })
    }
}

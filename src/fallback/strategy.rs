//! Fallback strategy: run the primary, degrade on failure.
//!
//! # Per-call state machine
//! ```text
//! PRIMARY ─ok──────────────────────────────────────────→ DONE
//!    └─err→ PREDICATE ─reject→ ERROR (ProcessorFailed)
//!              └─accept→ LOOKUP ─missing/disabled→ ERROR (FallbackUnavailable)
//!                          └─→ DISPATCH ─ok→ DONE (fallback_used)
//!                                └─err/timeout→ ERROR (FallbackFailed)
//! ```
//! There is no second-level fallback and no retry inside this layer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant;

use crate::bulkhead::types::Data;
use crate::context::CallContext;
use crate::error::{BoxError, ResilienceError, ResilienceResult};
use crate::fallback::handler::FallbackHandler;
use crate::fallback::provider::FallbackInput;
use crate::fallback::types::{
    FallbackConfig, FallbackRequest, FallbackResponse, FallbackStats, HandlerStats,
};
use crate::observability::metrics;
use crate::stats::{now_epoch_ms, running_average};

/// Decides whether a primary error may be answered by a fallback.
pub type FallbackPredicate =
    Arc<dyn Fn(&(dyn std::error::Error + Send + Sync + 'static)) -> bool + Send + Sync>;

/// Per-service degraded-mode dispatcher.
pub struct FallbackStrategy {
    name: String,
    config: FallbackConfig,
    handlers: DashMap<String, Arc<FallbackHandler>>,
    predicate: RwLock<Option<FallbackPredicate>>,
    stats: Mutex<FallbackStats>,
}

impl std::fmt::Debug for FallbackStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackStrategy")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl FallbackStrategy {
    pub fn new(name: impl Into<String>, config: FallbackConfig) -> Self {
        Self {
            name: name.into(),
            config,
            handlers: DashMap::new(),
            predicate: RwLock::new(None),
            stats: Mutex::new(FallbackStats::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Only fall back on primary errors for which `predicate` returns true.
    /// Without a predicate every primary error is eligible.
    pub fn set_fallback_predicate<P>(&self, predicate: P)
    where
        P: Fn(&(dyn std::error::Error + Send + Sync + 'static)) -> bool + Send + Sync + 'static,
    {
        *self.predicate.write() = Some(Arc::new(predicate));
    }

    /// Register the handler for its service. A service has at most one handler.
    pub fn register_fallback(&self, handler: FallbackHandler) -> ResilienceResult<Arc<FallbackHandler>> {
        match self.handlers.entry(handler.service().to_string()) {
            Entry::Occupied(_) => Err(ResilienceError::DuplicateFallback(handler.service().to_string())),
            Entry::Vacant(slot) => {
                tracing::info!(
                    strategy = %self.name,
                    service = %handler.service(),
                    fallback_type = %handler.fallback_type(),
                    enabled = handler.is_enabled(),
                    "Fallback handler registered"
                );
                let handler = Arc::new(handler);
                slot.insert(handler.clone());
                Ok(handler)
            }
        }
    }

    pub fn enable_fallback(&self, service: &str) -> ResilienceResult<()> {
        self.set_enabled(service, true)
    }

    pub fn disable_fallback(&self, service: &str) -> ResilienceResult<()> {
        self.set_enabled(service, false)
    }

    fn set_enabled(&self, service: &str, enabled: bool) -> ResilienceResult<()> {
        let handler = self.handlers.get(service).ok_or_else(|| ResilienceError::FallbackUnavailable {
            service: service.to_string(),
            reason: "no handler registered".to_string(),
        })?;
        handler.set_enabled(enabled);
        tracing::info!(strategy = %self.name, service = %service, enabled, "Fallback handler toggled");
        Ok(())
    }

    pub fn get_handler(&self, service: &str) -> Option<Arc<FallbackHandler>> {
        self.handlers.get(service).map(|h| h.value().clone())
    }

    /// Run `primary`; if it fails, answer from the service's handler.
    pub async fn execute_with_fallback<F, Fut>(
        &self,
        ctx: &CallContext,
        request: FallbackRequest,
        primary: F,
    ) -> ResilienceResult<FallbackResponse>
    where
        F: FnOnce(CallContext, FallbackRequest) -> Fut,
        Fut: Future<Output = Result<Data, BoxError>>,
    {
        let started = Instant::now();
        self.stats.lock().total_requests += 1;

        let handler = self.get_handler(&request.service);
        if let Some(h) = &handler {
            h.record_request();
        }

        let primary_result = tokio::select! {
            result = primary(ctx.clone(), request.clone()) => result,
            reason = ctx.done() => return Err(reason.into_error(&request.service, "primary")),
        };

        let primary_error = match primary_result {
            Ok(data) => {
                if let Some(h) = handler.as_ref().filter(|h| h.cache_enabled()) {
                    h.store(&request, data.clone());
                }
                return Ok(FallbackResponse {
                    id: request.id,
                    service: request.service,
                    data,
                    fallback_used: false,
                    fallback_type: None,
                    primary_error: None,
                    process_time: started.elapsed(),
                });
            }
            Err(e) => e,
        };

        let predicate = self.predicate.read().clone();
        if let Some(predicate) = predicate {
            if !predicate(&*primary_error) {
                tracing::debug!(service = %request.service, error = %primary_error, "Primary error not eligible for fallback");
                return Err(ResilienceError::ProcessorFailed {
                    service: request.service,
                    source: primary_error,
                });
            }
        }

        let handler = match handler {
            Some(h) if h.is_enabled() => h,
            Some(_) => {
                return Err(ResilienceError::FallbackUnavailable {
                    service: request.service,
                    reason: format!("handler disabled (primary error: {})", primary_error),
                })
            }
            None => {
                return Err(ResilienceError::FallbackUnavailable {
                    service: request.service,
                    reason: format!("no handler registered (primary error: {})", primary_error),
                })
            }
        };

        self.dispatch(ctx, &handler, request, primary_error, started).await
    }

    async fn dispatch(
        &self,
        ctx: &CallContext,
        handler: &FallbackHandler,
        request: FallbackRequest,
        primary_error: BoxError,
        started: Instant,
    ) -> ResilienceResult<FallbackResponse> {
        let timeout = handler.timeout().unwrap_or(self.config.default_timeout);
        let primary_message = primary_error.to_string();
        let fallback_type = handler.fallback_type();

        tracing::warn!(
            request_id = %request.id,
            service = %request.service,
            fallback_type = %fallback_type,
            error = %primary_message,
            "Primary call failed, using fallback"
        );

        let input = FallbackInput {
            request: request.clone(),
            primary_error: primary_message.clone(),
            cached: handler.cached(&request),
        };

        let dispatch_started = Instant::now();
        let outcome: Result<Data, ResilienceError> = tokio::select! {
            result = tokio::time::timeout(timeout, handler.provider().respond(ctx, input)) => match result {
                Ok(Ok(data)) => Ok(data),
                Ok(Err(source)) => Err(ResilienceError::FallbackFailed {
                    service: request.service.clone(),
                    primary_error: primary_message.clone(),
                    source,
                }),
                Err(_) => Err(ResilienceError::FallbackFailed {
                    service: request.service.clone(),
                    primary_error: primary_message.clone(),
                    source: format!("fallback timed out after {:?}", timeout).into(),
                }),
            },
            reason = ctx.done() => Err(reason.into_error(&request.service, "fallback")),
        };
        let elapsed = dispatch_started.elapsed();

        handler.record_fallback(elapsed, outcome.is_ok());
        self.record_fallback(elapsed, outcome.is_ok());
        metrics::record_fallback(
            &request.service,
            fallback_type.as_str(),
            if outcome.is_ok() { "success" } else { "failure" },
        );

        match outcome {
            Ok(data) => Ok(FallbackResponse {
                id: request.id,
                service: request.service,
                data,
                fallback_used: true,
                fallback_type: Some(fallback_type),
                primary_error: Some(primary_message),
                process_time: started.elapsed(),
            }),
            Err(e) => {
                tracing::error!(service = %request.service, fallback_type = %fallback_type, error = %e, "Fallback failed");
                Err(e)
            }
        }
    }

    fn record_fallback(&self, elapsed: Duration, success: bool) {
        let mut stats = self.stats.lock();
        stats.fallback_requests += 1;
        if success {
            stats.successful_fallbacks += 1;
            stats.average_fallback_ms =
                running_average(stats.average_fallback_ms, stats.successful_fallbacks, elapsed);
            stats.last_fallback_at_ms = Some(now_epoch_ms());
        } else {
            stats.failed_fallbacks += 1;
        }
    }

    pub fn get_stats(&self) -> FallbackStats {
        self.stats.lock().clone()
    }

    pub fn get_handler_stats(&self, service: &str) -> Option<HandlerStats> {
        self.handlers.get(service).map(|h| h.stats())
    }

    /// Every handler's statistics, sorted by service.
    pub fn list_handlers(&self) -> Vec<HandlerStats> {
        let mut all: Vec<_> = self.handlers.iter().map(|h| h.stats()).collect();
        all.sort_by(|a, b| a.service.cmp(&b.service));
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::provider::FnProvider;
    use crate::fallback::types::FallbackType;
    use serde_json::json;

    fn failing() -> impl FnOnce(CallContext, FallbackRequest) -> std::future::Ready<Result<Data, BoxError>> {
        |_, _| std::future::ready(Err("provider unreachable".into()))
    }

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        strategy
            .register_fallback(FallbackHandler::new("sanctions", FallbackType::DefaultResponse))
            .unwrap();
        let ctx = CallContext::new();
        let resp = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("sanctions", "screen"), |_, _| async {
                let mut d = Data::new();
                d.insert("risk_score".into(), json!(0.1));
                Ok(d)
            })
            .await
            .unwrap();
        assert!(!resp.fallback_used);
        assert_eq!(resp.data["risk_score"], 0.1);
        let stats = strategy.get_stats();
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.fallback_requests, 0);
    }

    #[tokio::test]
    async fn test_cached_response_scenario() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        strategy
            .register_fallback(FallbackHandler::new("sanctions", FallbackType::CachedResponse))
            .unwrap();
        let ctx = CallContext::new();
        let resp = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("sanctions", "screen"), failing())
            .await
            .unwrap();
        assert!(resp.fallback_used);
        assert_eq!(resp.fallback_type, Some(FallbackType::CachedResponse));
        assert_eq!(resp.data["risk_score"], 0.75);
        assert_eq!(resp.data["risk_level"], "medium");
        assert_eq!(resp.primary_error.as_deref(), Some("provider unreachable"));
    }

    #[tokio::test]
    async fn test_cache_populated_by_primary_success() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        strategy
            .register_fallback(
                FallbackHandler::new("pep", FallbackType::CachedResponse)
                    .with_cache(Duration::from_secs(60)),
            )
            .unwrap();
        let ctx = CallContext::new();
        strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("pep", "screen"), |_, _| async {
                let mut d = Data::new();
                d.insert("risk_score".into(), json!(0.05));
                Ok(d)
            })
            .await
            .unwrap();

        let resp = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("pep", "screen"), failing())
            .await
            .unwrap();
        assert_eq!(resp.data["risk_score"], 0.05);
    }

    #[tokio::test]
    async fn test_missing_and_disabled_handlers() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        let ctx = CallContext::new();
        let err = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("media", "search"), failing())
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::FallbackUnavailable { .. }));

        strategy
            .register_fallback(FallbackHandler::new("media", FallbackType::DefaultResponse))
            .unwrap();
        strategy.disable_fallback("media").unwrap();
        let err = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("media", "search"), failing())
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::FallbackUnavailable { reason, .. } if reason.contains("disabled")));
        assert_eq!(strategy.get_stats().fallback_requests, 0);

        strategy.enable_fallback("media").unwrap();
        assert!(strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("media", "search"), failing())
            .await
            .is_ok());
        assert!(strategy.enable_fallback("unknown").is_err());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        strategy
            .register_fallback(FallbackHandler::new("ml", FallbackType::DegradedMode))
            .unwrap();
        let err = strategy
            .register_fallback(FallbackHandler::new("ml", FallbackType::DefaultResponse))
            .unwrap_err();
        assert!(matches!(err, ResilienceError::DuplicateFallback(_)));
        assert_eq!(
            strategy.get_handler_stats("ml").unwrap().fallback_type,
            FallbackType::DegradedMode
        );
    }

    #[tokio::test]
    async fn test_failing_provider_is_terminal() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        let provider = FnProvider::new(|_input| async { Err::<Data, BoxError>("cache offline".into()) });
        strategy
            .register_fallback(
                FallbackHandler::new("ml", FallbackType::CachedResponse).with_provider(Arc::new(provider)),
            )
            .unwrap();
        let ctx = CallContext::new();
        let err = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("ml", "score"), failing())
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::FallbackFailed { .. }));
        let stats = strategy.get_handler_stats("ml").unwrap();
        assert_eq!(stats.fallback_requests, 1);
        assert_eq!(stats.failed_fallbacks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_provider_hits_handler_timeout() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        let provider = FnProvider::new(|_input| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Data::new())
        });
        strategy
            .register_fallback(
                FallbackHandler::new("ml", FallbackType::AlternativeService)
                    .with_provider(Arc::new(provider))
                    .with_timeout(Duration::from_millis(100)),
            )
            .unwrap();
        let ctx = CallContext::new();
        let err = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("ml", "score"), failing())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert_eq!(strategy.get_stats().failed_fallbacks, 1);
    }

    #[tokio::test]
    async fn test_predicate_blocks_fallback() {
        let strategy = FallbackStrategy::new("risk", FallbackConfig::default());
        strategy
            .register_fallback(FallbackHandler::new("ml", FallbackType::DefaultResponse))
            .unwrap();
        strategy.set_fallback_predicate(|e| !e.to_string().contains("invalid input"));
        let ctx = CallContext::new();

        let err = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("ml", "score"), |_, _| async {
                Err::<Data, BoxError>("invalid input: missing customer id".into())
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ResilienceError::ProcessorFailed { .. }));

        let resp = strategy
            .execute_with_fallback(&ctx, FallbackRequest::new("ml", "score"), failing())
            .await
            .unwrap();
        assert!(resp.fallback_used);
        assert_eq!(strategy.get_stats().fallback_requests, 1);
    }
}

//! Startup orchestration.
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The admin listener starts last (traffic only when ready)

use std::sync::Arc;
use std::time::Duration;

use crate::bulkhead::{Bulkhead, BulkheadManager};
use crate::config::ResilienceConfig;
use crate::error::ResilienceResult;
use crate::fallback::{FallbackHandler, FallbackManager, FallbackStrategy};
use crate::transport::ConnectionPool;

/// Everything a configured process needs: managers plus the provider pool.
#[derive(Debug)]
pub struct ResilienceLayer {
    pub bulkheads: BulkheadManager,
    pub fallbacks: FallbackManager,
    pub pool: ConnectionPool,
    bulkhead: Arc<Bulkhead>,
    fallback: Arc<FallbackStrategy>,
}

impl ResilienceLayer {
    /// Build pools, handlers and provider clients described by `config`.
    pub fn from_config(config: &ResilienceConfig) -> ResilienceResult<Self> {
        let bulkheads = BulkheadManager::new();
        let bulkhead = bulkheads.get_bulkhead(&config.bulkhead.name, config.bulkhead.bulkhead_config());
        for pool in &config.bulkhead.pools {
            bulkhead.create_pool(&pool.name, pool.capacity())?;
        }

        let fallbacks = FallbackManager::new();
        let fallback = fallbacks.get_strategy(&config.fallback.name, config.fallback.fallback_config());
        for handler in &config.fallback.handlers {
            let mut built = FallbackHandler::new(&handler.service, handler.fallback_type)
                .with_enabled(handler.enabled);
            if let Some(timeout_ms) = handler.timeout_ms {
                built = built.with_timeout(Duration::from_millis(timeout_ms));
            }
            if let Some(ttl) = handler.cache_ttl_secs {
                built = built.with_cache(Duration::from_secs(ttl));
            }
            fallback.register_fallback(built)?;
        }

        let pool = ConnectionPool::new();
        for provider in &config.providers {
            pool.add_provider(&provider.name, provider.pool.clone())?;
        }

        tracing::info!(
            pools = config.bulkhead.pools.len(),
            handlers = config.fallback.handlers.len(),
            providers = config.providers.len(),
            "Resilience layer initialized"
        );

        Ok(Self {
            bulkheads,
            fallbacks,
            pool,
            bulkhead,
            fallback,
        })
    }

    /// The configured bulkhead.
    pub fn bulkhead(&self) -> &Arc<Bulkhead> {
        &self.bulkhead
    }

    /// The configured fallback strategy.
    pub fn fallback(&self) -> &Arc<FallbackStrategy> {
        &self.fallback
    }

    /// Close provider connections.
    pub fn shutdown(&self) {
        self.pool.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::error::ResilienceError;

    #[test]
    fn test_layer_from_config() {
        let config = parse_config(
            r#"
[[bulkhead.pools]]
name = "sanctions"
max_concurrency = 2

[[fallback.handlers]]
service = "sanctions"
fallback_type = "degraded_mode"
enabled = false

[[providers]]
name = "pep"
"#,
        )
        .unwrap();

        let layer = ResilienceLayer::from_config(&config).unwrap();
        assert_eq!(
            layer.bulkhead().get_pool("sanctions").unwrap().capacity().max_concurrency,
            2
        );
        assert!(!layer.fallback().get_handler("sanctions").unwrap().is_enabled());
        assert_eq!(layer.pool.list_providers(), vec!["pep".to_string()]);
        assert!(layer.bulkheads.get("default").is_some());

        layer.shutdown();
        assert!(layer.pool.list_providers().is_empty());
    }

    #[test]
    fn test_duplicate_provider_fails_startup() {
        let config = ResilienceConfig {
            providers: vec![
                crate::config::ProviderConfig {
                    name: "pep".into(),
                    pool: Default::default(),
                },
                crate::config::ProviderConfig {
                    name: "pep".into(),
                    pool: Default::default(),
                },
            ],
            ..ResilienceConfig::default()
        };
        let err = ResilienceLayer::from_config(&config).unwrap_err();
        assert!(matches!(err, ResilienceError::DuplicateProvider(_)));
    }
}

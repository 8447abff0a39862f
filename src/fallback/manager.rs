//! Process-wide registry of named fallback strategies.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::fallback::strategy::FallbackStrategy;
use crate::fallback::types::{FallbackConfig, FallbackStats, HandlerStats};

/// Statistics for one strategy and its handlers.
#[derive(Debug, Clone, Serialize)]
pub struct FallbackReport {
    pub name: String,
    pub stats: FallbackStats,
    pub handlers: Vec<HandlerStats>,
}

/// Lazily creates and caches one strategy per name.
#[derive(Debug, Default)]
pub struct FallbackManager {
    strategies: DashMap<String, Arc<FallbackStrategy>>,
}

impl FallbackManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached strategy for `name`; `config` only applies on first creation.
    pub fn get_strategy(&self, name: &str, config: FallbackConfig) -> Arc<FallbackStrategy> {
        if let Some(existing) = self.strategies.get(name) {
            return existing.value().clone();
        }
        self.strategies
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(strategy = %name, "Fallback strategy created");
                Arc::new(FallbackStrategy::new(name, config))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<FallbackStrategy>> {
        self.strategies.get(name).map(|s| s.value().clone())
    }

    pub fn reports(&self) -> Vec<FallbackReport> {
        let mut reports: Vec<_> = self
            .strategies
            .iter()
            .map(|s| FallbackReport {
                name: s.key().clone(),
                stats: s.get_stats(),
                handlers: s.list_handlers(),
            })
            .collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::handler::FallbackHandler;
    use crate::fallback::types::FallbackType;

    #[test]
    fn test_strategy_is_cached_with_handlers() {
        let manager = FallbackManager::new();
        let first = manager.get_strategy("external", FallbackConfig::default());
        first
            .register_fallback(FallbackHandler::new("sanctions", FallbackType::CachedResponse))
            .unwrap();

        let again = manager.get_strategy("external", FallbackConfig::default());
        assert!(Arc::ptr_eq(&first, &again));
        assert!(again.get_handler("sanctions").is_some());

        let reports = manager.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].handlers[0].service, "sanctions");
    }
}

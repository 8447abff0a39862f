//! Process-wide registry of named bulkheads.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;

use crate::bulkhead::executor::Bulkhead;
use crate::bulkhead::types::{BulkheadConfig, BulkheadStats, ResourcePoolStats};

/// Statistics for one bulkhead and its pools.
#[derive(Debug, Clone, Serialize)]
pub struct BulkheadReport {
    pub name: String,
    pub stats: BulkheadStats,
    pub pools: Vec<ResourcePoolStats>,
}

/// Lazily creates and caches one bulkhead per name.
#[derive(Debug, Default)]
pub struct BulkheadManager {
    bulkheads: DashMap<String, Arc<Bulkhead>>,
}

impl BulkheadManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached bulkhead for `name`; `config` only applies on first creation.
    pub fn get_bulkhead(&self, name: &str, config: BulkheadConfig) -> Arc<Bulkhead> {
        if let Some(existing) = self.bulkheads.get(name) {
            return existing.value().clone();
        }
        self.bulkheads
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!(bulkhead = %name, "Bulkhead created");
                Arc::new(Bulkhead::new(name, config))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Bulkhead>> {
        self.bulkheads.get(name).map(|b| b.value().clone())
    }

    pub fn reports(&self) -> Vec<BulkheadReport> {
        let mut reports: Vec<_> = self
            .bulkheads
            .iter()
            .map(|b| BulkheadReport {
                name: b.key().clone(),
                stats: b.get_stats(),
                pools: b.all_pool_stats(),
            })
            .collect();
        reports.sort_by(|a, b| a.name.cmp(&b.name));
        reports
    }
}

//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML and default
//! every field, so a minimal file only names what it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bulkhead::types::{BulkheadConfig, PoolCapacity};
use crate::fallback::types::{FallbackConfig, FallbackType};
use crate::transport::config::PoolConfig;

/// Root configuration for the resilience daemon.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ResilienceConfig {
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    /// Admission control for downstream dependencies.
    pub bulkhead: BulkheadSection,

    /// Degraded responses per service.
    pub fallback: FallbackSection,

    /// External providers reached through the connection pool.
    pub providers: Vec<ProviderConfig>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Bulkhead instance plus explicitly sized pools.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BulkheadSection {
    pub name: String,

    /// Capacity for pools created lazily on first use.
    pub max_concurrency: usize,
    pub max_queue_size: usize,
    pub timeout_ms: u64,

    pub pools: Vec<PoolSection>,
}

impl Default for BulkheadSection {
    fn default() -> Self {
        let capacity = PoolCapacity::default();
        Self {
            name: "default".to_string(),
            max_concurrency: capacity.max_concurrency,
            max_queue_size: capacity.max_queue_size,
            timeout_ms: capacity.timeout.as_millis() as u64,
            pools: Vec::new(),
        }
    }
}

impl BulkheadSection {
    pub fn bulkhead_config(&self) -> BulkheadConfig {
        BulkheadConfig {
            default_capacity: PoolCapacity {
                max_concurrency: self.max_concurrency,
                max_queue_size: self.max_queue_size,
                timeout: Duration::from_millis(self.timeout_ms),
            },
        }
    }
}

/// One explicitly sized resource pool.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct PoolSection {
    pub name: String,
    pub max_concurrency: usize,
    #[serde(default)]
    pub max_queue_size: usize,
    #[serde(default = "default_pool_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_pool_timeout_ms() -> u64 {
    PoolCapacity::default().timeout.as_millis() as u64
}

impl PoolSection {
    pub fn capacity(&self) -> PoolCapacity {
        PoolCapacity {
            max_concurrency: self.max_concurrency,
            max_queue_size: self.max_queue_size,
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

/// Fallback strategy plus its registered handlers.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FallbackSection {
    pub name: String,

    /// Dispatch deadline for handlers without their own timeout.
    pub default_timeout_ms: u64,

    pub handlers: Vec<HandlerConfig>,
}

impl Default for FallbackSection {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            default_timeout_ms: FallbackConfig::default().default_timeout.as_millis() as u64,
            handlers: Vec::new(),
        }
    }
}

impl FallbackSection {
    pub fn fallback_config(&self) -> FallbackConfig {
        FallbackConfig {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
        }
    }
}

/// One fallback handler. Uses the built-in provider for `fallback_type`.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct HandlerConfig {
    pub service: String,

    pub fallback_type: FallbackType,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub timeout_ms: Option<u64>,

    /// Cache successful primary results for this long.
    pub cache_ttl_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

/// A named provider and its transport settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProviderConfig {
    pub name: String,

    #[serde(flatten)]
    pub pool: PoolConfig,
}

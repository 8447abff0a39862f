//! Provider pool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ResilienceError, ResilienceResult};

pub const DEFAULT_MAX_IDLE_CONNS: usize = 100;
pub const DEFAULT_MAX_IDLE_CONNS_PER_HOST: usize = 10;
pub const DEFAULT_MAX_CONNS_PER_HOST: usize = 50;
pub const DEFAULT_IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(90);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_HEALTH_PATH: &str = "health";

/// Transport sizing and retry policy for one provider.
///
/// Every numeric field treats zero as "use the default".
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct PoolConfig {
    pub max_idle_conns: usize,
    pub max_idle_conns_per_host: usize,
    pub max_conns_per_host: usize,
    pub idle_conn_timeout_secs: u64,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Root URL of the provider; enables the health probe.
    pub base_url: Option<String>,
    /// Probe path resolved under `base_url` (default `health`).
    /// A leading `/` does not escape the base path.
    pub health_path: Option<String>,
    /// Ignore `HTTP_PROXY` and friends.
    pub no_proxy: bool,
}

/// [`PoolConfig`] with defaults applied and URLs parsed.
#[derive(Debug, Clone)]
pub struct ResolvedPoolConfig {
    pub max_idle_conns: usize,
    pub max_idle_conns_per_host: usize,
    pub max_conns_per_host: usize,
    pub idle_conn_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub base_url: Option<Url>,
    pub health_path: String,
    pub no_proxy: bool,
}

fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
    if value == T::default() {
        default
    } else {
        value
    }
}

impl PoolConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay_ms = retry_delay.as_millis() as u64;
        self
    }

    /// Apply defaults and parse `base_url` for `provider`.
    pub fn resolve(&self, provider: &str) -> ResilienceResult<ResolvedPoolConfig> {
        let base_url = match &self.base_url {
            Some(raw) => Some(Url::parse(raw).map_err(|e| ResilienceError::InvalidConfig {
                target: provider.to_string(),
                reason: format!("invalid base_url '{}': {}", raw, e),
            })?),
            None => None,
        };

        Ok(ResolvedPoolConfig {
            max_idle_conns: or_default(self.max_idle_conns, DEFAULT_MAX_IDLE_CONNS),
            max_idle_conns_per_host: or_default(
                self.max_idle_conns_per_host,
                DEFAULT_MAX_IDLE_CONNS_PER_HOST,
            ),
            max_conns_per_host: or_default(self.max_conns_per_host, DEFAULT_MAX_CONNS_PER_HOST),
            idle_conn_timeout: or_default(
                Duration::from_secs(self.idle_conn_timeout_secs),
                DEFAULT_IDLE_CONN_TIMEOUT,
            ),
            timeout: or_default(Duration::from_millis(self.timeout_ms), DEFAULT_TIMEOUT),
            max_retries: or_default(self.max_retries, DEFAULT_MAX_RETRIES),
            retry_delay: or_default(Duration::from_millis(self.retry_delay_ms), DEFAULT_RETRY_DELAY),
            base_url,
            health_path: self
                .health_path
                .clone()
                .filter(|p| !p.is_empty())
                .unwrap_or_else(|| DEFAULT_HEALTH_PATH.to_string()),
            no_proxy: self.no_proxy,
        })
    }
}

impl ResolvedPoolConfig {
    /// Idle connections kept per host: the tighter of the two idle limits.
    pub fn idle_per_host(&self) -> usize {
        self.max_idle_conns_per_host.min(self.max_idle_conns)
    }

    /// `health_path` under `base_url`, keeping any path prefix on the base.
    pub fn health_url(&self) -> Option<Url> {
        let mut base = self.base_url.clone()?;
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.join(self.health_path.trim_start_matches('/')).ok()
    }
}

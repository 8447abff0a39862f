//! Fallback envelopes, configuration and statistics.

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::bulkhead::types::Data;

/// Kind of degraded response a handler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackType {
    CachedResponse,
    AlternativeService,
    DegradedMode,
    DefaultResponse,
}

impl FallbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackType::CachedResponse => "cached_response",
            FallbackType::AlternativeService => "alternative_service",
            FallbackType::DegradedMode => "degraded_mode",
            FallbackType::DefaultResponse => "default_response",
        }
    }
}

impl fmt::Display for FallbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cached_response" => Ok(FallbackType::CachedResponse),
            "alternative_service" => Ok(FallbackType::AlternativeService),
            "degraded_mode" => Ok(FallbackType::DegradedMode),
            "default_response" => Ok(FallbackType::DefaultResponse),
            other => Err(format!("unknown fallback type '{}'", other)),
        }
    }
}

/// Strategy-wide settings.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Dispatch deadline for handlers without their own timeout.
    pub default_timeout: Duration,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallbackRequest {
    pub id: String,
    pub service: String,
    pub operation: String,
    pub data: Data,
    pub timeout: Option<Duration>,
    pub priority: i32,
    pub created_at: SystemTime,
}

impl FallbackRequest {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            service: service.into(),
            operation: operation.into(),
            data: Data::new(),
            timeout: None,
            priority: 0,
            created_at: SystemTime::now(),
        }
    }

    pub fn with_data(mut self, data: Data) -> Self {
        self.data = data;
        self
    }

    /// Key used for cached responses.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.service, self.operation)
    }
}

#[derive(Debug, Clone)]
pub struct FallbackResponse {
    pub id: String,
    pub service: String,
    pub data: Data,
    pub fallback_used: bool,
    pub fallback_type: Option<FallbackType>,
    /// Message of the primary failure when the fallback answered.
    pub primary_error: Option<String>,
    /// Wall time since the call began, primary attempt included.
    pub process_time: Duration,
}

/// Strategy-wide counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackStats {
    pub total_requests: u64,
    pub fallback_requests: u64,
    pub successful_fallbacks: u64,
    pub failed_fallbacks: u64,
    pub average_fallback_ms: f64,
    pub last_fallback_at_ms: Option<u64>,
}

/// Per-handler counters and settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerStats {
    pub service: String,
    pub fallback_type: FallbackType,
    pub enabled: bool,
    pub cache_enabled: bool,
    pub cached_entries: usize,
    pub total_requests: u64,
    pub fallback_requests: u64,
    pub successful_fallbacks: u64,
    pub failed_fallbacks: u64,
    pub average_fallback_ms: f64,
    pub last_fallback_at_ms: Option<u64>,
}

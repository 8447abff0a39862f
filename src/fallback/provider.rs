//! Degraded-mode providers.
//!
//! A provider turns a failed primary call into a reduced-fidelity result.
//! Real degraded logic belongs to the business layer and is plugged in with
//! [`FallbackHandler::with_provider`](crate::fallback::FallbackHandler::with_provider);
//! the built-ins below are the defaults for each [`FallbackType`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::bulkhead::types::Data;
use crate::context::CallContext;
use crate::error::BoxError;
use crate::fallback::types::{FallbackRequest, FallbackType};

/// Everything a provider gets to build its answer.
#[derive(Debug, Clone)]
pub struct FallbackInput {
    pub request: FallbackRequest,
    pub primary_error: String,
    /// Last fresh primary result for this request's cache key, if caching is on.
    pub cached: Option<Data>,
}

#[async_trait]
pub trait DegradedProvider: Send + Sync {
    async fn respond(&self, ctx: &CallContext, input: FallbackInput) -> Result<Data, BoxError>;
}

fn payload(pairs: serde_json::Value) -> Data {
    match pairs {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        _ => Data::new(),
    }
}

/// Serves the cached prior result, or a medium-risk placeholder.
#[derive(Debug, Default)]
pub struct CachedResponse;

#[async_trait]
impl DegradedProvider for CachedResponse {
    async fn respond(&self, _ctx: &CallContext, input: FallbackInput) -> Result<Data, BoxError> {
        if let Some(cached) = input.cached {
            return Ok(cached);
        }
        Ok(payload(json!({
            "risk_score": 0.75,
            "risk_level": "medium",
            "source": "cache",
        })))
    }
}

/// Tags the result as coming from a secondary provider.
#[derive(Debug)]
pub struct AlternativeService {
    pub source: String,
}

impl Default for AlternativeService {
    fn default() -> Self {
        Self {
            source: "alternative_provider".to_string(),
        }
    }
}

#[async_trait]
impl DegradedProvider for AlternativeService {
    async fn respond(&self, _ctx: &CallContext, _input: FallbackInput) -> Result<Data, BoxError> {
        Ok(payload(json!({
            "risk_score": 0.6,
            "risk_level": "medium",
            "source": self.source,
        })))
    }
}

/// Conservative answer: assume high risk and say so.
#[derive(Debug, Default)]
pub struct DegradedMode;

#[async_trait]
impl DegradedProvider for DegradedMode {
    async fn respond(&self, _ctx: &CallContext, _input: FallbackInput) -> Result<Data, BoxError> {
        Ok(payload(json!({
            "risk_score": 0.9,
            "risk_level": "high",
            "warning": "degraded mode: conservative assessment, manual review required",
        })))
    }
}

/// Fixed neutral answer with a warning.
#[derive(Debug, Default)]
pub struct DefaultResponse;

#[async_trait]
impl DegradedProvider for DefaultResponse {
    async fn respond(&self, _ctx: &CallContext, _input: FallbackInput) -> Result<Data, BoxError> {
        Ok(payload(json!({
            "risk_score": 0.5,
            "risk_level": "unknown",
            "warning": "default response: risk data unavailable",
        })))
    }
}

/// Default provider for a fallback type.
pub fn builtin_provider(fallback_type: FallbackType) -> Arc<dyn DegradedProvider> {
    match fallback_type {
        FallbackType::CachedResponse => Arc::new(CachedResponse),
        FallbackType::AlternativeService => Arc::new(AlternativeService::default()),
        FallbackType::DegradedMode => Arc::new(DegradedMode),
        FallbackType::DefaultResponse => Arc::new(DefaultResponse),
    }
}

/// Adapts an async closure into a provider.
pub struct FnProvider<F> {
    f: F,
}

impl<F, Fut> FnProvider<F>
where
    F: Fn(FallbackInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Data, BoxError>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> DegradedProvider for FnProvider<F>
where
    F: Fn(FallbackInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Data, BoxError>> + Send,
{
    async fn respond(&self, _ctx: &CallContext, input: FallbackInput) -> Result<Data, BoxError> {
        (self.f)(input).await
    }
}

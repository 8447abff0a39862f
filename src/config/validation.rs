//! Configuration validation.
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function: ResilienceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ResilienceConfig;

/// One semantic problem in a configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: must be greater than zero")]
    Zero { field: String },

    #[error("{field}: duplicate name '{name}'")]
    Duplicate { field: String, name: String },

    #[error("{field}: must not be empty")]
    Empty { field: String },

    #[error("{field}: invalid address '{value}'")]
    InvalidAddress { field: String, value: String },

    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: String, value: String },

    #[error("observability.log_level: unknown level '{0}'")]
    LogLevel(String),
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

pub fn validate_config(config: &ResilienceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::Empty {
                field: "admin.api_key".to_string(),
            });
        }
    }

    let bulkhead = &config.bulkhead;
    check_nonzero(&mut errors, "bulkhead.max_concurrency", bulkhead.max_concurrency as u64);
    check_nonzero(&mut errors, "bulkhead.timeout_ms", bulkhead.timeout_ms);
    let mut seen = HashSet::new();
    for (i, pool) in bulkhead.pools.iter().enumerate() {
        let field = format!("bulkhead.pools[{}]", i);
        check_name(&mut errors, &mut seen, &field, &pool.name);
        check_nonzero(&mut errors, &format!("{}.max_concurrency", field), pool.max_concurrency as u64);
        check_nonzero(&mut errors, &format!("{}.timeout_ms", field), pool.timeout_ms);
    }

    check_nonzero(&mut errors, "fallback.default_timeout_ms", config.fallback.default_timeout_ms);
    let mut seen = HashSet::new();
    for (i, handler) in config.fallback.handlers.iter().enumerate() {
        let field = format!("fallback.handlers[{}]", i);
        check_name(&mut errors, &mut seen, &field, &handler.service);
        if let Some(timeout_ms) = handler.timeout_ms {
            check_nonzero(&mut errors, &format!("{}.timeout_ms", field), timeout_ms);
        }
        if let Some(ttl) = handler.cache_ttl_secs {
            check_nonzero(&mut errors, &format!("{}.cache_ttl_secs", field), ttl);
        }
    }

    let mut seen = HashSet::new();
    for (i, provider) in config.providers.iter().enumerate() {
        let field = format!("providers[{}]", i);
        check_name(&mut errors, &mut seen, &field, &provider.name);
        if let Some(base_url) = &provider.pool.base_url {
            if Url::parse(base_url).is_err() {
                errors.push(ValidationError::InvalidUrl {
                    field: format!("{}.base_url", field),
                    value: base_url.clone(),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_nonzero(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero {
            field: field.to_string(),
        });
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
}

fn check_name<'a>(
    errors: &mut Vec<ValidationError>,
    seen: &mut HashSet<&'a str>,
    field: &str,
    name: &'a str,
) {
    if name.is_empty() {
        errors.push(ValidationError::Empty {
            field: format!("{}.name", field),
        });
    } else if !seen.insert(name) {
        errors.push(ValidationError::Duplicate {
            field: field.to_string(),
            name: name.to_string(),
        });
    }
}

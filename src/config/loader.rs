//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ResilienceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ResilienceConfig, ConfigError> {
    let config: ResilienceConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ResilienceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::types::FallbackType;

    const SAMPLE: &str = r#"
[observability]
log_level = "debug"
metrics_enabled = false

[bulkhead]
max_concurrency = 4

[[bulkhead.pools]]
name = "sanctions"
max_concurrency = 2
timeout_ms = 500

[fallback]
default_timeout_ms = 250

[[fallback.handlers]]
service = "sanctions"
fallback_type = "cached_response"
cache_ttl_secs = 60

[[providers]]
name = "pep"
base_url = "http://127.0.0.1:9000"
max_retries = 2
retry_delay_ms = 50
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse_config(SAMPLE).unwrap();
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(config.bulkhead.max_concurrency, 4);
        assert_eq!(config.bulkhead.max_queue_size, 50);
        assert_eq!(config.bulkhead.pools[0].max_queue_size, 0);
        assert_eq!(config.bulkhead.pools[0].capacity().max_concurrency, 2);
        assert_eq!(config.fallback.handlers[0].fallback_type, FallbackType::CachedResponse);
        assert!(config.fallback.handlers[0].enabled);
        assert_eq!(config.providers[0].pool.max_retries, 2);
        assert_eq!(config.providers[0].pool.max_conns_per_host, 0);

        let round_trip: ResilienceConfig =
            toml::from_str(&toml::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }

    #[test]
    fn test_validation_errors_surface() {
        let err = parse_config("[bulkhead]\nmax_concurrency = 0\ntimeout_ms = 0\n").unwrap_err();
        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_file() {
        let err = load_config(Path::new("/nonexistent/resilience.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}

use crate::config::types::{
    Config, FetcherConfig, FilterConfig, OutputConfig, OutputFormat, PipelineConfig, SeedConfig,
};
use crate::ConfigError;
use regex::Regex;
use url::Url;

/// Upper bound for any worker pool
const MAX_WORKERS: usize = 256;

/// Shortest queue wait that still lets workers make progress
const MIN_QUEUE_WAIT_MS: u64 = 10;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_pipeline_config(&config.pipeline)?;
    validate_fetcher_config(&config.fetcher)?;
    validate_filter_config(&config.filter)?;
    validate_output_config(&config.output)?;
    if let Some(seed) = &config.seed {
        validate_seed(seed)?;
    }
    Ok(())
}

/// Validates worker counts and queue timing
fn validate_pipeline_config(config: &PipelineConfig) -> Result<(), ConfigError> {
    for (name, count) in [
        ("fetch-workers", config.fetch_workers),
        ("parse-workers", config.parse_workers),
        ("save-workers", config.save_workers),
    ] {
        if count < 1 || count > MAX_WORKERS {
            return Err(ConfigError::Validation(format!(
                "{} must be between 1 and {}, got {}",
                name, MAX_WORKERS, count
            )));
        }
    }

    if config.queue_wait_ms < MIN_QUEUE_WAIT_MS {
        return Err(ConfigError::Validation(format!(
            "queue-wait-ms must be >= {}ms, got {}ms",
            MIN_QUEUE_WAIT_MS, config.queue_wait_ms
        )));
    }

    Ok(())
}

/// Validates fetcher timeouts and user agents
fn validate_fetcher_config(config: &FetcherConfig) -> Result<(), ConfigError> {
    if config.connect_timeout_ms == 0 || config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "fetcher timeouts must be greater than zero".to_string(),
        ));
    }

    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "user-agents cannot contain empty entries".to_string(),
        ));
    }

    Ok(())
}

/// Validates filter patterns and Bloom filter sizing
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.allow.is_empty() {
        return Err(ConfigError::Validation(
            "filter.allow must contain at least one pattern (e.g. \"^http\")".to_string(),
        ));
    }

    for pattern in config.deny.iter().chain(config.allow.iter()) {
        Regex::new(pattern).map_err(|e| {
            ConfigError::InvalidPattern(format!("'{}': {}", pattern, e))
        })?;
    }

    if let Some(capacity) = config.bloom_capacity {
        if capacity < 1 {
            return Err(ConfigError::Validation(
                "bloom-capacity must be >= 1".to_string(),
            ));
        }

        if !(config.bloom_error_rate > 0.0 && config.bloom_error_rate < 1.0) {
            return Err(ConfigError::Validation(format!(
                "bloom-error-rate must be between 0 and 1, got {}",
                config.bloom_error_rate
            )));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    let needs_path = matches!(config.format, OutputFormat::Json | OutputFormat::Sqlite);

    match config.path.as_deref() {
        Some(path) if path.trim().is_empty() => Err(ConfigError::Validation(
            "output path cannot be empty".to_string(),
        )),
        None if needs_path => Err(ConfigError::Validation(format!(
            "output format {:?} requires a path",
            config.format
        ))),
        _ => Ok(()),
    }
}

/// Validates the seed task
pub(crate) fn validate_seed(seed: &SeedConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&seed.url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed.url, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Validation(format!(
            "Seed URL '{}' must use http or https",
            seed.url
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_worker_bounds() {
        let mut config = Config::default();
        config.pipeline.fetch_workers = 0;
        assert!(validate(&config).is_err());

        config.pipeline.fetch_workers = MAX_WORKERS + 1;
        assert!(validate(&config).is_err());

        config.pipeline.fetch_workers = 1;
        config.pipeline.save_workers = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_queue_wait_minimum() {
        let mut config = Config::default();
        config.pipeline.queue_wait_ms = 5;
        assert!(matches!(validate(&config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_invalid_filter_pattern() {
        let mut config = Config::default();
        config.filter.deny.push("[unclosed".to_string());
        assert!(matches!(
            validate(&config),
            Err(ConfigError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_empty_allow_list_rejected() {
        let mut config = Config::default();
        config.filter.allow.clear();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_bloom_error_rate_bounds() {
        let mut config = Config::default();
        config.filter.bloom_capacity = Some(100);
        config.filter.bloom_error_rate = 1.5;
        assert!(validate(&config).is_err());

        config.filter.bloom_error_rate = 0.01;
        assert!(validate(&config).is_ok());

        config.filter.bloom_capacity = Some(0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_output_path_rules() {
        let mut config = Config::default();
        config.output.path = None;
        assert!(validate(&config).is_err());

        config.output.format = OutputFormat::Text;
        assert!(validate(&config).is_ok());

        config.output.path = Some("  ".to_string());
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_seed_validation() {
        assert!(validate_seed(&SeedConfig::new("https://example.com/")).is_ok());
        assert!(validate_seed(&SeedConfig::new("http://127.0.0.1:8080/")).is_ok());
        assert!(matches!(
            validate_seed(&SeedConfig::new("not a url")),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_seed(&SeedConfig::new("ftp://example.com/")),
            Err(ConfigError::Validation(_))
        ));
    }
}

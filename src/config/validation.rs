use crate::config::types::{CatalogConfig, Config, HarvestConfig, OutputConfig, SourceConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_source_config(&config.source)?;
    validate_catalog_config(&config.catalog)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates harvest run settings
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.edition.trim().is_empty() {
        return Err(ConfigError::Validation(
            "edition cannot be empty".to_string(),
        ));
    }

    if config.workers < 1 || config.workers > 100 {
        return Err(ConfigError::Validation(format!(
            "workers must be between 1 and 100, got {}",
            config.workers
        )));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch-size must be >= 1, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

/// Validates the remote source settings
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.user_agent.is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-ms must be > 0".to_string(),
        ));
    }

    // The watchdog bounds the whole attempt, so it must outlast the request
    if config.watchdog_timeout_ms <= config.request_timeout_ms {
        return Err(ConfigError::Validation(format!(
            "watchdog-timeout-ms ({}) must be greater than request-timeout-ms ({})",
            config.watchdog_timeout_ms, config.request_timeout_ms
        )));
    }

    Ok(())
}

/// Validates catalog paths
fn validate_catalog_config(config: &CatalogConfig) -> Result<(), ConfigError> {
    if config.books_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "books-path cannot be empty".to_string(),
        ));
    }

    if config.editions_path.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "editions-path cannot be empty".to_string(),
        ));
    }

    if let Some(rules) = &config.rules_path {
        if rules.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "rules-path cannot be empty when present".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "output directory cannot be empty".to_string(),
        ));
    }

    if config.markup_directory.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "markup-directory cannot be empty".to_string(),
        ));
    }

    if config.flush_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "flush-attempts must be >= 1, got {}",
            config.flush_attempts
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::ContentMode;
    use std::path::PathBuf;

    fn source() -> SourceConfig {
        SourceConfig {
            base_url: "https://www.biblegateway.com/passage".to_string(),
            user_agent: "TestAgent/1.0".to_string(),
            watchdog_timeout_ms: 5000,
            request_timeout_ms: 3000,
            session_retries: 1,
            session_backoff_ms: 100,
            max_attempts: 0,
            retry_backoff_ms: 0,
        }
    }

    fn harvest() -> HarvestConfig {
        HarvestConfig {
            edition: "AMP".to_string(),
            workers: 20,
            batch_size: 100,
            mode: ContentMode::Text,
            ascii_only: true,
        }
    }

    #[test]
    fn test_validate_harvest_config() {
        assert!(validate_harvest_config(&harvest()).is_ok());

        let mut config = harvest();
        config.workers = 101;
        assert!(validate_harvest_config(&config).is_err());

        let mut config = harvest();
        config.batch_size = 0;
        assert!(validate_harvest_config(&config).is_err());

        let mut config = harvest();
        config.edition = "  ".to_string();
        assert!(validate_harvest_config(&config).is_err());
    }

    #[test]
    fn test_validate_source_config() {
        assert!(validate_source_config(&source()).is_ok());

        let mut config = source();
        config.base_url = "not a url".to_string();
        assert!(matches!(
            validate_source_config(&config),
            Err(ConfigError::InvalidUrl(_))
        ));

        let mut config = source();
        config.base_url = "ftp://example.com/passage".to_string();
        assert!(validate_source_config(&config).is_err());
    }

    #[test]
    fn test_watchdog_must_exceed_request_timeout() {
        let mut config = source();
        config.watchdog_timeout_ms = 3000;
        assert!(validate_source_config(&config).is_err());

        config.watchdog_timeout_ms = 3001;
        assert!(validate_source_config(&config).is_ok());
    }

    #[test]
    fn test_validate_output_config() {
        let config = OutputConfig {
            directory: PathBuf::from("data"),
            markup_directory: PathBuf::from("data/html"),
            flush_attempts: 0,
            flush_backoff_ms: 200,
        };
        assert!(validate_output_config(&config).is_err());
    }
}

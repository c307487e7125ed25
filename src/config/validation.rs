use crate::config::types::{
    Config, EngineConfig, MarketConfig, OutputConfig, ReviewsConfig, TargetConfig,
};
use crate::url::Market;
use crate::ConfigError;
use scraper::Selector;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_engine_config(&config.engine)?;
    validate_market_config(&config.market)?;
    validate_target_config(&config.target)?;
    validate_output_config(&config.output)?;
    validate_reviews_config(&config.reviews)?;
    Ok(())
}

/// Validates engine configuration
fn validate_engine_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if !(config.rate_per_second > 0.0 && config.rate_per_second <= 1000.0) {
        return Err(ConfigError::Validation(format!(
            "rate_per_second must be in (0, 1000], got {}",
            config.rate_per_second
        )));
    }

    if config.concurrency < 1 || config.concurrency > 1024 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 1024, got {}",
            config.concurrency
        )));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.max_inner_attempts < 1 {
        return Err(ConfigError::Validation(
            "max_inner_attempts must be >= 1".to_string(),
        ));
    }

    if config.stagnation_cap < 1 {
        return Err(ConfigError::Validation(
            "stagnation_cap must be >= 1".to_string(),
        ));
    }

    if config.progress_every < 1 {
        return Err(ConfigError::Validation(
            "progress_every must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates market configuration
fn validate_market_config(config: &MarketConfig) -> Result<(), ConfigError> {
    if Market::from_code(&config.country).is_none() {
        return Err(ConfigError::UnknownMarket(config.country.clone()));
    }

    if config.zipcode.trim().is_empty() {
        return Err(ConfigError::Validation("zipcode cannot be empty".to_string()));
    }

    if let Some(base_url) = &config.base_url {
        if url::Url::parse(base_url).is_err() {
            return Err(ConfigError::Validation(format!(
                "base_url is not a valid URL: '{}'",
                base_url
            )));
        }
    }

    Ok(())
}

/// Validates target configuration
fn validate_target_config(config: &TargetConfig) -> Result<(), ConfigError> {
    if config.info_type.is_empty() {
        return Err(ConfigError::Validation(
            "info_type cannot be empty".to_string(),
        ));
    }

    // Used as a path segment and table value
    if !config
        .info_type
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "info_type must contain only alphanumerics, '_' and '-', got '{}'",
            config.info_type
        )));
    }

    parse_selector(&config.expected_content)?;

    if config.footer_marker.is_empty() {
        return Err(ConfigError::Validation(
            "footer_marker cannot be empty".to_string(),
        ));
    }

    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.path.is_empty() {
        return Err(ConfigError::Validation("output path cannot be empty".to_string()));
    }

    Ok(())
}

/// Validates review crawler configuration
fn validate_reviews_config(config: &ReviewsConfig) -> Result<(), ConfigError> {
    if config.workers < 1 || config.workers > 64 {
        return Err(ConfigError::Validation(format!(
            "reviews.workers must be between 1 and 64, got {}",
            config.workers
        )));
    }

    Ok(())
}

/// Parses a CSS selector, mapping the parser error into a config error
pub fn parse_selector(selector: &str) -> Result<Selector, ConfigError> {
    Selector::parse(selector).map_err(|e| ConfigError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })
}

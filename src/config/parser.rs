use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;

    // Credentials usually live in the environment, not in the file
    if config.proxy.username.is_none() {
        config.proxy.username = std::env::var("HARVEST_PROXY_USERNAME").ok();
    }
    if config.proxy.password.is_none() {
        config.proxy.password = std::env::var("HARVEST_PROXY_PASSWORD").ok();
    }

    validate(&config)?;

    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so two runs can be told apart by their settings.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OutputBackend;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let config_content = r#"
[engine]
rate-per-second = 4.0
concurrency = 16

[market]
country = "USA"
zipcode = "94103"

[target]
info-type = "asin_info"
expected-content = "div#productDetails_feature_div"
export-details = true
batch-size = 32

[output]
backend = "sqlite"
path = "./harvest.db"
"#;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.engine.rate_per_second, 4.0);
        assert_eq!(config.engine.concurrency, 16);
        assert_eq!(config.engine.timeout_secs, 16);
        assert_eq!(config.engine.stagnation_cap, 3);
        assert_eq!(config.market.zipcode, "94103");
        assert!(config.target.export_details);
        assert_eq!(config.target.batch_size, 32);
        assert_eq!(config.target.footer_marker, "© 1996-");
        assert_eq!(config.output.backend, OutputBackend::Sqlite);
    }

    #[test]
    fn test_defaults_applied_for_missing_sections() {
        let config_content = r##"
[target]
info-type = "asin_info"
expected-content = "#productTitle"

[output]
path = "./data"
"##;

        let file = create_temp_config(config_content);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.market.country, "USA");
        assert_eq!(config.market.zipcode, "10001");
        assert_eq!(config.engine.backoff_ms, 250);
        assert_eq!(config.engine.progress_every, 64);
        assert_eq!(config.output.backend, OutputBackend::Filesystem);
        assert_eq!(config.reviews.workers, 4);
        assert!(config.proxy.file.is_none());
    }

    #[test]
    fn test_load_config_with_invalid_path() {
        let result = load_config(Path::new("/nonexistent/harvest.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_with_invalid_toml() {
        let file = create_temp_config("this is not valid TOML {{{");
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_with_validation_error() {
        let config_content = r##"
[engine]
concurrency = 0

[target]
info-type = "asin_info"
expected-content = "#productTitle"

[output]
path = "./data"
"##;

        let file = create_temp_config(config_content);
        let result = load_config(file.path());
        assert!(matches!(result.unwrap_err(), ConfigError::Validation(_)));
    }

    #[test]
    fn test_compute_config_hash() {
        let file = create_temp_config("test content");

        let hash1 = compute_config_hash(file.path()).unwrap();
        let hash2 = compute_config_hash(file.path()).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_different_content_different_hash() {
        let file1 = create_temp_config("content 1");
        let file2 = create_temp_config("content 2");

        let hash1 = compute_config_hash(file1.path()).unwrap();
        let hash2 = compute_config_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }
}

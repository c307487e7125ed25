//! Configuration module for the harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use asin_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Rate ceiling: {} req/s", config.engine.rate_per_second);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CaptchaConfig, Config, EngineConfig, MarketConfig, OutputBackend, OutputConfig, ProxyConfig,
    ReviewsConfig, SessionConfig, TargetConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::{parse_selector, validate};

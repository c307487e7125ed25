use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for the harvester
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub market: MarketConfig,
    pub target: TargetConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub captcha: CaptchaConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub reviews: ReviewsConfig,
}

/// Fetch engine behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct EngineConfig {
    /// Global request ceiling shared by every in-flight attempt
    pub rate_per_second: f64,

    /// Maximum number of attempts in flight within one round
    pub concurrency: usize,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,

    /// Sleep between in-place retries after an unexpected error (milliseconds)
    pub backoff_ms: u64,

    /// In-place attempts before an unexpected error turns into a retry
    pub max_inner_attempts: u32,

    /// Consecutive same-size rounds before the retry loop escalates
    pub stagnation_cap: u32,

    /// Log progress every N requests issued / responses received
    pub progress_every: u64,

    /// Optional wall-clock budget for the whole retry loop (seconds)
    pub retry_budget_secs: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_per_second: 8.0,
            concurrency: 64,
            timeout_secs: 16,
            backoff_ms: 250,
            max_inner_attempts: 20,
            stagnation_cap: 3,
            progress_every: 64,
            retry_budget_secs: None,
        }
    }
}

/// Marketplace and geotargeting
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct MarketConfig {
    /// ISO-3166 alpha-3 market code (e.g. "USA", "GBR")
    pub country: String,

    /// Postal code the session cookies are geotargeted to
    pub zipcode: String,

    /// Check the displayed delivery location on every product page
    pub verify_location: bool,

    /// Storefront origin override, e.g. a staging mirror
    pub base_url: Option<String>,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            country: "USA".to_string(),
            zipcode: "10001".to_string(),
            verify_location: true,
            base_url: None,
        }
    }
}

/// What is being harvested and how a genuine page is recognised
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TargetConfig {
    /// Dataset name, used as the storage prefix and detail column
    pub info_type: String,

    /// CSS selector that must match on a structurally valid page
    pub expected_content: String,

    /// Footer text present on every genuine product page
    #[serde(default = "default_footer_marker")]
    pub footer_marker: String,

    /// Append the matched element to detail batches
    #[serde(default)]
    pub export_details: bool,

    /// Detail records per batch file
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_footer_marker() -> String {
    "© 1996-".to_string()
}

fn default_batch_size() -> usize {
    64
}

/// Egress proxy pool
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    /// File with one `host:port` per line; absent means direct connections
    pub file: Option<String>,

    pub username: Option<String>,

    pub password: Option<String>,
}

/// Session (cookie set) source
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct SessionConfig {
    /// TOML file holding a flat `name = "value"` cookie table
    pub cookie_file: Option<String>,

    /// Inline cookies, merged over the file contents
    pub cookies: BTreeMap<String, String>,
}

/// CAPTCHA image oracle
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CaptchaConfig {
    /// Program and arguments; the image URL is appended and the answer read
    /// from stdout
    pub command: Vec<String>,
}

/// Where harvested pages land
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub backend: OutputBackend,

    /// Root directory (filesystem) or database file (sqlite)
    pub path: String,
}

/// Storage backend selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputBackend {
    #[default]
    Filesystem,
    Sqlite,
}

/// Review crawler worker pool
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReviewsConfig {
    /// Worker threads, each owning one session
    pub workers: usize,

    /// Session replacements allowed per page load before the unit fails
    pub max_session_resets: u32,
}

impl Default for ReviewsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_session_resets: 5,
        }
    }
}

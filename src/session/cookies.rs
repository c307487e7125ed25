//! Geotargeted session cookies

use crate::config::SessionConfig;
use crate::url::Market;
use crate::{HarvestError, Result};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;

/// A cookie set pinned to one postal code in one market
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet {
    cookies: BTreeMap<String, String>,
}

impl CookieSet {
    pub fn new(cookies: BTreeMap<String, String>) -> Self {
        Self { cookies }
    }

    /// Renders the set as a `Cookie` header value
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

/// Produces the session every fetch attempt runs under
///
/// A failure here aborts the whole run.
pub trait CookieProvider: Send + Sync {
    fn acquire(
        &self,
        zipcode: &str,
        market: &Market,
    ) -> impl Future<Output = Result<CookieSet>> + Send;
}

/// Cookies captured ahead of time: a TOML table file plus inline overrides
#[derive(Debug, Clone, Default)]
pub struct StaticCookieProvider {
    file: Option<PathBuf>,
    inline: BTreeMap<String, String>,
}

impl StaticCookieProvider {
    pub fn new(file: Option<PathBuf>, inline: BTreeMap<String, String>) -> Self {
        Self { file, inline }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(
            config.cookie_file.as_ref().map(PathBuf::from),
            config.cookies.clone(),
        )
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let mut cookies = BTreeMap::new();
        if let Some(path) = &self.file {
            let content = std::fs::read_to_string(path).map_err(|e| {
                HarvestError::Cookies(format!("cannot read {}: {}", path.display(), e))
            })?;
            let table: BTreeMap<String, String> = toml::from_str(&content).map_err(|e| {
                HarvestError::Cookies(format!("cannot parse {}: {}", path.display(), e))
            })?;
            cookies.extend(table);
        }
        cookies.extend(self.inline.clone());
        Ok(cookies)
    }
}

impl CookieProvider for StaticCookieProvider {
    async fn acquire(&self, zipcode: &str, market: &Market) -> Result<CookieSet> {
        let cookies = self.load()?;
        if cookies.is_empty() {
            return Err(HarvestError::Cookies(format!(
                "no cookies available for {} in {}",
                zipcode, market.code
            )));
        }
        tracing::info!(
            "Acquired {} session cookies for {} ({})",
            cookies.len(),
            zipcode,
            market.code
        );
        Ok(CookieSet::new(cookies))
    }
}

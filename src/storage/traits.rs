//! Storage traits and error types
//!
//! This module defines the exporter interface the fetch engine lands pages
//! through, the key layout shared by every backend, and the error type.

use crate::state::DetailRecord;
use chrono::{DateTime, TimeZone};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Partition a raw page lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageCategory {
    Valid,
    /// Fetched, but missing the expected content
    Invalid,
}

impl PageCategory {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "invalid" => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Address of one raw page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawKey {
    /// Dataset (info type), the top-level prefix
    pub dataset: String,

    /// Run date partition, `YYYY/MM/DD`
    pub rundate: String,

    pub category: PageCategory,

    pub identifier: String,
}

impl RawKey {
    pub fn new(
        dataset: impl Into<String>,
        rundate: impl Into<String>,
        category: PageCategory,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            dataset: dataset.into(),
            rundate: rundate.into(),
            category,
            identifier: identifier.into(),
        }
    }

    /// Object path relative to the storage root
    pub fn path(&self) -> String {
        let category = match self.category {
            PageCategory::Valid => "",
            PageCategory::Invalid => "/invalid",
        };
        format!(
            "{}/raw/{}{}/{}.html",
            self.dataset, self.rundate, category, self.identifier
        )
    }

    /// Rejects components that would escape the partition
    pub fn validate(&self) -> StorageResult<()> {
        let segment_ok = |s: &str| !s.is_empty() && !s.contains("..") && !s.contains('\\');
        if !segment_ok(&self.dataset) || self.dataset.contains('/') {
            return Err(StorageError::InvalidKey(format!("dataset '{}'", self.dataset)));
        }
        if !segment_ok(&self.rundate) || self.rundate.starts_with('/') {
            return Err(StorageError::InvalidKey(format!("rundate '{}'", self.rundate)));
        }
        if !segment_ok(&self.identifier) || self.identifier.contains('/') {
            return Err(StorageError::InvalidKey(format!(
                "identifier '{}'",
                self.identifier
            )));
        }
        Ok(())
    }
}

/// Run date partition (`YYYY/MM/DD`) for a moment, in that moment's zone
pub fn rundate_for<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y/%m/%d").to_string()
}

/// Name of a detail batch: SHA-256 of the identifiers joined by `_`
pub fn batch_name(records: &[DetailRecord]) -> String {
    let joined = records
        .iter()
        .map(|r| r.identifier.as_str())
        .collect::<Vec<_>>()
        .join("_");
    hex::encode(Sha256::digest(joined.as_bytes()))
}

/// Durable sink for raw pages and detail batches
///
/// Calls are synchronous and may come from many attempts at once.
pub trait Exporter: Send + Sync {
    /// Writes one raw page, replacing any previous copy
    fn put_raw(&self, key: &RawKey, body: &str) -> StorageResult<()>;

    /// Writes one detail batch and returns its name
    fn put_batch(
        &self,
        dataset: &str,
        rundate: &str,
        records: &[DetailRecord],
    ) -> StorageResult<String>;

    /// Identifiers already stored for a run, valid and invalid alike
    fn fetched(&self, dataset: &str, rundate: &str) -> StorageResult<HashSet<String>>;
}

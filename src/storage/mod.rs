//! Storage module for landing harvested pages
//!
//! This module handles everything written by a run:
//! - Raw pages, partitioned by dataset, run date and valid/invalid
//! - Detail batches named by the hash of their identifiers
//! - Listing what a run already stored, so a restart skips it

mod fs;
mod schema;
mod sqlite;
mod traits;

pub use fs::FsExporter;
pub use sqlite::SqliteExporter;
pub use traits::{
    batch_name, rundate_for, Exporter, PageCategory, RawKey, StorageError, StorageResult,
};

use crate::config::{OutputBackend, OutputConfig};
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// Tries per raw-page write before giving up
pub const RAW_WRITE_ATTEMPTS: u32 = 4;

/// Opens the exporter selected by the `[output]` section
pub fn open_exporter(config: &OutputConfig) -> Result<Arc<dyn Exporter>> {
    let exporter: Arc<dyn Exporter> = match config.backend {
        OutputBackend::Filesystem => Arc::new(FsExporter::new(&config.path)),
        OutputBackend::Sqlite => Arc::new(SqliteExporter::new(Path::new(&config.path))?),
    };
    tracing::info!("Output: {:?} at {}", config.backend, config.path);
    Ok(exporter)
}

/// Writes a raw page, retrying on any error up to [`RAW_WRITE_ATTEMPTS`] times
pub fn put_raw_with_retry(exporter: &dyn Exporter, key: &RawKey, body: &str) -> StorageResult<()> {
    let mut attempt = 1;
    loop {
        match exporter.put_raw(key, body) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < RAW_WRITE_ATTEMPTS => {
                tracing::warn!(
                    "Write of {} failed (attempt {}/{}): {}",
                    key.path(),
                    attempt,
                    RAW_WRITE_ATTEMPTS,
                    e
                );
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

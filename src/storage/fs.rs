//! Filesystem exporter
//!
//! Layout under the root directory:
//!
//! ```text
//! <dataset>/raw/<rundate>/<id>.html
//! <dataset>/raw/<rundate>/invalid/<id>.html
//! <dataset>/conformed/<rundate>/<sha256>.csv
//! ```

use crate::state::DetailRecord;
use crate::storage::traits::{batch_name, Exporter, PageCategory, RawKey, StorageResult};
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes pages and batches as plain files
#[derive(Debug, Clone)]
pub struct FsExporter {
    root: PathBuf,
}

impl FsExporter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a raw page
    pub fn raw_path(&self, key: &RawKey) -> PathBuf {
        self.root.join(key.path())
    }

    fn raw_dir(&self, dataset: &str, rundate: &str, category: PageCategory) -> PathBuf {
        let dir = self.root.join(dataset).join("raw").join(rundate);
        match category {
            PageCategory::Valid => dir,
            PageCategory::Invalid => dir.join("invalid"),
        }
    }

    /// Directory holding the detail batches of a run
    pub fn conformed_dir(&self, dataset: &str, rundate: &str) -> PathBuf {
        self.root.join(dataset).join("conformed").join(rundate)
    }
}

/// Writes through a uniquely named temporary sibling so readers never see a
/// partial file and concurrent writers never share one
fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(contents)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn html_stems(dir: &Path, into: &mut HashSet<String>) -> std::io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some("html") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                into.insert(stem.to_string());
            }
        }
    }
    Ok(())
}

impl Exporter for FsExporter {
    fn put_raw(&self, key: &RawKey, body: &str) -> StorageResult<()> {
        key.validate()?;
        write_atomic(&self.raw_path(key), body.as_bytes())?;
        Ok(())
    }

    fn put_batch(
        &self,
        dataset: &str,
        rundate: &str,
        records: &[DetailRecord],
    ) -> StorageResult<String> {
        let name = batch_name(records);

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["asin", dataset])?;
        for record in records {
            writer.write_record([
                record.identifier.as_str(),
                record.marker.as_deref().unwrap_or(""),
            ])?;
        }
        let data = writer
            .into_inner()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;

        let path = self
            .conformed_dir(dataset, rundate)
            .join(format!("{}.csv", name));
        write_atomic(&path, &data)?;
        tracing::debug!("Wrote batch of {} records to {}", records.len(), path.display());
        Ok(name)
    }

    fn fetched(&self, dataset: &str, rundate: &str) -> StorageResult<HashSet<String>> {
        let mut ids = HashSet::new();
        html_stems(&self.raw_dir(dataset, rundate, PageCategory::Valid), &mut ids)?;
        html_stems(&self.raw_dir(dataset, rundate, PageCategory::Invalid), &mut ids)?;
        Ok(ids)
    }
}

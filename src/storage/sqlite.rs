//! SQLite exporter
//!
//! This module provides a single-file implementation of the Exporter trait.

use crate::state::DetailRecord;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{batch_name, Exporter, RawKey, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite storage backend
pub struct SqliteExporter {
    conn: Mutex<Connection>,
}

impl SqliteExporter {
    /// Opens or creates the database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Stored body of a page, if any
    pub fn raw_body(&self, dataset: &str, rundate: &str, identifier: &str) -> StorageResult<Option<String>> {
        use rusqlite::OptionalExtension;
        let body = self
            .conn()
            .query_row(
                "SELECT body FROM raw_pages WHERE dataset = ?1 AND rundate = ?2 AND identifier = ?3",
                params![dataset, rundate, identifier],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    /// Number of detail records written under a batch name
    pub fn count_batch(&self, batch: &str) -> StorageResult<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM detail_records WHERE batch = ?1",
            params![batch],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl Exporter for SqliteExporter {
    fn put_raw(&self, key: &RawKey, body: &str) -> StorageResult<()> {
        key.validate()?;
        let now = Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT OR REPLACE INTO raw_pages (dataset, rundate, identifier, category, body, stored_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                key.dataset,
                key.rundate,
                key.identifier,
                key.category.to_db_string(),
                body,
                now
            ],
        )?;
        Ok(())
    }

    fn put_batch(
        &self,
        dataset: &str,
        rundate: &str,
        records: &[DetailRecord],
    ) -> StorageResult<String> {
        let name = batch_name(records);
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO detail_records (batch, dataset, rundate, identifier, marker, exported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for record in records {
                stmt.execute(params![
                    name,
                    dataset,
                    rundate,
                    record.identifier,
                    record.marker,
                    now
                ])?;
            }
        }
        tx.commit()?;

        Ok(name)
    }

    fn fetched(&self, dataset: &str, rundate: &str) -> StorageResult<HashSet<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT identifier FROM raw_pages WHERE dataset = ?1 AND rundate = ?2")?;
        let ids = stmt
            .query_map(params![dataset, rundate], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }
}

//! Database schema definitions
//!
//! This module contains the SQL schema for the SQLite exporter.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- One row per stored page; a re-fetch replaces the previous copy
CREATE TABLE IF NOT EXISTS raw_pages (
    dataset TEXT NOT NULL,
    rundate TEXT NOT NULL,
    identifier TEXT NOT NULL,
    category TEXT NOT NULL,
    body TEXT NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (dataset, rundate, identifier)
);

CREATE INDEX IF NOT EXISTS idx_raw_pages_run ON raw_pages(dataset, rundate);

-- Detail batches, one row per record
CREATE TABLE IF NOT EXISTS detail_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    batch TEXT NOT NULL,
    dataset TEXT NOT NULL,
    rundate TEXT NOT NULL,
    identifier TEXT NOT NULL,
    marker TEXT,
    exported_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_detail_records_batch ON detail_records(batch);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

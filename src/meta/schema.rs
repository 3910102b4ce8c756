//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Tables: one per uploaded dataset
CREATE TABLE IF NOT EXISTS data_tables (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    original_filename TEXT,
    created_at TEXT NOT NULL,
    row_count INTEGER NOT NULL DEFAULT 0,
    col_count INTEGER NOT NULL DEFAULT 0,
    columns_json TEXT NOT NULL
);

-- Rows: immutable once written, dense zero-based row_index per table
CREATE TABLE IF NOT EXISTS data_rows (
    table_id TEXT NOT NULL REFERENCES data_tables(id),
    row_index INTEGER NOT NULL,
    data_json TEXT NOT NULL,
    row_text TEXT NOT NULL,
    PRIMARY KEY (table_id, row_index)
);

-- Jobs: observable state of ingest and reindex runs
CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0,
    message TEXT NOT NULL DEFAULT '',
    table_id TEXT
);

-- Highlights: write-once citation sets
CREATE TABLE IF NOT EXISTS highlights (
    id TEXT PRIMARY KEY,
    table_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    rows_json TEXT NOT NULL,
    cols_json TEXT NOT NULL,
    evidence_json TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_tables_created ON data_tables(created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
CREATE INDEX IF NOT EXISTS idx_jobs_table ON jobs(table_id);
CREATE INDEX IF NOT EXISTS idx_highlights_table ON highlights(table_id);
"#;

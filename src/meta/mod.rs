//! Metadata storage using SQLite
//!
//! This module handles all local relational storage:
//! - Tables (uploaded datasets and their column layout)
//! - Rows (the Row Store, see `rows.rs`)
//! - Jobs (ingest/reindex state machine)
//! - Highlights (recorded citation sets, see `highlights.rs`)

mod highlights;
mod rows;
mod schema;

pub use highlights::*;
pub use rows::*;
pub use schema::*;

use crate::config::Config;
use crate::error::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Job lifecycle status
///
/// `queued -> running -> indexing -> done`, with `error` reachable from any
/// non-terminal state. Forward skips (e.g. `running -> done`) are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Indexing,
    Done,
    Error,
}

impl JobStatus {
    /// Position along the happy path
    fn ordinal(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Indexing => 2,
            JobStatus::Done | JobStatus::Error => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }

    /// Staying in the same non-terminal state counts as a valid (progress-only) update.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == JobStatus::Error || next.ordinal() >= self.ordinal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Indexing => write!(f, "indexing"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Error => write!(f, "error"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "indexing" => Ok(JobStatus::Indexing),
            "done" => Ok(JobStatus::Done),
            "error" => Ok(JobStatus::Error),
            _ => Err(Error::Other(format!("Unknown job status: {}", s))),
        }
    }
}

/// An uploaded dataset
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Table {
    pub id: String,
    pub name: String,
    pub original_filename: Option<String>,
    pub created_at: String,
    pub row_count: i64,
    pub col_count: i64,
    pub columns_json: String,
}

impl Table {
    pub fn new(name: String, original_filename: Option<String>, columns: &[String]) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            original_filename,
            created_at: Utc::now().to_rfc3339(),
            row_count: 0,
            col_count: columns.len() as i64,
            columns_json: serde_json::to_string(columns).unwrap_or_else(|_| "[]".to_string()),
        }
    }

    /// Column names in table order
    pub fn columns(&self) -> Vec<String> {
        serde_json::from_str(&self.columns_json).unwrap_or_default()
    }
}

/// An asynchronous unit of work (ingest or reindex)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub status: String,
    pub progress: i64,
    pub message: String,
    pub table_id: Option<String>,
}

impl Job {
    pub fn new(status: JobStatus, progress: i64, message: &str, table_id: Option<String>) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now.clone(),
            updated_at: now,
            status: status.to_string(),
            progress: progress.clamp(0, 100),
            message: message.to_string(),
            table_id,
        }
    }

    pub fn get_status(&self) -> Result<JobStatus> {
        self.status.parse()
    }
}

/// A partial update applied to a Job
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<i64>,
    pub message: Option<String>,
    pub table_id: Option<String>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn progress(mut self, progress: i64) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn table(mut self, table_id: impl Into<String>) -> Self {
        self.table_id = Some(table_id.into());
        self
    }
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file).await
    }

    /// Create database with path directly (without full config), initializing the schema
    pub async fn new(db_path: &Path) -> Result<Self> {
        let db = Self::open(db_path).await?;
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='data_tables'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Table Operations =====

    /// Insert a new table record
    pub async fn insert_table(&self, table: &Table) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO data_tables (id, name, original_filename, created_at, row_count, col_count, columns_json)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&table.id)
        .bind(&table.name)
        .bind(&table.original_filename)
        .bind(&table.created_at)
        .bind(table.row_count)
        .bind(table.col_count)
        .bind(&table.columns_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get table by ID
    pub async fn get_table(&self, id: &str) -> Result<Option<Table>> {
        let table = sqlx::query_as::<_, Table>("SELECT * FROM data_tables WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(table)
    }

    /// Most recently created table
    pub async fn latest_table(&self) -> Result<Option<Table>> {
        let table = sqlx::query_as::<_, Table>(
            "SELECT * FROM data_tables ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(table)
    }

    /// Resolve `"latest"` or a table id into a Table
    pub async fn resolve_table(&self, reference: &str) -> Result<Table> {
        let reference = reference.trim();
        let table = if reference.is_empty() || reference.eq_ignore_ascii_case("latest") {
            self.latest_table().await?
        } else {
            self.get_table(reference).await?
        };
        table.ok_or_else(|| Error::TableNotFound(reference.to_string()))
    }

    /// List all tables, newest first
    pub async fn list_tables(&self) -> Result<Vec<Table>> {
        let tables = sqlx::query_as::<_, Table>(
            "SELECT * FROM data_tables ORDER BY created_at DESC, rowid DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(tables)
    }

    /// Record the number of rows actually written
    pub async fn set_row_count(&self, id: &str, row_count: i64) -> Result<()> {
        sqlx::query("UPDATE data_tables SET row_count = ? WHERE id = ?")
            .bind(row_count)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rename a table; the name is trimmed and must not be empty
    pub async fn rename_table(&self, id: &str, name: &str) -> Result<Table> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput("Table name must not be empty".to_string()));
        }

        let result = sqlx::query("UPDATE data_tables SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::TableNotFound(id.to_string()));
        }

        self.get_table(id)
            .await?
            .ok_or_else(|| Error::TableNotFound(id.to_string()))
    }

    /// Delete a table and everything it owns (rows, highlights, jobs)
    pub async fn delete_table(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM data_rows WHERE table_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM highlights WHERE table_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM jobs WHERE table_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM data_tables WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    // ===== Job Operations =====

    /// Insert a new job record
    pub async fn insert_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO jobs (id, created_at, updated_at, status, progress, message, table_id)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.id)
        .bind(&job.created_at)
        .bind(&job.updated_at)
        .bind(&job.status)
        .bind(job.progress)
        .bind(&job.message)
        .bind(&job.table_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Create and persist a new job
    pub async fn create_job(
        &self,
        status: JobStatus,
        progress: i64,
        message: &str,
        table_id: Option<String>,
    ) -> Result<Job> {
        let job = Job::new(status, progress, message, table_id);
        self.insert_job(&job).await?;
        Ok(job)
    }

    /// Get job by ID
    pub async fn get_job(&self, id: &str) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Jobs currently in any of the given states, oldest first
    pub async fn jobs_with_status(&self, statuses: &[JobStatus]) -> Result<Vec<Job>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT * FROM jobs WHERE status IN ({}) ORDER BY created_at, rowid",
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, Job>(&query);
        for status in statuses {
            query_builder = query_builder.bind(status.to_string());
        }
        Ok(query_builder.fetch_all(&self.pool).await?)
    }

    /// Apply an update to a job, enforcing the lifecycle rules.
    ///
    /// Progress never decreases, terminal states pin it at 100, and a
    /// job's table_id is never replaced once set. Terminal jobs reject
    /// every update with `InvalidTransition`.
    pub async fn update_job(&self, id: &str, update: JobUpdate) -> Result<Job> {
        let current = self
            .get_job(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))?;
        let from = current.get_status()?;
        let to = update.status.unwrap_or(from);

        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let progress = if to.is_terminal() {
            100
        } else {
            update
                .progress
                .unwrap_or(current.progress)
                .clamp(0, 100)
                .max(current.progress)
        };
        let message = update.message.unwrap_or(current.message);

        let result = sqlx::query(
            r#"
            UPDATE jobs SET
                status = ?,
                progress = MAX(progress, ?),
                message = ?,
                table_id = COALESCE(table_id, ?),
                updated_at = ?
            WHERE id = ? AND status NOT IN ('done', 'error')
            "#,
        )
        .bind(to.to_string())
        .bind(progress)
        .bind(&message)
        .bind(&update.table_id)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Another execution finished the job between our read and write
            let latest = self.get_job(id).await?;
            return Err(Error::InvalidTransition {
                from: latest.map(|j| j.status).unwrap_or_else(|| from.to_string()),
                to: to.to_string(),
            });
        }

        self.get_job(id)
            .await?
            .ok_or_else(|| Error::JobNotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (MetaDb, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let db = MetaDb::connect(&config).await.unwrap();
        db.init_schema().await.unwrap();
        (db, tmp)
    }

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Indexing));
        assert!(Running.can_transition_to(Done));
        assert!(Indexing.can_transition_to(Indexing));
        assert!(Queued.can_transition_to(Error));
        assert!(!Indexing.can_transition_to(Running));
        assert!(!Done.can_transition_to(Error));
        assert!(!Error.can_transition_to(Running));
        assert_eq!("INDEXING".parse::<JobStatus>().unwrap(), Indexing);
        assert!("paused".parse::<JobStatus>().is_err());
    }

    #[tokio::test]
    async fn test_table_crud() {
        let (db, _tmp) = setup_test_db().await;

        let columns = vec!["review".to_string(), "sentiment".to_string()];
        let table = Table::new("reviews".to_string(), Some("reviews.csv".to_string()), &columns);
        db.insert_table(&table).await.unwrap();

        let loaded = db.get_table(&table.id).await.unwrap().unwrap();
        assert_eq!(loaded.columns(), columns);
        assert_eq!(loaded.col_count, 2);
        assert_eq!(loaded.row_count, 0);

        db.set_row_count(&table.id, 3).await.unwrap();
        let renamed = db.rename_table(&table.id, "  Reviews 2024 ").await.unwrap();
        assert_eq!(renamed.name, "Reviews 2024");
        assert_eq!(renamed.row_count, 3);

        assert!(matches!(
            db.rename_table(&table.id, "   ").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            db.rename_table("missing", "x").await,
            Err(Error::TableNotFound(_))
        ));

        assert!(db.delete_table(&table.id).await.unwrap());
        assert!(db.get_table(&table.id).await.unwrap().is_none());
        assert!(!db.delete_table(&table.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_latest_table() {
        let (db, _tmp) = setup_test_db().await;

        assert!(matches!(
            db.resolve_table("latest").await,
            Err(Error::TableNotFound(_))
        ));

        let first = Table::new("first".to_string(), None, &["a".to_string()]);
        db.insert_table(&first).await.unwrap();
        let second = Table::new("second".to_string(), None, &["a".to_string()]);
        db.insert_table(&second).await.unwrap();

        assert_eq!(db.resolve_table("latest").await.unwrap().id, second.id);
        assert_eq!(db.resolve_table(&first.id).await.unwrap().id, first.id);
        assert_eq!(db.list_tables().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_job_progress_is_monotone() {
        let (db, _tmp) = setup_test_db().await;

        let job = db
            .create_job(JobStatus::Queued, 0, "Queued", None)
            .await
            .unwrap();

        let job = db
            .update_job(&job.id, JobUpdate::status(JobStatus::Running).progress(40))
            .await
            .unwrap();
        assert_eq!(job.progress, 40);

        let job = db
            .update_job(&job.id, JobUpdate::default().progress(10).message("late"))
            .await
            .unwrap();
        assert_eq!(job.progress, 40);
        assert_eq!(job.message, "late");

        let job = db
            .update_job(&job.id, JobUpdate::status(JobStatus::Done).progress(70))
            .await
            .unwrap();
        assert_eq!(job.get_status().unwrap(), JobStatus::Done);
        assert_eq!(job.progress, 100);
    }

    #[tokio::test]
    async fn test_job_rejects_backward_and_terminal_updates() {
        let (db, _tmp) = setup_test_db().await;

        let job = db
            .create_job(JobStatus::Indexing, 60, "Reindexing...", Some("t1".to_string()))
            .await
            .unwrap();

        let err = db
            .update_job(&job.id, JobUpdate::status(JobStatus::Running))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        db.update_job(&job.id, JobUpdate::status(JobStatus::Error).message("Failed: boom"))
            .await
            .unwrap();
        let err = db
            .update_job(&job.id, JobUpdate::default().progress(99))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let missing = db.update_job("nope", JobUpdate::default()).await.unwrap_err();
        assert!(missing.is_not_found());
    }

    #[tokio::test]
    async fn test_job_table_id_is_never_replaced() {
        let (db, _tmp) = setup_test_db().await;

        let job = db
            .create_job(JobStatus::Running, 1, "Parsing CSV...", None)
            .await
            .unwrap();
        let job = db
            .update_job(&job.id, JobUpdate::default().table("t1"))
            .await
            .unwrap();
        assert_eq!(job.table_id.as_deref(), Some("t1"));

        let job = db
            .update_job(&job.id, JobUpdate::default().table("t2"))
            .await
            .unwrap();
        assert_eq!(job.table_id.as_deref(), Some("t1"));

        let active = db
            .jobs_with_status(&[JobStatus::Running, JobStatus::Indexing])
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
    }
}

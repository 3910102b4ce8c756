//! Ingestion pipeline
//!
//! Parses an uploaded CSV into the Row Store, then embeds and indexes every
//! row, recording progress on a Job as it goes. Runs are detached from the
//! caller: every outcome, failures included, is only visible on the Job.

mod embed_phase;
mod job;
pub mod parse;
mod reconcile;

pub use job::*;
pub use reconcile::*;

use crate::error::{Error, Result};
use crate::meta::{JobStatus, Table};
use crate::services::Services;
use csv::StringRecord;
use std::io::Read;
use std::path::Path;
use tracing::{error, info, warn};

/// Drives ingest, embedding and resume runs over shared services
#[derive(Clone)]
pub struct Pipeline {
    services: Services,
}

/// Table name to use when the caller gave none: the upload's file stem
pub fn resolve_table_name(table_name: &str, original_name: &str) -> String {
    let trimmed = table_name.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    Path::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or("table")
        .to_string()
}

impl Pipeline {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Create the job an upload will report through
    pub async fn create_upload_job(&self) -> Result<crate::meta::Job> {
        self.services
            .db
            .create_job(JobStatus::Queued, 0, "", None)
            .await
    }

    /// Ingest a CSV stream under `job_id`.
    ///
    /// Never returns an error: failures while copying rows roll back the
    /// table's rows and mark the job `error`; embedding failures mark the
    /// job `error` and keep the vectors already written.
    pub async fn ingest<R: Read + Send>(
        &self,
        job_id: &str,
        source: R,
        original_name: &str,
        table_name: &str,
    ) {
        let tracker = JobTracker::new(self.services.db.clone(), job_id);

        match self
            .copy_rows(&tracker, source, original_name, table_name)
            .await
        {
            Ok(table) => {
                if self.services.config.ingest.embed_on_upload {
                    self.embed_table(job_id, &table).await;
                } else if let Err(e) = tracker
                    .finish(&format!(
                        "Done. Ingested {} rows. (Embedding skipped)",
                        table.row_count
                    ))
                    .await
                {
                    error!(job_id = %job_id, "Could not finish job: {}", e);
                }
            }
            Err(e) => {
                error!(job_id = %job_id, "Ingestion failed: {}", e);
                self.roll_back_rows(&tracker).await;
                tracker.fail(&e).await;
            }
        }
    }

    /// Parse the header, create the table and copy every record into the Row Store
    async fn copy_rows<R: Read + Send>(
        &self,
        tracker: &JobTracker,
        source: R,
        original_name: &str,
        table_name: &str,
    ) -> Result<Table> {
        let db = &self.services.db;
        let settings = &self.services.config.ingest;

        tracker
            .advance(JobStatus::Running, 1, "Parsing CSV...")
            .await?;

        let (columns, mut reader) = parse::open_csv(source)?;

        // The job must reference the table before any row is written
        let mut table = Table::new(
            resolve_table_name(table_name, original_name),
            Some(original_name.to_string()),
            &columns,
        );
        db.insert_table(&table).await?;
        tracker.attach_table(&table.id).await?;
        info!(
            job_id = %tracker.id(),
            table_id = %table.id,
            columns = columns.len(),
            "Created table '{}'",
            table.name
        );

        tracker.bump(5, "Copying rows...").await?;

        let every = settings.progress_every_rows.max(1);
        let mut batch = Vec::with_capacity(every);
        let mut row_index: i64 = 0;
        let mut record = StringRecord::new();

        let write_failed =
            |e: Error| Error::Ingestion(format!("Could not write rows: {}", e));

        while reader
            .read_record(&mut record)
            .map_err(|e| Error::Ingestion(format!("Malformed record at row {}: {}", row_index, e)))?
        {
            batch.push(parse::build_row(
                &columns,
                &record,
                row_index,
                settings.row_text_max_chars,
            ));
            row_index += 1;

            if batch.len() >= every {
                db.append_rows(&table.id, &batch).await.map_err(write_failed)?;
                batch.clear();
                let progress = (5 + row_index / every as i64).min(55);
                tracker
                    .bump(progress, &format!("Copying rows... ({})", row_index))
                    .await?;
            }
        }
        db.append_rows(&table.id, &batch).await.map_err(write_failed)?;

        db.set_row_count(&table.id, row_index).await?;
        table.row_count = row_index;
        info!(job_id = %tracker.id(), table_id = %table.id, rows = row_index, "Copied rows");
        Ok(table)
    }

    /// Remove rows written for the job's table before a failure
    async fn roll_back_rows(&self, tracker: &JobTracker) {
        let table_id = match tracker.load().await {
            Ok(job) => job.table_id,
            Err(e) => {
                warn!(job_id = %tracker.id(), "Cannot load job for rollback: {}", e);
                None
            }
        };
        let Some(table_id) = table_id else {
            return;
        };

        match self.services.db.delete_rows(&table_id).await {
            Ok(0) => {}
            Ok(n) => warn!(job_id = %tracker.id(), table_id = %table_id, "Rolled back {} rows", n),
            Err(e) => error!(table_id = %table_id, "Row rollback failed: {}", e),
        }
    }
}

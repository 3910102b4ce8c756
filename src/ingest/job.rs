//! Job progress reporting for pipeline runs

use crate::error::{Error, Result};
use crate::meta::{Job, JobStatus, JobUpdate, MetaDb};
use tracing::{debug, error, info, warn};

/// Highest progress a job may report before it is finished
pub const MAX_ACTIVE_PROGRESS: i64 = 99;

/// Message recorded on a job that failed with `err`
pub fn failure_message(err: &Error) -> String {
    match err {
        Error::EmptyInput => "Empty CSV".to_string(),
        Error::NoRowsToEmbed(_) => "No rows to embed.".to_string(),
        other => format!("Failed: {}", other),
    }
}

/// Writes the transitions of one job
#[derive(Clone)]
pub struct JobTracker {
    db: MetaDb,
    job_id: String,
}

impl JobTracker {
    pub fn new(db: MetaDb, job_id: impl Into<String>) -> Self {
        Self {
            db,
            job_id: job_id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.job_id
    }

    pub async fn load(&self) -> Result<Job> {
        self.db
            .get_job(&self.job_id)
            .await?
            .ok_or_else(|| Error::JobNotFound(self.job_id.clone()))
    }

    /// Move to `status` with the given progress and message
    pub async fn advance(&self, status: JobStatus, progress: i64, message: &str) -> Result<Job> {
        info!(job_id = %self.job_id, status = %status, progress, "{}", message);
        self.db
            .update_job(
                &self.job_id,
                JobUpdate::status(status)
                    .progress(progress.min(MAX_ACTIVE_PROGRESS))
                    .message(message),
            )
            .await
    }

    /// Progress-only update, capped below completion
    pub async fn bump(&self, progress: i64, message: &str) -> Result<Job> {
        debug!(job_id = %self.job_id, progress, "{}", message);
        self.db
            .update_job(
                &self.job_id,
                JobUpdate::default()
                    .progress(progress.min(MAX_ACTIVE_PROGRESS))
                    .message(message),
            )
            .await
    }

    pub async fn attach_table(&self, table_id: &str) -> Result<Job> {
        debug!(job_id = %self.job_id, table_id = %table_id, "Attaching table to job");
        self.db
            .update_job(&self.job_id, JobUpdate::default().table(table_id))
            .await
    }

    /// Terminal success
    pub async fn finish(&self, message: &str) -> Result<Job> {
        info!(job_id = %self.job_id, "{}", message);
        self.db
            .update_job(
                &self.job_id,
                JobUpdate::status(JobStatus::Done).message(message),
            )
            .await
    }

    /// Terminal failure with an explicit message. Never fails itself; problems are logged.
    pub async fn fail_with(&self, message: &str) {
        warn!(job_id = %self.job_id, "Job failed: {}", message);
        if let Err(e) = self
            .db
            .update_job(
                &self.job_id,
                JobUpdate::status(JobStatus::Error).message(message),
            )
            .await
        {
            error!(job_id = %self.job_id, "Could not record job failure: {}", e);
        }
    }

    /// Terminal failure derived from an error
    pub async fn fail(&self, err: &Error) {
        self.fail_with(&failure_message(err)).await;
    }
}

//! Upload, resume and reindex commands

use super::jobs::follow_job;
use crate::error::{Error, Result};
use crate::meta::Job;
use crate::progress::JobProgress;
use crate::services::Services;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tokio::task::JoinHandle;
use tracing::info;

/// Progress display for a followed job
fn job_progress(show: bool, job_id: &str) -> Option<JobProgress> {
    show.then(|| JobProgress::new(job_id))
}

async fn follow_detached(
    services: &Services,
    job_id: &str,
    handle: JoinHandle<()>,
    show_progress: bool,
) -> Result<Job> {
    let progress = job_progress(show_progress, job_id);
    let job = follow_job(&services.db, job_id, progress.as_ref()).await?;
    handle
        .await
        .map_err(|e| Error::Other(format!("Job task failed: {}", e)))?;
    Ok(job)
}

/// Ingest a CSV file as a new table and wait for the job to finish.
///
/// The returned job carries the outcome; a failed upload is not an `Err`.
pub async fn cmd_ingest(
    services: &Services,
    path: &Path,
    name: Option<&str>,
    show_progress: bool,
) -> Result<Job> {
    let file = File::open(path)?;
    let original_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let table_name = name.unwrap_or_default().to_string();

    let pipeline = services.pipeline();
    let job = pipeline.create_upload_job().await?;
    info!(job_id = %job.id, file = %path.display(), "Starting upload");

    let job_id = job.id.clone();
    let handle = tokio::spawn(async move {
        pipeline
            .ingest(&job_id, BufReader::new(file), &original_name, &table_name)
            .await;
    });

    follow_detached(services, &job.id, handle, show_progress).await
}

/// Continue an interrupted job from its last embedded row
pub async fn cmd_resume(services: &Services, job_id: &str, show_progress: bool) -> Result<Job> {
    // Unknown ids fail here rather than inside the detached task
    let job = super::jobs::cmd_job(&services.db, job_id).await?;

    let pipeline = services.pipeline();
    let id = job.id.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = pipeline.resume(&id).await {
            tracing::error!(job_id = %id, "Resume failed: {}", e);
        }
    });

    follow_detached(services, &job.id, handle, show_progress).await
}

/// Re-embed an existing table under a new job
pub async fn cmd_reindex(services: &Services, table_id: &str, show_progress: bool) -> Result<Job> {
    let pipeline = services.pipeline();
    let job = pipeline.start_reindex(table_id).await?;

    let id = job.id.clone();
    let handle = tokio::spawn(async move {
        if let Err(e) = pipeline.resume(&id).await {
            tracing::error!(job_id = %id, "Reindex failed: {}", e);
        }
    });

    follow_detached(services, &job.id, handle, show_progress).await
}

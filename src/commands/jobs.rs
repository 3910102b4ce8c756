//! Job inspection and the background worker

use crate::error::{Error, Result};
use crate::ingest::ReconcileReport;
use crate::meta::{Job, JobStatus, MetaDb};
use crate::progress::JobProgress;
use crate::services::Services;
use std::time::Duration;
use tracing::warn;

const FOLLOW_INTERVAL: Duration = Duration::from_millis(200);

/// Fetch a job by id
pub async fn cmd_job(db: &MetaDb, job_id: &str) -> Result<Job> {
    db.get_job(job_id)
        .await?
        .ok_or_else(|| Error::JobNotFound(job_id.to_string()))
}

/// Poll a job until it reaches `done` or `error`, mirroring it on `progress`
pub async fn follow_job(db: &MetaDb, job_id: &str, progress: Option<&JobProgress>) -> Result<Job> {
    loop {
        let job = cmd_job(db, job_id).await?;
        let terminal = job.get_status()?.is_terminal();
        if let Some(bar) = progress {
            if terminal {
                bar.finish(&job);
            } else {
                bar.update(&job);
            }
        }
        if terminal {
            return Ok(job);
        }
        tokio::time::sleep(FOLLOW_INTERVAL).await;
    }
}

/// Resume interrupted jobs, then poll for reindex work until Ctrl-C
pub async fn cmd_worker(services: &Services) -> Result<ReconcileReport> {
    services
        .pipeline()
        .recover_and_work(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
}

pub fn print_job(job: &Job) {
    let icon = match job.get_status() {
        Ok(JobStatus::Done) => "✓",
        Ok(JobStatus::Error) => "✗",
        _ => "…",
    };
    println!("{} Job {} [{}] {}%", icon, job.id, job.status, job.progress);
    if !job.message.is_empty() {
        println!("  {}", job.message);
    }
    if let Some(table_id) = &job.table_id {
        println!("  Table: {}", table_id);
    }
    println!("  Updated: {}", job.updated_at);
}

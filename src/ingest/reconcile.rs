//! Startup reconciliation, reindex requests and the standalone worker

use super::{JobTracker, Pipeline};
use crate::error::{Error, Result};
use crate::meta::{Job, JobStatus};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Outcome of one reconciliation pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Jobs handed back to the embedding phase
    pub resumed: Vec<String>,
    /// Jobs that never got a table and were marked failed
    pub abandoned: Vec<String>,
}

impl ReconcileReport {
    pub fn is_empty(&self) -> bool {
        self.resumed.is_empty() && self.abandoned.is_empty()
    }
}

impl Pipeline {
    /// Queue a fresh embedding run for an existing table.
    ///
    /// Returns the new job, already in `indexing`; the caller decides where
    /// [`Pipeline::resume`] runs.
    pub async fn start_reindex(&self, table_id: &str) -> Result<Job> {
        let db = &self.services.db;
        if db.get_table(table_id).await?.is_none() {
            return Err(Error::TableNotFound(table_id.to_string()));
        }

        let job = db
            .create_job(
                JobStatus::Indexing,
                60,
                "Reindexing...",
                Some(table_id.to_string()),
            )
            .await?;
        info!(job_id = %job.id, table_id = %table_id, "Queued reindex");
        Ok(job)
    }

    /// Recover jobs interrupted by a previous process exit.
    ///
    /// Jobs left `running` or `indexing` are resumed on `tasks`; the ones that
    /// never recorded a table cannot be resumed and are marked failed.
    pub async fn reconcile(&self, tasks: &mut JoinSet<()>) -> Result<ReconcileReport> {
        let stuck = self
            .services
            .db
            .jobs_with_status(&[JobStatus::Running, JobStatus::Indexing])
            .await?;

        let mut report = ReconcileReport::default();
        for job in stuck {
            if job.table_id.is_none() {
                JobTracker::new(self.services.db.clone(), job.id.clone())
                    .fail_with("Interrupted before table creation.")
                    .await;
                report.abandoned.push(job.id);
                continue;
            }

            let pipeline = self.clone();
            let job_id = job.id.clone();
            tasks.spawn(async move {
                if let Err(e) = pipeline.resume(&job_id).await {
                    warn!(job_id = %job_id, "Resume failed: {}", e);
                }
            });
            report.resumed.push(job.id);
        }

        if !report.is_empty() {
            info!(
                resumed = report.resumed.len(),
                abandoned = report.abandoned.len(),
                "Reconciled interrupted jobs"
            );
        }
        Ok(report)
    }

    /// Resume every job currently in `indexing`, one after another.
    /// Returns how many were picked up.
    pub async fn poll_once(&self) -> Result<usize> {
        let pending = self
            .services
            .db
            .jobs_with_status(&[JobStatus::Indexing])
            .await?;

        for job in &pending {
            debug!(job_id = %job.id, "Worker picked up job");
            if let Err(e) = self.resume(&job.id).await {
                warn!(job_id = %job.id, "Resume failed: {}", e);
            }
        }
        Ok(pending.len())
    }

    /// Startup recovery followed by the polling loop.
    ///
    /// Resumed jobs finish before the first poll, so no job is embedded by
    /// both passes at once.
    pub async fn recover_and_work<F>(&self, shutdown: F) -> Result<ReconcileReport>
    where
        F: Future<Output = ()>,
    {
        let mut tasks = JoinSet::new();
        let report = self.reconcile(&mut tasks).await?;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!("Resumed job task failed: {}", e);
            }
        }

        self.run_worker(shutdown).await?;
        Ok(report)
    }

    /// Poll for `indexing` jobs until `shutdown` completes
    pub async fn run_worker<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let period = Duration::from_secs(self.services.config.worker.poll_interval_secs.max(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(interval_secs = period.as_secs(), "Worker started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match self.poll_once().await {
                        Ok(0) => {}
                        Ok(n) => info!(jobs = n, "Worker processed jobs"),
                        Err(e) => warn!("Worker poll failed: {}", e),
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::EmbeddingGateway;
    use crate::ingest::tests::{run_ingest, TallyEmbedder, REVIEWS_CSV};
    use crate::meta::MetaDb;
    use crate::services::testing::{test_config, test_services};
    use crate::services::Services;
    use crate::store::{MemoryIndex, VectorIndex};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_start_reindex() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        let pipeline = services.pipeline();

        let err = pipeline.start_reindex("missing").await.unwrap_err();
        assert!(matches!(err, Error::TableNotFound(_)));

        let done = run_ingest(&services, REVIEWS_CSV, "reviews").await;
        let table_id = done.table_id.unwrap();
        let job = pipeline.start_reindex(&table_id).await.unwrap();
        assert_eq!(job.get_status().unwrap(), JobStatus::Indexing);
        assert_eq!(job.progress, 60);
        assert_eq!(job.message, "Reindexing...");
        assert_eq!(job.table_id.as_deref(), Some(table_id.as_str()));
    }

    #[tokio::test]
    async fn test_reconcile_resumes_and_abandons() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        let (services, index, _tmp) = test_services(config).await;
        let pipeline = services.pipeline();

        let ingested = run_ingest(&services, REVIEWS_CSV, "reviews").await;
        let table_id = ingested.table_id.unwrap();

        let orphan = services
            .db
            .create_job(JobStatus::Running, 1, "Parsing CSV...", None)
            .await
            .unwrap();
        let stuck = services
            .db
            .create_job(JobStatus::Indexing, 60, "Embedding rows...", Some(table_id.clone()))
            .await
            .unwrap();

        let mut tasks = JoinSet::new();
        let report = pipeline.reconcile(&mut tasks).await.unwrap();
        while tasks.join_next().await.is_some() {}

        assert_eq!(report.abandoned, vec![orphan.id.clone()]);
        assert_eq!(report.resumed, vec![stuck.id.clone()]);

        let orphan = services.db.get_job(&orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.get_status().unwrap(), JobStatus::Error);
        assert_eq!(orphan.message, "Interrupted before table creation.");

        let stuck = services.db.get_job(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.get_status().unwrap(), JobStatus::Done);
        assert_eq!(index.count(&table_id).await.unwrap(), 3);

        // Nothing left to do on a second pass
        let again = pipeline.reconcile(&mut tasks).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_recovered_jobs_are_embedded_once() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        config.worker.poll_interval_secs = 3600;
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let tally = Arc::new(TallyEmbedder::default());
        let services = Services::new(
            config,
            db,
            Arc::new(EmbeddingGateway::new(tally.clone(), 16)),
            Arc::new(MemoryIndex::new()),
        );
        let pipeline = services.pipeline();

        let ingested = run_ingest(&services, REVIEWS_CSV, "reviews").await;
        let table_id = ingested.table_id.unwrap();
        let stuck = services
            .db
            .create_job(JobStatus::Indexing, 60, "Embedding rows...", Some(table_id.clone()))
            .await
            .unwrap();

        let report = pipeline
            .recover_and_work(tokio::time::sleep(Duration::from_millis(300)))
            .await
            .unwrap();

        assert_eq!(report.resumed, vec![stuck.id.clone()]);
        assert_eq!(tally.texts(), 3);
        let stuck = services.db.get_job(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.get_status().unwrap(), JobStatus::Done);
        assert_eq!(stuck.message, "Done. Ingested 3 rows.");
    }

    #[tokio::test]
    async fn test_worker_drains_indexing_jobs() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        config.worker.poll_interval_secs = 3600;
        let (services, index, _tmp) = test_services(config).await;
        let pipeline = services.pipeline();

        let ingested = run_ingest(&services, REVIEWS_CSV, "reviews").await;
        let table_id = ingested.table_id.unwrap();
        let job = pipeline.start_reindex(&table_id).await.unwrap();

        // The first tick fires immediately; shut down shortly after
        pipeline
            .run_worker(tokio::time::sleep(Duration::from_millis(200)))
            .await
            .unwrap();

        let job = services.db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(job.get_status().unwrap(), JobStatus::Done);
        assert_eq!(job.message, "Done. Ingested 3 rows.");
        assert_eq!(index.count(&table_id).await.unwrap(), 3);
        assert_eq!(pipeline.poll_once().await.unwrap(), 0);
    }
}

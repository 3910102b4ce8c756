//! Embedding phase and resume entry point

use super::{JobTracker, Pipeline};
use crate::error::{Error, Result};
use crate::meta::{JobStatus, RowRecord, Table};
use crate::store::RowPoint;
use tracing::{error, info, warn};

/// Progress at which the embedding phase starts
pub const EMBED_PROGRESS_FLOOR: i64 = 60;

/// Progress for `embedded` of `total` rows: `60 + floor(39 * embedded / total)`
pub fn embed_progress(embedded: i64, total: i64) -> i64 {
    if total <= 0 {
        return EMBED_PROGRESS_FLOOR;
    }
    EMBED_PROGRESS_FLOOR + (39 * embedded / total)
}

impl Pipeline {
    /// Index every row of `table`, driving the job to `done` or `error`.
    ///
    /// Safe to call repeatedly: a fully indexed table finishes at once, and
    /// re-embedded rows overwrite their points.
    pub async fn embed_table(&self, job_id: &str, table: &Table) {
        let tracker = JobTracker::new(self.services.db.clone(), job_id);
        if let Err(e) = self.run_embed_phase(&tracker, table).await {
            error!(job_id = %job_id, table_id = %table.id, "Embedding failed: {}", e);
            tracker.fail(&e).await;
        }
    }

    async fn run_embed_phase(&self, tracker: &JobTracker, table: &Table) -> Result<()> {
        let total = table.row_count;
        if total <= 0 {
            return Err(Error::NoRowsToEmbed(table.id.clone()));
        }

        let existing = match self.services.index.count(&table.id).await {
            Ok(n) => n as i64,
            Err(e) => {
                warn!(table_id = %table.id, "Vector count failed, assuming none indexed: {}", e);
                0
            }
        };
        if existing >= total {
            tracker
                .finish(&format!("Done. Already indexed {} rows.", existing))
                .await?;
            return Ok(());
        }

        tracker
            .advance(JobStatus::Indexing, EMBED_PROGRESS_FLOOR, "Embedding rows...")
            .await?;
        info!(
            job_id = %tracker.id(),
            table_id = %table.id,
            total,
            existing,
            "Embedding table rows"
        );

        let settings = &self.services.config.ingest;
        let scan = settings.embed_scan_batch.max(1) as i64;
        let batch_size = settings.embed_batch.max(1);
        let mut embedded: i64 = 0;
        let mut start: i64 = 0;

        while start < total {
            let end = (start + scan).min(total);
            let rows = self.services.db.read_rows(&table.id, start..end).await?;
            start = end;

            let items: Vec<RowRecord> = rows
                .into_iter()
                .filter(|r| !r.row_text.is_empty())
                .collect();

            for batch in items.chunks(batch_size) {
                let texts = batch.iter().map(|r| r.row_text.clone()).collect();
                let vectors = self.services.embedder.embed(texts).await?;
                let points = batch
                    .iter()
                    .zip(vectors)
                    .map(|(row, vector)| {
                        RowPoint::new(&table.id, row.row_index, row.row_text.clone(), vector)
                    })
                    .collect();
                self.services.index.upsert(&table.id, points).await?;

                embedded += batch.len() as i64;
                tracker
                    .bump(
                        embed_progress(embedded, total),
                        &format!("Embedding rows... ({}/{})", embedded, total),
                    )
                    .await?;
            }
        }

        tracker
            .finish(&format!("Done. Ingested {} rows.", total))
            .await?;
        Ok(())
    }

    /// Re-enter the embedding phase for a job, given only its id.
    ///
    /// Unknown jobs are reported as `JobNotFound`; everything else ends up
    /// on the job itself. Finished jobs are left untouched.
    pub async fn resume(&self, job_id: &str) -> Result<()> {
        let tracker = JobTracker::new(self.services.db.clone(), job_id);
        let job = tracker.load().await?;

        let status = job.get_status()?;
        if status.is_terminal() {
            info!(job_id = %job_id, status = %status, "Job already finished, nothing to resume");
            return Ok(());
        }

        let Some(table_id) = job.table_id else {
            tracker.fail_with("No table_id to resume.").await;
            return Ok(());
        };
        let Some(table) = self.services.db.get_table(&table_id).await? else {
            tracker.fail_with("Table not found for resume.").await;
            return Ok(());
        };

        info!(job_id = %job_id, table_id = %table.id, "Resuming embedding");
        self.embed_table(job_id, &table).await;
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

    #[test]
    fn test_embed_progress() {
        assert_eq!(embed_progress(0, 10), 60);
        assert_eq!(embed_progress(5, 10), 79);
        assert_eq!(embed_progress(10, 10), 99);
        assert_eq!(embed_progress(1, 3), 73);
    }

    #[tokio::test]
    async fn test_resume_on_indexed_table_is_noop() {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let tally = Arc::new(TallyEmbedder::default());
        let services = Services::new(
            test_config(),
            db,
            Arc::new(EmbeddingGateway::new(tally.clone(), 16)),
            Arc::new(MemoryIndex::new()),
        );

        let job = run_ingest(&services, REVIEWS_CSV, "reviews").await;
        assert_eq!(tally.texts(), 3);
        let table_id = job.table_id.unwrap();

        let reindex = services.pipeline().start_reindex(&table_id).await.unwrap();
        services.pipeline().resume(&reindex.id).await.unwrap();

        let reindex = services.db.get_job(&reindex.id).await.unwrap().unwrap();
        assert_eq!(reindex.get_status().unwrap(), JobStatus::Done);
        assert_eq!(reindex.message, "Done. Already indexed 3 rows.");
        assert_eq!(tally.texts(), 3);
    }

    #[tokio::test]
    async fn test_resume_after_crash_indexes_exactly_all_rows() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        config.ingest.embed_scan_batch = 2;
        config.ingest.embed_batch = 1;
        let (services, index, _tmp) = test_services(config).await;

        let csv: String = std::iter::once("n,word\n".to_string())
            .chain((0..5).map(|i| format!("{},word{}\n", i, i)))
            .collect();
        let job = run_ingest(&services, &csv, "words").await;
        let table_id = job.table_id.unwrap();

        // Simulate a crash after two rows were indexed
        let rows = services.db.read_rows(&table_id, 0..2).await.unwrap();
        let vectors = services
            .embedder
            .embed(rows.iter().map(|r| r.row_text.clone()).collect())
            .await
            .unwrap();
        let points = rows
            .iter()
            .zip(vectors)
            .map(|(r, v)| RowPoint::new(&table_id, r.row_index, r.row_text.clone(), v))
            .collect();
        index.upsert(&table_id, points).await.unwrap();
        let stuck = services
            .db
            .create_job(JobStatus::Indexing, 72, "Embedding rows... (2/5)", Some(table_id.clone()))
            .await
            .unwrap();

        services.pipeline().resume(&stuck.id).await.unwrap();

        let stuck = services.db.get_job(&stuck.id).await.unwrap().unwrap();
        assert_eq!(stuck.get_status().unwrap(), JobStatus::Done);
        assert_eq!(stuck.progress, 100);
        assert_eq!(stuck.message, "Done. Ingested 5 rows.");
        assert_eq!(index.count(&table_id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_resume_edge_cases() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        let pipeline = services.pipeline();

        assert!(matches!(
            pipeline.resume("missing").await,
            Err(Error::JobNotFound(_))
        ));

        let orphan = services
            .db
            .create_job(JobStatus::Running, 3, "Parsing CSV...", None)
            .await
            .unwrap();
        pipeline.resume(&orphan.id).await.unwrap();
        let orphan = services.db.get_job(&orphan.id).await.unwrap().unwrap();
        assert_eq!(orphan.get_status().unwrap(), JobStatus::Error);
        assert_eq!(orphan.message, "No table_id to resume.");

        let dangling = services
            .db
            .create_job(JobStatus::Indexing, 60, "", Some("gone".to_string()))
            .await
            .unwrap();
        pipeline.resume(&dangling.id).await.unwrap();
        let dangling = services.db.get_job(&dangling.id).await.unwrap().unwrap();
        assert_eq!(dangling.message, "Table not found for resume.");

        // Finished jobs stay as they are
        pipeline.resume(&dangling.id).await.unwrap();
        let again = services.db.get_job(&dangling.id).await.unwrap().unwrap();
        assert_eq!(again.message, "Table not found for resume.");
    }
}

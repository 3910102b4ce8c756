//! Raw fused ranking: vector and lexical results merged with RRF

use super::intent::Intent;
use super::locate::pick_columns;
use super::Engine;
use crate::error::Result;
use crate::meta::{RowData, Table};
use crate::rank::{code_tokens, rrf_ranked, Bm25Scorer, TopScores};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Entries kept in each debug list
const DEBUG_TOP: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRow {
    pub row_index: i64,
    pub score: f64,
}

/// A fused result row with the columns most relevant to the query
#[derive(Debug, Clone, Serialize)]
pub struct FusedRow {
    pub row_index: i64,
    pub score: f64,
    pub columns: Vec<String>,
    pub data: RowData,
    pub row_text: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FusedDebug {
    pub vector_top: Vec<ScoredRow>,
    pub lexical_top: Vec<ScoredRow>,
    pub rrf_top: Vec<ScoredRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FusedResult {
    pub query: String,
    pub table_id: String,
    pub rows: Vec<FusedRow>,
    pub debug: FusedDebug,
}

fn scored(rows: impl IntoIterator<Item = (i64, f64)>, limit: usize) -> Vec<ScoredRow> {
    rows.into_iter()
        .take(limit)
        .map(|(row_index, score)| ScoredRow { row_index, score })
        .collect()
}

impl Engine {
    /// Rank rows by fusing vector and lexical results, without guardrails.
    ///
    /// Either search failing only empties its own list.
    pub async fn fused(&self, table_ref: &str, query: &str, top_k: usize) -> Result<FusedResult> {
        let top_k = top_k.max(1);
        let table = self.services.db.resolve_table(table_ref).await?;
        let limit = (top_k * 10).max(20);

        let vector = self.vector_hits(&table, query, limit).await;
        let lexical = match self.lexical_scores(&table, query, limit).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(table_id = %table.id, "Lexical search failed: {}", e);
                Vec::new()
            }
        };

        let vector_ids = super::dedupe(vector.iter().map(|(idx, _)| *idx));
        let lexical_ids: Vec<i64> = lexical.iter().map(|(idx, _)| *idx).collect();
        let fused = rrf_ranked(
            &[vector_ids, lexical_ids],
            self.services.config.retrieval.rrf_k,
            top_k.max(10),
        );
        debug!(
            table_id = %table.id,
            vector = vector.len(),
            lexical = lexical.len(),
            fused = fused.len(),
            "Fused rankings"
        );

        let rows = self.fused_rows(&table, query, &fused).await?;
        Ok(FusedResult {
            query: query.to_string(),
            table_id: table.id.clone(),
            rows,
            debug: FusedDebug {
                vector_top: scored(vector.iter().map(|(i, s)| (*i, *s as f64)), DEBUG_TOP),
                lexical_top: scored(lexical.iter().map(|(i, s)| (*i, *s as f64)), DEBUG_TOP),
                rrf_top: scored(fused.iter().copied(), DEBUG_TOP),
            },
        })
    }

    /// Every keyword-matching row scored with BM25 plus the code-token boost;
    /// the best `limit`, best first
    async fn lexical_scores(&self, table: &Table, query: &str, limit: usize) -> Result<Vec<(i64, f32)>> {
        let settings = &self.services.config.retrieval;
        let intent = Intent::extract(query, &table.columns(), settings);
        let keywords = intent.keywords();
        let codes: Vec<String> = code_tokens(query).iter().map(|c| c.to_lowercase()).collect();

        let mut terms = keywords.clone();
        for code in &codes {
            if !terms.contains(code) {
                terms.push(code.clone());
            }
        }
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let db = &self.services.db;
        let (matches, avg_len) = db.keyword_match_stats(&table.id, &terms).await?;
        if matches == 0 {
            return Ok(Vec::new());
        }

        let scorer = Bm25Scorer::new();
        let mut top = TopScores::new(limit);
        db.for_each_keyword_match(&table.id, &terms, |row| {
            let score = scorer.score_with_codes(&keywords, &codes, &row.row_text, avg_len as f32);
            top.push(row.row_index, score);
        })
        .await?;
        debug!(table_id = %table.id, matches, "Scored lexical matches");
        Ok(top.into_sorted())
    }

    async fn fused_rows(&self, table: &Table, query: &str, fused: &[(i64, f64)]) -> Result<Vec<FusedRow>> {
        let indices: Vec<i64> = fused.iter().map(|(idx, _)| *idx).collect();
        let columns = table.columns();
        let mut by_index: HashMap<i64, _> = self
            .services
            .db
            .rows_by_indices(&table.id, &indices)
            .await?
            .into_iter()
            .map(|r| (r.row_index, r))
            .collect();

        Ok(fused
            .iter()
            .filter_map(|(idx, score)| {
                let row = by_index.remove(idx)?;
                let data = row.data();
                Some(FusedRow {
                    row_index: *idx,
                    score: *score,
                    columns: pick_columns(query, &columns, &data),
                    data,
                    row_text: row.row_text,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::ingest::tests::{run_ingest, REVIEWS_CSV};
    use crate::services::testing::{test_config, test_services};

    #[tokio::test]
    async fn test_fused_ranks_best_row_first() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        run_ingest(&services, REVIEWS_CSV, "reviews").await;

        let result = services
            .engine()
            .fused("latest", "great positive", 1)
            .await
            .unwrap();

        // Every row has a vector, so all three are fused
        assert_eq!(result.rows.len(), 3);
        assert_eq!(result.rows[0].row_index, 0);
        assert_eq!(result.rows[0].columns, vec!["review", "sentiment"]);
        assert_eq!(result.debug.vector_top.len(), 3);

        let lexical: Vec<i64> = result.debug.lexical_top.iter().map(|r| r.row_index).collect();
        assert_eq!(lexical, vec![0, 2]);
        assert_eq!(result.debug.rrf_top[0].row_index, 0);
    }

    #[tokio::test]
    async fn test_fused_without_vectors_uses_lexical_only() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        let (services, _index, _tmp) = test_services(config).await;
        run_ingest(&services, REVIEWS_CSV, "reviews").await;

        let result = services.engine().fused("latest", "bad", 3).await.unwrap();
        assert!(result.debug.vector_top.is_empty());
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].row_index, 1);
        assert!((result.rows[0].score - 1.0 / 61.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_fused_scores_every_keyword_match() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        let (services, _index, _tmp) = test_services(config).await;

        let mut csv = String::from("note\n");
        for _ in 0..2500 {
            csv.push_str("alpha filler filler filler filler\n");
        }
        csv.push_str("alpha\n");
        run_ingest(&services, &csv, "notes").await;

        let result = services.engine().fused("latest", "alpha", 1).await.unwrap();
        assert_eq!(result.debug.lexical_top[0].row_index, 2500);
        assert_eq!(result.rows[0].row_index, 2500);
    }

    #[tokio::test]
    async fn test_fused_with_nothing_to_match() {
        let mut config = test_config();
        config.ingest.embed_on_upload = false;
        let (services, _index, _tmp) = test_services(config).await;
        run_ingest(&services, REVIEWS_CSV, "reviews").await;

        let result = services.engine().fused("latest", "zz", 3).await.unwrap();
        assert!(result.rows.is_empty());
        assert!(result.debug.rrf_top.is_empty());
    }
}

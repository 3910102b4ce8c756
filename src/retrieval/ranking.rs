//! Deterministic numeric ranking entry point

use super::evidence::{highlight_for, viewer_url, CONFIDENCE_RANK};
use super::{Citation, Engine, EvidenceCell};
use crate::error::Result;
use crate::rank::numeric::{rank_numeric, RankedRow, SortDirection};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Rank rows of a table by a numeric column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankRequest {
    /// `latest` or a table id
    #[serde(default = "latest")]
    pub table: String,
    pub primary_col: String,
    #[serde(default = "desc")]
    pub primary_dir: SortDirection,
    #[serde(default)]
    pub tie_col: Option<String>,
    #[serde(default = "asc")]
    pub tie_dir: SortDirection,
    #[serde(default = "one")]
    pub limit: usize,
}

fn latest() -> String {
    "latest".to_string()
}

fn desc() -> SortDirection {
    SortDirection::Desc
}

fn asc() -> SortDirection {
    SortDirection::Asc
}

fn one() -> usize {
    1
}

impl RankRequest {
    /// Highest value of `primary_col` in the latest table
    pub fn new(primary_col: impl Into<String>) -> Self {
        Self {
            table: latest(),
            primary_col: primary_col.into(),
            primary_dir: desc(),
            tie_col: None,
            tie_dir: asc(),
            limit: one(),
        }
    }
}

/// Top rows of a numeric ranking
#[derive(Debug, Clone, Serialize)]
pub struct RankedAnswer {
    pub table_id: String,
    /// Best row
    pub row_index: i64,
    /// Ranked cell values of the best row
    pub values: BTreeMap<String, Option<String>>,
    pub citations: Vec<Citation>,
    pub highlight_id: String,
    pub highlight_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RankResponse {
    Ranked(RankedAnswer),
    NoMatch { message: String },
}

impl Engine {
    /// Rank rows by the numeric value of a column; rows whose value is not a
    /// number are skipped. One citation per returned row, best first.
    pub async fn rank(&self, request: &RankRequest) -> Result<RankResponse> {
        let table = self.services.db.resolve_table(&request.table).await?;
        let tie = request.tie_col.as_deref();

        let candidates = self
            .services
            .db
            .numeric_candidates(&table.id, &request.primary_col, tie)
            .await?;
        let ranked = rank_numeric(
            &candidates,
            request.primary_dir,
            tie.map(|_| request.tie_dir),
            request.limit.max(1),
        );
        debug!(
            table_id = %table.id,
            candidates = candidates.len(),
            ranked = ranked.len(),
            "Numeric ranking"
        );

        let Some(best) = ranked.first() else {
            return Ok(RankResponse::NoMatch {
                message: "No rows matched ranking criteria.".to_string(),
            });
        };

        let raw: HashMap<i64, (Option<String>, Option<String>)> = candidates
            .into_iter()
            .map(|c| (c.row_index, (c.primary, c.tie)))
            .collect();
        let cited_columns = |row: &RankedRow| -> Vec<(String, Option<String>)> {
            let (primary, tie_value) = raw.get(&row.row_index).cloned().unwrap_or_default();
            let mut cells = vec![(request.primary_col.clone(), primary)];
            if let Some(tie_col) = tie {
                cells.push((tie_col.to_string(), tie_value));
            }
            cells
        };

        let citations: Vec<Citation> = ranked
            .iter()
            .map(|row| {
                let evidence = cited_columns(row)
                    .into_iter()
                    .map(|(col, value)| EvidenceCell {
                        row: row.row_index,
                        col,
                        value: value.unwrap_or_default(),
                    })
                    .collect();
                Citation::new(&table.id, evidence, CONFIDENCE_RANK)
            })
            .collect();
        let values: BTreeMap<String, Option<String>> = cited_columns(best).into_iter().collect();

        let highlight = highlight_for(&table.id, &citations)?;
        self.services.db.insert_highlight(&highlight).await?;
        let highlight_url = viewer_url(&self.services.config.viewer_base_url, &highlight.id, None)?;
        info!(
            table_id = %table.id,
            row = best.row_index,
            column = %request.primary_col,
            direction = %request.primary_dir,
            "Ranked rows"
        );

        Ok(RankResponse::Ranked(RankedAnswer {
            table_id: table.id.clone(),
            row_index: best.row_index,
            values,
            citations,
            highlight_id: highlight.id,
            highlight_url,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::run_ingest;
    use crate::services::testing::{test_config, test_services};

    const SCORES_CSV: &str = "name,score,age\na,10,3\nb,abc,1\nc,30,7\nd,30,2\n";

    fn ranked(response: RankResponse) -> RankedAnswer {
        match response {
            RankResponse::Ranked(answer) => answer,
            RankResponse::NoMatch { message } => panic!("unexpected no match: {}", message),
        }
    }

    #[tokio::test]
    async fn test_rank_skips_non_numeric_values() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        run_ingest(&services, "name,score\na,10\nb,abc\nc,30\n", "scores").await;

        let answer = ranked(services.engine().rank(&RankRequest::new("score")).await.unwrap());
        assert_eq!(answer.row_index, 2);
        assert_eq!(answer.values["score"].as_deref(), Some("30"));
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].confidence, CONFIDENCE_RANK);
        assert_eq!(answer.citations[0].range.cols, vec!["score"]);
        assert!(!answer.highlight_url.contains("?q="));

        let mut lowest = RankRequest::new("score");
        lowest.primary_dir = SortDirection::Asc;
        lowest.limit = 5;
        let answer = ranked(services.engine().rank(&lowest).await.unwrap());
        assert_eq!(answer.row_index, 0);
        let rows: Vec<i64> = answer.citations.iter().map(|c| c.range.rows[0]).collect();
        assert_eq!(rows, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_rank_with_tie_column() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        run_ingest(&services, SCORES_CSV, "scores").await;
        let engine = services.engine();

        let mut request = RankRequest::new("score");
        request.tie_col = Some("age".to_string());
        let answer = ranked(engine.rank(&request).await.unwrap());
        assert_eq!(answer.row_index, 3);
        assert_eq!(answer.values["age"].as_deref(), Some("2"));
        assert_eq!(answer.citations[0].range.cols, vec!["score", "age"]);

        let highlight = engine.highlight(&answer.highlight_id).await.unwrap();
        assert_eq!(highlight.rows(), vec![3]);
        assert_eq!(highlight.cols(), vec!["score", "age"]);

        request.tie_dir = SortDirection::Desc;
        let answer = ranked(engine.rank(&request).await.unwrap());
        assert_eq!(answer.row_index, 2);
    }

    #[tokio::test]
    async fn test_rank_without_numeric_rows() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        run_ingest(&services, SCORES_CSV, "scores").await;

        for column in ["name", "missing"] {
            let response = services
                .engine()
                .rank(&RankRequest::new(column))
                .await
                .unwrap();
            match response {
                RankResponse::NoMatch { message } => {
                    assert_eq!(message, "No rows matched ranking criteria.")
                }
                RankResponse::Ranked(_) => panic!("column '{}' should not rank", column),
            }
        }
    }

    #[test]
    fn test_request_defaults() {
        let request: RankRequest = serde_json::from_str(r#"{"primary_col": "score"}"#).unwrap();
        assert_eq!(request.table, "latest");
        assert_eq!(request.primary_dir, SortDirection::Desc);
        assert_eq!(request.tie_dir, SortDirection::Asc);
        assert_eq!(request.limit, 1);
    }
}

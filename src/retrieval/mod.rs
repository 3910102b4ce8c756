//! Hybrid retrieval over one table
//!
//! Answers a natural-language query with row-level citations. Candidates
//! come from the first stage that yields any:
//! 1. a structured length shortcut (`shortest`/`longest` over the text column)
//! 2. vector similarity search
//! 3. keyword matching over the flattened row text
//!
//! Candidates are then filtered by category and the keyword guardrail, turned
//! into citations and recorded as a Highlight.

pub mod evidence;
mod fused;
pub mod intent;
pub mod locate;
mod ranking;
mod slice;

pub use evidence::{CellRange, Citation, EvidenceCell};
pub use fused::*;
pub use intent::Intent;
pub use ranking::*;
pub use slice::*;

use crate::error::{Error, Result};
use crate::meta::{Highlight, RowRecord, Table};
use crate::services::Services;
use evidence::{
    highlight_for, row_evidence, tool_text, viewer_url, CONFIDENCE_FUZZY, CONFIDENCE_SHORTCUT,
};
use intent::row_matches_tokens;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Where a query's candidate rows came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Shortcut,
    Vector,
    Lexical,
}

impl CandidateSource {
    pub fn confidence(self) -> f32 {
        match self {
            CandidateSource::Shortcut => CONFIDENCE_SHORTCUT,
            CandidateSource::Vector | CandidateSource::Lexical => CONFIDENCE_FUZZY,
        }
    }
}

impl std::fmt::Display for CandidateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CandidateSource::Shortcut => write!(f, "shortcut"),
            CandidateSource::Vector => write!(f, "vector"),
            CandidateSource::Lexical => write!(f, "lexical"),
        }
    }
}

/// Answer to a query
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub table_id: String,
    pub tool_text: String,
    pub citations: Vec<Citation>,
    pub highlight_id: String,
    pub highlight_url: String,
    /// Stage that produced the cited rows; absent when nothing matched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CandidateSource>,
}

/// Retrieval engine over shared services
#[derive(Clone)]
pub struct Engine {
    services: Services,
}

impl Engine {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Answer `query` against a table (`latest` or an id) with at most `top_k` citations.
    ///
    /// Only a missing table is an error; no matches is an empty answer.
    pub async fn answer(&self, table_ref: &str, query: &str, top_k: usize) -> Result<QueryResult> {
        let top_k = top_k.max(1);
        let table = self.services.db.resolve_table(table_ref).await?;
        let columns = table.columns();
        let settings = &self.services.config.retrieval;
        let intent = Intent::extract(query, &columns, settings);
        debug!(
            table_id = %table.id,
            tokens = ?intent.tokens,
            length_order = ?intent.length_order,
            category = ?intent.category,
            "Extracted intent"
        );

        let (mut source, candidates) = self.candidates(&table, query, &intent, top_k).await?;
        let mut citations = match source {
            Some(s) => {
                self.cite(&table, &columns, &intent, &candidates, s.confidence(), top_k)
                    .await?
            }
            None => Vec::new(),
        };

        if needs_reresolution(&citations, &intent, settings.guardrails_enabled) {
            let shortcut = self.length_shortcut(&table, &intent, top_k).await?;
            if !shortcut.is_empty() {
                info!(table_id = %table.id, "Fuzzy results miss the requested category, using shortcut");
                citations = self
                    .evidence_citations(&table, &columns, &shortcut, CONFIDENCE_SHORTCUT, top_k)
                    .await?;
                source = Some(CandidateSource::Shortcut);
            }
        }
        if citations.is_empty() {
            source = None;
        }

        let highlight = highlight_for(&table.id, &citations)?;
        self.services.db.insert_highlight(&highlight).await?;
        let highlight_url = viewer_url(
            &self.services.config.viewer_base_url,
            &highlight.id,
            Some(query),
        )?;

        info!(
            table_id = %table.id,
            highlight_id = %highlight.id,
            citations = citations.len(),
            source = ?source,
            "Answered query"
        );

        Ok(QueryResult {
            query: query.to_string(),
            table_id: table.id.clone(),
            tool_text: tool_text(&table, query, &citations, &highlight_url),
            citations,
            highlight_id: highlight.id,
            highlight_url,
            source,
        })
    }

    /// Candidate row indices from the first stage that yields any
    async fn candidates(
        &self,
        table: &Table,
        query: &str,
        intent: &Intent,
        top_k: usize,
    ) -> Result<(Option<CandidateSource>, Vec<i64>)> {
        let shortcut = self.length_shortcut(table, intent, top_k).await?;
        if !shortcut.is_empty() {
            return Ok((Some(CandidateSource::Shortcut), shortcut));
        }

        let limit = (top_k * 3).max(10);
        let vector = dedupe(
            self.vector_hits(table, query, limit)
                .await
                .into_iter()
                .map(|(idx, _)| idx),
        );
        if !vector.is_empty() {
            return Ok((Some(CandidateSource::Vector), vector));
        }

        let keywords = intent.keywords();
        if keywords.is_empty() {
            return Ok((None, Vec::new()));
        }
        let lexical: Vec<i64> = match self
            .services
            .db
            .rows_matching_keywords(&table.id, &keywords, intent.category_filter(), limit)
            .await
        {
            Ok(rows) => rows.into_iter().map(|r| r.row_index).collect(),
            Err(e) => {
                warn!(table_id = %table.id, "Lexical search failed: {}", e);
                return Ok((None, Vec::new()));
            }
        };
        if lexical.is_empty() {
            return Ok((None, Vec::new()));
        }
        debug!(table_id = %table.id, rows = lexical.len(), "Using lexical fallback");
        Ok((Some(CandidateSource::Lexical), lexical))
    }

    /// Rows ordered by text length when the query asks for it, else empty
    async fn length_shortcut(&self, table: &Table, intent: &Intent, top_k: usize) -> Result<Vec<i64>> {
        let Some((order, text_column)) = intent.length_shortcut() else {
            return Ok(Vec::new());
        };
        self.services
            .db
            .rows_by_text_length(&table.id, text_column, intent.category_filter(), order, top_k)
            .await
    }

    /// Vector search; failures degrade to no hits
    async fn vector_hits(&self, table: &Table, query: &str, limit: usize) -> Vec<(i64, f32)> {
        let vector = match self.services.embedder.embed_one(query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(table_id = %table.id, "Query embedding failed, skipping vector search: {}", e);
                return Vec::new();
            }
        };
        match self.services.index.search(&table.id, vector, limit).await {
            Ok(hits) => hits.into_iter().map(|h| (h.row_index, h.score)).collect(),
            Err(e) => {
                warn!(table_id = %table.id, "Vector search failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Filter candidates by category and guardrail and build citations
    async fn cite(
        &self,
        table: &Table,
        columns: &[String],
        intent: &Intent,
        candidates: &[i64],
        confidence: f32,
        top_k: usize,
    ) -> Result<Vec<Citation>> {
        let settings = &self.services.config.retrieval;
        let rows = self.fetch_rows(table, candidates).await?;
        let preferred = [settings.text_column.as_str(), settings.category_column.as_str()];

        let mut citations = Vec::new();
        for idx in candidates {
            let Some(row) = rows.get(idx) else {
                continue;
            };

            if let Some(filter) = intent.category_filter() {
                let value = row.value(filter.column).map(|v| v.to_lowercase());
                if value.as_deref() != Some(filter.value) {
                    continue;
                }
            }

            if settings.guardrails_enabled
                && !row_matches_tokens(
                    &intent.tokens,
                    &row.row_text,
                    settings.guardrails_min_token_match,
                )
            {
                debug!(table_id = %table.id, row = idx, "Guardrail rejected row");
                continue;
            }

            let evidence = row_evidence(row, columns, &preferred);
            if evidence.is_empty() {
                continue;
            }
            citations.push(Citation::new(&table.id, evidence, confidence));
            if citations.len() >= top_k {
                break;
            }
        }
        Ok(citations)
    }

    /// Citations for `indices` without any filtering
    async fn evidence_citations(
        &self,
        table: &Table,
        columns: &[String],
        indices: &[i64],
        confidence: f32,
        top_k: usize,
    ) -> Result<Vec<Citation>> {
        let settings = &self.services.config.retrieval;
        let preferred = [settings.text_column.as_str(), settings.category_column.as_str()];
        let rows = self.fetch_rows(table, indices).await?;

        Ok(indices
            .iter()
            .filter_map(|idx| rows.get(idx))
            .map(|row| row_evidence(row, columns, &preferred))
            .filter(|evidence| !evidence.is_empty())
            .take(top_k)
            .map(|evidence| Citation::new(&table.id, evidence, confidence))
            .collect())
    }

    async fn fetch_rows(&self, table: &Table, indices: &[i64]) -> Result<HashMap<i64, RowRecord>> {
        Ok(self
            .services
            .db
            .rows_by_indices(&table.id, indices)
            .await?
            .into_iter()
            .map(|r| (r.row_index, r))
            .collect())
    }

    /// Look up a recorded highlight
    pub async fn highlight(&self, id: &str) -> Result<Highlight> {
        self.services
            .db
            .get_highlight(id)
            .await?
            .ok_or_else(|| Error::HighlightNotFound(id.to_string()))
    }
}

/// Whether citations ignore an explicitly requested category, so the
/// structured shortcut should replace them
pub fn needs_reresolution(citations: &[Citation], intent: &Intent, guardrails_enabled: bool) -> bool {
    if !guardrails_enabled || citations.is_empty() {
        return false;
    }
    let Some(filter) = intent.category_filter() else {
        return false;
    };
    !citations
        .iter()
        .any(|c| c.has_value(filter.column, filter.value))
}

/// Drop repeated ids, keeping first occurrences in order
fn dedupe(ids: impl IntoIterator<Item = i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

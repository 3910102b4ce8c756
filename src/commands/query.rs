//! Query, rank and highlight commands

use crate::error::Result;
use crate::retrieval::{FusedResult, QueryResult, RankRequest, RankResponse};
use crate::services::Services;
use serde::Serialize;
use tracing::info;

/// Answer a question about a table with cited rows
pub async fn cmd_query(
    services: &Services,
    table_ref: &str,
    query: &str,
    top_k: usize,
) -> Result<QueryResult> {
    info!(table = %table_ref, "Querying: {}", query);
    services.engine().answer(table_ref, query, top_k).await
}

/// Raw fused ranking without guardrails
pub async fn cmd_fused(
    services: &Services,
    table_ref: &str,
    query: &str,
    top_k: usize,
) -> Result<FusedResult> {
    info!(table = %table_ref, "Fused query: {}", query);
    services.engine().fused(table_ref, query, top_k).await
}

pub async fn cmd_rank(services: &Services, request: &RankRequest) -> Result<RankResponse> {
    services.engine().rank(request).await
}

/// A stored highlight with its JSON columns decoded
#[derive(Debug, Clone, Serialize)]
pub struct HighlightView {
    pub id: String,
    pub table_id: String,
    pub created_at: String,
    pub rows: Vec<i64>,
    pub cols: Vec<String>,
    pub evidence: serde_json::Value,
}

pub async fn cmd_highlight(services: &Services, highlight_id: &str) -> Result<HighlightView> {
    let highlight = services.engine().highlight(highlight_id).await?;
    Ok(HighlightView {
        rows: highlight.rows(),
        cols: highlight.cols(),
        evidence: highlight.evidence(),
        id: highlight.id,
        table_id: highlight.table_id,
        created_at: highlight.created_at,
    })
}

pub fn print_query_result(result: &QueryResult) {
    println!("\n🔍 Query: {}\n", result.query);
    println!("{}", result.tool_text);
    if let Some(source) = result.source {
        println!("\nMatched via {} search", source);
    }
}

pub fn print_fused_result(result: &FusedResult) {
    println!("\n🔍 Query: {}\n", result.query);
    if result.rows.is_empty() {
        println!("No rows matched.");
        return;
    }

    println!("Found {} rows:\n", result.rows.len());
    for (i, row) in result.rows.iter().enumerate() {
        println!("{}. [score: {:.4}] row {}", i + 1, row.score, row.row_index);
        for column in &row.columns {
            let value = row.data.get(column).cloned().flatten().unwrap_or_default();
            println!("   {}: {}", column, value);
        }
        println!();
    }
}

pub fn print_rank_response(response: &RankResponse) {
    match response {
        RankResponse::NoMatch { message } => println!("{}", message),
        RankResponse::Ranked(answer) => {
            println!("\n🏆 Top row: {}\n", answer.row_index);
            for (column, value) in &answer.values {
                println!("  {}: {}", column, value.as_deref().unwrap_or(""));
            }
            if answer.citations.len() > 1 {
                let rows: Vec<String> = answer
                    .citations
                    .iter()
                    .flat_map(|c| c.range.rows.iter().map(|r| r.to_string()))
                    .collect();
                println!("\n  Ranked rows: {}", rows.join(", "));
            }
            println!("\nOpen highlight: {}", answer.highlight_url);
        }
    }
}

pub fn print_highlight(view: &HighlightView) {
    println!("🖍  Highlight {}", view.id);
    println!("  Table: {}", view.table_id);
    println!("  Created: {}", view.created_at);
    let rows: Vec<String> = view.rows.iter().map(|r| r.to_string()).collect();
    println!("  Rows: {}", rows.join(", "));
    println!("  Columns: {}", view.cols.join(", "));
}

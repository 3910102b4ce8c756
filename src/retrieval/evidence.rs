//! Citations, evidence cells and their human-readable rendering

use crate::error::Result;
use crate::meta::{Highlight, RowRecord, Table};
use serde::{Deserialize, Serialize};
use url::{form_urlencoded, Url};

/// Most evidence cells attached to one citation
pub const MAX_EVIDENCE_CELLS: usize = 6;

/// Confidence of citations produced by the structured length shortcut
pub const CONFIDENCE_SHORTCUT: f32 = 0.9;
/// Confidence of citations produced by numeric ranking
pub const CONFIDENCE_RANK: f32 = 0.7;
/// Confidence of citations produced by vector or lexical search
pub const CONFIDENCE_FUZZY: f32 = 0.5;

/// One cited cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCell {
    pub row: i64,
    pub col: String,
    pub value: String,
}

/// Rows and columns covered by a citation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRange {
    pub rows: Vec<i64>,
    pub cols: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub table_id: String,
    pub range: CellRange,
    pub evidence: Vec<EvidenceCell>,
    pub confidence: f32,
}

impl Citation {
    pub fn new(table_id: &str, evidence: Vec<EvidenceCell>, confidence: f32) -> Self {
        let mut rows: Vec<i64> = Vec::new();
        for cell in &evidence {
            if !rows.contains(&cell.row) {
                rows.push(cell.row);
            }
        }
        Self {
            table_id: table_id.to_string(),
            range: CellRange {
                rows,
                cols: evidence.iter().map(|e| e.col.clone()).collect(),
            },
            evidence,
            confidence,
        }
    }

    /// Whether any evidence cell of `column` equals `value`, ignoring case
    pub fn has_value(&self, column: &str, value: &str) -> bool {
        self.evidence
            .iter()
            .any(|e| e.col == column && e.value.to_lowercase() == value.to_lowercase())
    }
}

/// Evidence for one row: `preferred` columns first, then the remaining
/// non-null columns in table order, up to [`MAX_EVIDENCE_CELLS`]
pub fn row_evidence(row: &RowRecord, columns: &[String], preferred: &[&str]) -> Vec<EvidenceCell> {
    let data = row.data();
    let mut cells: Vec<EvidenceCell> = Vec::new();
    let cell = |col: &str, value: &str| EvidenceCell {
        row: row.row_index,
        col: col.to_string(),
        value: value.to_string(),
    };

    for col in preferred {
        if let Some(Some(value)) = data.get(*col) {
            if !cells.iter().any(|e| e.col == *col) {
                cells.push(cell(*col, value.as_str()));
            }
        }
    }

    for col in columns {
        if cells.len() >= MAX_EVIDENCE_CELLS {
            break;
        }
        let Some(Some(value)) = data.get(col) else {
            continue;
        };
        if cells.iter().any(|e| &e.col == col) {
            continue;
        }
        cells.push(cell(col.as_str(), value.as_str()));
    }

    cells
}

/// Columns of the given citations, deduplicated in first-seen order
pub fn highlight_columns(citations: &[Citation]) -> Vec<String> {
    let mut cols: Vec<String> = Vec::new();
    for citation in citations {
        for col in &citation.range.cols {
            if !cols.contains(col) {
                cols.push(col.clone());
            }
        }
    }
    cols
}

/// Highlight record for a final citation set
pub fn highlight_for(table_id: &str, citations: &[Citation]) -> Result<Highlight> {
    let rows: Vec<i64> = citations
        .iter()
        .flat_map(|c| c.range.rows.iter().copied())
        .collect();
    let cols = highlight_columns(citations);
    let evidence_json = serde_json::to_string(citations)?;
    Ok(Highlight::new(table_id, &rows, &cols, evidence_json))
}

/// Viewer link `<base>/highlight/<id>`, with `?q=<query>` when a query is given
pub fn viewer_url(base: &str, highlight_id: &str, query: Option<&str>) -> Result<String> {
    let mut url = Url::parse(&format!(
        "{}/highlight/{}",
        base.trim_end_matches('/'),
        highlight_id
    ))?;
    if let Some(q) = query {
        url.set_query(Some(&format!("q={}", percent_quote(q))));
    }
    Ok(url.to_string())
}

/// Percent-encode a query value, spaces as `%20`, keeping `/` and `~` literal
fn percent_quote(value: &str) -> String {
    // Form encoding escapes a literal `+` as %2B, so any `+` left is a space
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%2F", "/")
        .replace("%7E", "~")
}

/// Plain-text summary of a query answer
pub fn tool_text(table: &Table, query: &str, citations: &[Citation], highlight_url: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    if citations.is_empty() {
        lines.push(format!(
            "No matches found in table '{}' for query: {}",
            table.name, query
        ));
        lines.push(String::new());
    } else {
        lines.push(format!(
            "Top matches from table '{}' (table_id={}):",
            table.name, table.id
        ));
        lines.push(String::new());
        for citation in citations {
            let rows = citation
                .range
                .rows
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            let cols = citation
                .range
                .cols
                .iter()
                .map(|c| format!("'{}'", c))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("- row(s) [{}] cols [{}]", rows, cols));
            for cell in &citation.evidence {
                lines.push(format!("  • {}: {}", cell.col, cell.value));
            }
        }
        lines.push(String::new());
    }
    lines.push(format!("Open highlight: {}", highlight_url));
    lines.join("\n")
}

//! Highlight records: write-once citation sets addressable by opaque id

use super::MetaDb;
use crate::error::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A recorded citation set
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Highlight {
    pub id: String,
    pub table_id: String,
    pub created_at: String,
    pub rows_json: String,
    pub cols_json: String,
    pub evidence_json: String,
}

impl Highlight {
    /// New highlight with a fresh `hl_<16 hex>` id
    pub fn new(table_id: &str, rows: &[i64], cols: &[String], evidence_json: String) -> Self {
        let hex = Uuid::new_v4().simple().to_string();
        Self {
            id: format!("hl_{}", &hex[..16]),
            table_id: table_id.to_string(),
            created_at: Utc::now().to_rfc3339(),
            rows_json: serde_json::to_string(rows).unwrap_or_else(|_| "[]".to_string()),
            cols_json: serde_json::to_string(cols).unwrap_or_else(|_| "[]".to_string()),
            evidence_json,
        }
    }

    pub fn rows(&self) -> Vec<i64> {
        serde_json::from_str(&self.rows_json).unwrap_or_default()
    }

    pub fn cols(&self) -> Vec<String> {
        serde_json::from_str(&self.cols_json).unwrap_or_default()
    }

    pub fn evidence(&self) -> serde_json::Value {
        serde_json::from_str(&self.evidence_json).unwrap_or(serde_json::Value::Null)
    }
}

impl MetaDb {
    pub async fn insert_highlight(&self, highlight: &Highlight) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO highlights (id, table_id, created_at, rows_json, cols_json, evidence_json)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&highlight.id)
        .bind(&highlight.table_id)
        .bind(&highlight.created_at)
        .bind(&highlight.rows_json)
        .bind(&highlight.cols_json)
        .bind(&highlight.evidence_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_highlight(&self, id: &str) -> Result<Option<Highlight>> {
        let highlight = sqlx::query_as::<_, Highlight>("SELECT * FROM highlights WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(highlight)
    }
}

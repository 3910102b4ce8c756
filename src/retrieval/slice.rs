//! Paged reads of a table's rows for viewers

use super::Engine;
use crate::error::Result;
use crate::meta::RowData;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct SliceRow {
    pub row_index: i64,
    pub data: RowData,
}

/// A window of rows, optionally projected onto some columns
#[derive(Debug, Clone, Serialize)]
pub struct TableSlice {
    pub table_id: String,
    pub columns: Vec<String>,
    pub offset: i64,
    pub limit: i64,
    pub row_count: i64,
    pub rows: Vec<SliceRow>,
}

impl Engine {
    /// Rows `[offset, offset + limit)` of a table. With `columns`, each row
    /// carries exactly those keys (null when the table lacks the column).
    pub async fn slice(
        &self,
        table_ref: &str,
        offset: i64,
        limit: i64,
        columns: Option<Vec<String>>,
    ) -> Result<TableSlice> {
        let table = self.services.db.resolve_table(table_ref).await?;
        let offset = offset.max(0);
        let limit = limit.max(0);
        let records = self
            .services
            .db
            .read_rows(&table.id, offset..offset.saturating_add(limit))
            .await?;

        let wanted = columns.filter(|c| !c.is_empty());
        let rows = records
            .iter()
            .map(|record| {
                let data = record.data();
                let data = match &wanted {
                    Some(cols) => cols
                        .iter()
                        .map(|c| (c.clone(), data.get(c).cloned().flatten()))
                        .collect(),
                    None => data,
                };
                SliceRow {
                    row_index: record.row_index,
                    data,
                }
            })
            .collect();

        Ok(TableSlice {
            columns: wanted.unwrap_or_else(|| table.columns()),
            table_id: table.id,
            offset,
            limit,
            row_count: table.row_count,
            rows,
        })
    }
}

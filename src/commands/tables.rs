//! Table listing, preview, rename and delete

use crate::error::Result;
use crate::meta::Table;
use crate::retrieval::TableSlice;
use crate::services::Services;
use serde::Serialize;
use tracing::{debug, info};

/// A table with its indexed vector count
#[derive(Debug, Clone, Serialize)]
pub struct TableInfo {
    pub id: String,
    pub name: String,
    pub original_filename: Option<String>,
    pub created_at: String,
    pub row_count: i64,
    pub columns: Vec<String>,
    /// Absent when the vector index could not be reached
    pub vector_count: Option<u64>,
}

impl TableInfo {
    fn new(table: Table, vector_count: Option<u64>) -> Self {
        Self {
            columns: table.columns(),
            id: table.id,
            name: table.name,
            original_filename: table.original_filename,
            created_at: table.created_at,
            row_count: table.row_count,
            vector_count,
        }
    }
}

/// List tables, newest first
pub async fn cmd_list_tables(services: &Services) -> Result<Vec<TableInfo>> {
    let tables = services.db.list_tables().await?;
    let mut infos = Vec::with_capacity(tables.len());
    for table in tables {
        let vectors = match services.index.count(&table.id).await {
            Ok(n) => Some(n),
            Err(e) => {
                debug!(table_id = %table.id, "Vector count unavailable: {}", e);
                None
            }
        };
        infos.push(TableInfo::new(table, vectors));
    }
    Ok(infos)
}

pub async fn cmd_show_table(
    services: &Services,
    table_ref: &str,
    offset: i64,
    limit: i64,
    columns: Option<Vec<String>>,
) -> Result<TableSlice> {
    services
        .engine()
        .slice(table_ref, offset, limit, columns)
        .await
}

pub async fn cmd_rename_table(services: &Services, table_id: &str, name: &str) -> Result<Table> {
    let table = services.db.rename_table(table_id, name).await?;
    info!(table_id = %table.id, name = %table.name, "Renamed table");
    Ok(table)
}

pub async fn cmd_delete_table(services: &Services, table_id: &str) -> Result<()> {
    services.delete_table(table_id).await
}

pub fn print_tables(tables: &[TableInfo]) {
    println!("\n📊 Tables\n");

    if tables.is_empty() {
        println!("No tables yet. Use 'tablerag ingest <file.csv>' to upload one.");
        return;
    }

    for table in tables {
        println!("• {}", table.name);
        println!("  ID: {}", table.id);
        if let Some(file) = &table.original_filename {
            println!("  File: {}", file);
        }
        match table.vector_count {
            Some(vectors) => println!("  Rows: {}, Vectors: {}", table.row_count, vectors),
            None => println!("  Rows: {}", table.row_count),
        }
        println!("  Columns: {}", table.columns.join(", "));
        println!("  Created: {}", table.created_at);
        println!();
    }
}

pub fn print_slice(slice: &TableSlice) {
    println!(
        "\nRows {}..{} of {} in {}\n",
        slice.offset,
        slice.offset + slice.rows.len() as i64,
        slice.row_count,
        slice.table_id
    );
    println!("row\t{}", slice.columns.join("\t"));
    for row in &slice.rows {
        let cells: Vec<String> = slice
            .columns
            .iter()
            .map(|c| row.data.get(c).cloned().flatten().unwrap_or_default())
            .collect();
        println!("{}\t{}", row.row_index, cells.join("\t"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::{run_ingest, REVIEWS_CSV};
    use crate::services::testing::{test_config, test_services};

    #[tokio::test]
    async fn test_list_rename_delete() {
        let (services, _index, _tmp) = test_services(test_config()).await;
        let job = run_ingest(&services, REVIEWS_CSV, "reviews").await;
        let table_id = job.table_id.unwrap();

        let tables = cmd_list_tables(&services).await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].row_count, 3);
        assert_eq!(tables[0].vector_count, Some(3));
        assert_eq!(tables[0].columns, vec!["review", "sentiment"]);

        let renamed = cmd_rename_table(&services, &table_id, "  Feedback ")
            .await
            .unwrap();
        assert_eq!(renamed.name, "Feedback");
        assert!(cmd_rename_table(&services, &table_id, " ").await.is_err());

        cmd_delete_table(&services, &table_id).await.unwrap();
        assert!(cmd_list_tables(&services).await.unwrap().is_empty());
        assert!(cmd_show_table(&services, &table_id, 0, 10, None)
            .await
            .unwrap_err()
            .is_not_found());
    }
}

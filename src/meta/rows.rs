//! Row Store: ordered, immutable rows of one table

use super::MetaDb;
use crate::error::Result;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::BTreeMap;
use std::ops::Range;

/// Column name -> nullable cell value
pub type RowData = BTreeMap<String, Option<String>>;

/// A stored row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct RowRecord {
    pub table_id: String,
    pub row_index: i64,
    pub data_json: String,
    pub row_text: String,
}

impl RowRecord {
    pub fn data(&self) -> RowData {
        serde_json::from_str(&self.data_json).unwrap_or_default()
    }

    /// Non-null value of a column
    pub fn value(&self, column: &str) -> Option<String> {
        self.data().remove(column).flatten()
    }
}

/// A row about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewRow {
    pub row_index: i64,
    pub data: RowData,
    pub row_text: String,
}

/// Ordering for the text-length shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthOrder {
    Shortest,
    Longest,
}

/// Equality filter on a categorical column, compared case-insensitively
#[derive(Debug, Clone, Copy)]
pub struct CategoryFilter<'a> {
    pub column: &'a str,
    pub value: &'a str,
}

/// Raw cells for numeric ranking; parsing happens in the caller
#[derive(Debug, Clone, FromRow)]
pub struct NumericCandidate {
    pub row_index: i64,
    pub primary: Option<String>,
    pub tie: Option<String>,
}

/// SQLite JSON path addressing a top-level key
fn json_path(column: &str) -> String {
    format!("$.\"{}\"", column.replace('"', ""))
}

/// `table_id = ?` plus an OR of escaped LIKE patterns, optionally a category match
fn keyword_condition(keyword_count: usize, with_category: bool) -> String {
    let likes = vec!["row_text LIKE ? ESCAPE '\\'"; keyword_count].join(" OR ");
    let category = if with_category {
        " AND lower(json_extract(data_json, ?)) = ?"
    } else {
        ""
    };
    format!("table_id = ? AND ({}){}", likes, category)
}

fn like_pattern(keyword: &str) -> String {
    let escaped = keyword
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

impl MetaDb {
    /// Append a batch of rows in a single transaction
    pub async fn append_rows(&self, table_id: &str, rows: &[NewRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for row in rows {
            sqlx::query(
                "INSERT INTO data_rows (table_id, row_index, data_json, row_text) VALUES (?, ?, ?, ?)",
            )
            .bind(table_id)
            .bind(row.row_index)
            .bind(serde_json::to_string(&row.data)?)
            .bind(&row.row_text)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Rows whose index falls in `range`, ascending
    pub async fn read_rows(&self, table_id: &str, range: Range<i64>) -> Result<Vec<RowRecord>> {
        let rows = sqlx::query_as::<_, RowRecord>(
            r#"
            SELECT * FROM data_rows
            WHERE table_id = ? AND row_index >= ? AND row_index < ?
            ORDER BY row_index
            "#,
        )
        .bind(table_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Rows with the given indices, ascending; unknown indices are skipped
    pub async fn rows_by_indices(&self, table_id: &str, indices: &[i64]) -> Result<Vec<RowRecord>> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = indices.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let query = format!(
            "SELECT * FROM data_rows WHERE table_id = ? AND row_index IN ({}) ORDER BY row_index",
            placeholders
        );

        let mut query_builder = sqlx::query_as::<_, RowRecord>(&query).bind(table_id);
        for idx in indices {
            query_builder = query_builder.bind(*idx);
        }
        Ok(query_builder.fetch_all(&self.pool).await?)
    }

    pub async fn count_rows(&self, table_id: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM data_rows WHERE table_id = ?")
            .bind(table_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Remove every row of a table, returning how many were deleted
    pub async fn delete_rows(&self, table_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM data_rows WHERE table_id = ?")
            .bind(table_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Row indices ordered by the character length of `text_column`, ties by row_index.
    /// Rows with a null text value are excluded.
    pub async fn rows_by_text_length(
        &self,
        table_id: &str,
        text_column: &str,
        category: Option<CategoryFilter<'_>>,
        order: LengthOrder,
        limit: usize,
    ) -> Result<Vec<i64>> {
        let direction = match order {
            LengthOrder::Shortest => "ASC",
            LengthOrder::Longest => "DESC",
        };
        let category_clause = if category.is_some() {
            "AND lower(json_extract(data_json, ?)) = ?"
        } else {
            ""
        };
        let query = format!(
            r#"
            SELECT row_index FROM data_rows
            WHERE table_id = ? AND json_extract(data_json, ?) IS NOT NULL {}
            ORDER BY length(json_extract(data_json, ?)) {}, row_index ASC
            LIMIT ?
            "#,
            category_clause, direction
        );

        let text_path = json_path(text_column);
        let mut query_builder = sqlx::query_scalar::<_, i64>(&query)
            .bind(table_id)
            .bind(text_path.clone());
        if let Some(filter) = category {
            query_builder = query_builder
                .bind(json_path(filter.column))
                .bind(filter.value.to_lowercase());
        }
        let indices = query_builder
            .bind(text_path)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(indices)
    }

    /// Rows whose flattened text contains any keyword (ASCII case-insensitive), by row_index
    pub async fn rows_matching_keywords(
        &self,
        table_id: &str,
        keywords: &[String],
        category: Option<CategoryFilter<'_>>,
        limit: usize,
    ) -> Result<Vec<RowRecord>> {
        if keywords.is_empty() {
            return Ok(Vec::new());
        }

        let query = format!(
            "SELECT * FROM data_rows WHERE {} ORDER BY row_index LIMIT ?",
            keyword_condition(keywords.len(), category.is_some())
        );
        let mut query_builder = sqlx::query_as::<_, RowRecord>(&query).bind(table_id);
        for pattern in keywords.iter().map(|k| like_pattern(k)) {
            query_builder = query_builder.bind(pattern);
        }
        if let Some(filter) = category {
            query_builder = query_builder
                .bind(json_path(filter.column))
                .bind(filter.value.to_lowercase());
        }
        Ok(query_builder.bind(limit as i64).fetch_all(&self.pool).await?)
    }

    /// Number of keyword-matching rows and their mean text length in characters
    pub async fn keyword_match_stats(&self, table_id: &str, keywords: &[String]) -> Result<(i64, f64)> {
        if keywords.is_empty() {
            return Ok((0, 0.0));
        }

        let query = format!(
            "SELECT COUNT(*), AVG(length(row_text)) FROM data_rows WHERE {}",
            keyword_condition(keywords.len(), false)
        );
        let mut query_builder = sqlx::query_as::<_, (i64, Option<f64>)>(&query).bind(table_id);
        for pattern in keywords.iter().map(|k| like_pattern(k)) {
            query_builder = query_builder.bind(pattern);
        }
        let (count, avg_len) = query_builder.fetch_one(&self.pool).await?;
        Ok((count, avg_len.unwrap_or(0.0)))
    }

    /// Stream every keyword-matching row through `visit`, by row_index.
    /// Returns how many rows were visited.
    pub async fn for_each_keyword_match<F>(
        &self,
        table_id: &str,
        keywords: &[String],
        mut visit: F,
    ) -> Result<u64>
    where
        F: FnMut(RowRecord),
    {
        if keywords.is_empty() {
            return Ok(0);
        }

        let query = format!(
            "SELECT * FROM data_rows WHERE {} ORDER BY row_index",
            keyword_condition(keywords.len(), false)
        );
        let mut query_builder = sqlx::query_as::<_, RowRecord>(&query).bind(table_id);
        for pattern in keywords.iter().map(|k| like_pattern(k)) {
            query_builder = query_builder.bind(pattern);
        }

        let mut rows = query_builder.fetch(&self.pool);
        let mut visited = 0;
        while let Some(row) = rows.try_next().await? {
            visit(row);
            visited += 1;
        }
        Ok(visited)
    }

    /// Raw primary (and tie) cells of every row whose primary cell is present
    pub async fn numeric_candidates(
        &self,
        table_id: &str,
        primary_column: &str,
        tie_column: Option<&str>,
    ) -> Result<Vec<NumericCandidate>> {
        let candidates = sqlx::query_as::<_, NumericCandidate>(
            r#"
            SELECT row_index,
                   json_extract(data_json, ?) AS "primary",
                   json_extract(data_json, ?) AS tie
            FROM data_rows
            WHERE table_id = ? AND json_extract(data_json, ?) IS NOT NULL
            ORDER BY row_index
            "#,
        )
        .bind(json_path(primary_column))
        .bind(tie_column.map(json_path).unwrap_or_else(|| "$.\"\"".to_string()))
        .bind(table_id)
        .bind(json_path(primary_column))
        .fetch_all(&self.pool)
        .await?;
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Table;
    use tempfile::TempDir;

    fn row(idx: i64, review: Option<&str>, sentiment: &str) -> NewRow {
        let mut data = RowData::new();
        data.insert("review".to_string(), review.map(str::to_string));
        data.insert("sentiment".to_string(), Some(sentiment.to_string()));
        let row_text = match review {
            Some(r) => format!("review: {} | sentiment: {}", r, sentiment),
            None => format!("sentiment: {}", sentiment),
        };
        NewRow {
            row_index: idx,
            data,
            row_text,
        }
    }

    async fn seeded_db() -> (MetaDb, Table, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let table = Table::new(
            "reviews".to_string(),
            None,
            &["review".to_string(), "sentiment".to_string()],
        );
        db.insert_table(&table).await.unwrap();
        db.append_rows(
            &table.id,
            &[
                row(0, Some("great"), "positive"),
                row(1, Some("bad"), "negative"),
                row(2, Some("ok"), "Positive"),
                row(3, None, "positive"),
                row(4, Some("a truly great 100% fix"), "negative"),
            ],
        )
        .await
        .unwrap();
        (db, table, tmp)
    }

    #[tokio::test]
    async fn test_append_read_count_delete() {
        let (db, table, _tmp) = seeded_db().await;

        assert_eq!(db.count_rows(&table.id).await.unwrap(), 5);

        let window = db.read_rows(&table.id, 1..3).await.unwrap();
        assert_eq!(
            window.iter().map(|r| r.row_index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert_eq!(window[0].value("review").as_deref(), Some("bad"));

        let picked = db.rows_by_indices(&table.id, &[4, 0, 99]).await.unwrap();
        assert_eq!(
            picked.iter().map(|r| r.row_index).collect::<Vec<_>>(),
            vec![0, 4]
        );
        assert_eq!(picked[0].value("missing"), None);

        assert_eq!(db.delete_rows(&table.id).await.unwrap(), 5);
        assert_eq!(db.count_rows(&table.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rows_by_text_length() {
        let (db, table, _tmp) = seeded_db().await;

        let positive = CategoryFilter {
            column: "sentiment",
            value: "POSITIVE",
        };
        let shortest = db
            .rows_by_text_length(&table.id, "review", Some(positive), LengthOrder::Shortest, 5)
            .await
            .unwrap();
        assert_eq!(shortest, vec![2, 0]);

        let longest = db
            .rows_by_text_length(&table.id, "review", None, LengthOrder::Longest, 2)
            .await
            .unwrap();
        assert_eq!(longest, vec![4, 0]);
    }

    #[tokio::test]
    async fn test_rows_matching_keywords() {
        let (db, table, _tmp) = seeded_db().await;

        let hits = db
            .rows_matching_keywords(&table.id, &["GREAT".to_string()], None, 10)
            .await
            .unwrap();
        assert_eq!(
            hits.iter().map(|r| r.row_index).collect::<Vec<_>>(),
            vec![0, 4]
        );

        let negative = CategoryFilter {
            column: "sentiment",
            value: "negative",
        };
        let hits = db
            .rows_matching_keywords(&table.id, &["great".to_string()], Some(negative), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].row_index, 4);

        // `%` is matched literally
        let hits = db
            .rows_matching_keywords(&table.id, &["0%".to_string()], None, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        assert!(db
            .rows_matching_keywords(&table.id, &[], None, 10)
            .await
            .unwrap()
            .is_empty());
    }
}

//! In-memory [`VectorIndex`] for tests and `backend = "memory"`.
//!
//! Brute-force cosine similarity behind `std::sync::RwLock`.

use super::{RowHit, RowPoint, VectorIndex};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

struct StoredPoint {
    row_index: i64,
    vector: Vec<f32>,
}

/// Points keyed by table, then by point id
#[derive(Default)]
pub struct MemoryIndex {
    tables: RwLock<HashMap<String, HashMap<Uuid, StoredPoint>>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Other("memory index lock poisoned".to_string())
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn upsert(&self, table_id: &str, points: Vec<RowPoint>) -> Result<()> {
        let mut tables = self.tables.write().map_err(poisoned)?;
        let table = tables.entry(table_id.to_string()).or_default();
        for point in points {
            table.insert(
                point.id,
                StoredPoint {
                    row_index: point.payload.row_index,
                    vector: point.vector,
                },
            );
        }
        Ok(())
    }

    async fn search(&self, table_id: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<RowHit>> {
        let tables = self.tables.read().map_err(poisoned)?;
        let Some(table) = tables.get(table_id) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<RowHit> = table
            .values()
            .map(|p| RowHit {
                row_index: p.row_index,
                score: cosine_sim(&vector, &p.vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.row_index.cmp(&b.row_index))
        });
        hits.truncate(limit);
        Ok(hits)
    }

    async fn count(&self, table_id: &str) -> Result<u64> {
        let tables = self.tables.read().map_err(poisoned)?;
        Ok(tables.get(table_id).map(|t| t.len() as u64).unwrap_or(0))
    }

    async fn delete_table(&self, table_id: &str) -> Result<()> {
        self.tables.write().map_err(poisoned)?.remove(table_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites_and_counts_per_table() {
        let index = MemoryIndex::new();
        index
            .upsert(
                "t1",
                vec![
                    RowPoint::new("t1", 0, "a".into(), vec![1.0, 0.0]),
                    RowPoint::new("t1", 1, "b".into(), vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        index
            .upsert("t1", vec![RowPoint::new("t1", 0, "a".into(), vec![0.5, 0.5])])
            .await
            .unwrap();
        index
            .upsert("t2", vec![RowPoint::new("t2", 0, "c".into(), vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(index.count("t1").await.unwrap(), 2);
        assert_eq!(index.count("t2").await.unwrap(), 1);
        assert_eq!(index.count("t3").await.unwrap(), 0);

        index.delete_table("t1").await.unwrap();
        assert_eq!(index.count("t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_search_is_filtered_and_ranked() {
        let index = MemoryIndex::new();
        index
            .upsert(
                "t1",
                vec![
                    RowPoint::new("t1", 0, "a".into(), vec![0.0, 1.0]),
                    RowPoint::new("t1", 1, "b".into(), vec![1.0, 0.0]),
                    RowPoint::new("t1", 2, "c".into(), vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();
        index
            .upsert("t2", vec![RowPoint::new("t2", 9, "z".into(), vec![1.0, 0.0])])
            .await
            .unwrap();

        let hits = index.search("t1", vec![1.0, 0.0], 2).await.unwrap();
        assert_eq!(
            hits.iter().map(|h| h.row_index).collect::<Vec<_>>(),
            vec![1, 2]
        );
        assert!(index.search("missing", vec![1.0, 0.0], 5).await.unwrap().is_empty());
    }
}

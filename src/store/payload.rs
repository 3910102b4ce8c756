//! Payload schema for row points

use qdrant_client::qdrant::{PointStruct, Value as QdrantValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Deterministic point id for a row: UUIDv5 over `"<table_id>:<row_index>"`.
///
/// Re-embedding a row therefore overwrites its point instead of adding one.
pub fn point_id(table_id: &str, row_index: i64) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_URL,
        format!("{}:{}", table_id, row_index).as_bytes(),
    )
}

/// A point ready to be upserted
#[derive(Debug, Clone)]
pub struct RowPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: RowPayload,
}

impl RowPoint {
    pub fn new(table_id: &str, row_index: i64, row_text: String, vector: Vec<f32>) -> Self {
        Self {
            id: point_id(table_id, row_index),
            vector,
            payload: RowPayload {
                table_id: table_id.to_string(),
                row_index,
                row_text,
            },
        }
    }

    /// Convert to qdrant-client PointStruct
    pub fn to_point_struct(self) -> PointStruct {
        PointStruct::new(
            self.id.to_string(),
            self.vector,
            self.payload.to_qdrant_payload(),
        )
    }
}

/// Payload stored with each row vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPayload {
    /// Partition key; every search and count filters on it
    pub table_id: String,
    pub row_index: i64,
    pub row_text: String,
}

impl RowPayload {
    pub fn to_qdrant_payload(&self) -> HashMap<String, QdrantValue> {
        let mut map = HashMap::new();
        map.insert("table_id".to_string(), self.table_id.clone().into());
        map.insert("row_index".to_string(), self.row_index.into());
        map.insert("row_text".to_string(), self.row_text.clone().into());
        map
    }
}

/// A similarity hit
#[derive(Debug, Clone, PartialEq)]
pub struct RowHit {
    pub row_index: i64,
    pub score: f32,
}

/// Read `row_index` back out of a Qdrant payload
pub fn row_index_from_payload(payload: &HashMap<String, QdrantValue>) -> Option<i64> {
    use qdrant_client::qdrant::value::Kind;

    match payload.get("row_index")?.kind.as_ref()? {
        Kind::IntegerValue(i) => Some(*i),
        Kind::DoubleValue(d) => Some(*d as i64),
        Kind::StringValue(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_id_is_deterministic() {
        assert_eq!(point_id("t1", 5), point_id("t1", 5));
        assert_ne!(point_id("t1", 5), point_id("t1", 6));
        assert_ne!(point_id("t1", 5), point_id("t2", 5));
        assert_eq!(
            point_id("t1", 5),
            Uuid::new_v5(&Uuid::NAMESPACE_URL, b"t1:5")
        );
    }

    #[test]
    fn test_payload_conversion() {
        let point = RowPoint::new("t1", 3, "review: ok".to_string(), vec![1.0]);
        let payload = point.payload.to_qdrant_payload();
        assert_eq!(row_index_from_payload(&payload), Some(3));
        assert_eq!(payload.len(), 3);

        let ps = point.to_point_struct();
        assert!(ps.id.is_some());
    }
}

//! Vector index integration
//!
//! This module wraps vector search partitioned per table:
//! - The `VectorIndex` trait (upsert, filtered search, exact filtered count)
//! - `QdrantIndex`, a single shared Qdrant collection keyed by a `table_id` payload
//! - `MemoryIndex`, a brute-force in-process index

mod memory;
mod payload;

pub use memory::*;
pub use payload::*;

use crate::config::Config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    vectors_config, CollectionInfo, Condition, CountPointsBuilder, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Distance, FieldType, Filter,
    PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Vector search partitioned by table id
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite points of one table
    async fn upsert(&self, table_id: &str, points: Vec<RowPoint>) -> Result<()>;

    /// Nearest rows of one table, best first
    async fn search(&self, table_id: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<RowHit>>;

    /// Exact number of points stored for a table
    async fn count(&self, table_id: &str) -> Result<u64>;

    /// Remove every point of a table
    async fn delete_table(&self, table_id: &str) -> Result<()>;
}

/// Create the configured vector index
pub fn create_vector_index(config: &Config) -> Result<Arc<dyn VectorIndex>> {
    match config.vector.backend.as_str() {
        "qdrant" => Ok(Arc::new(QdrantIndex::new(
            &config.vector.qdrant_url,
            &config.vector.collection_name,
        )?)),
        "memory" => Ok(Arc::new(MemoryIndex::new())),
        other => Err(Error::Config(format!("Unsupported vector backend '{}'", other))),
    }
}

fn table_filter(table_id: &str) -> Filter {
    Filter::must([Condition::matches("table_id", table_id.to_string())])
}

/// Size of the single unnamed vector of a collection
fn collection_vector_size(info: &CollectionInfo) -> Option<u64> {
    let config = info.config.as_ref()?.params.as_ref()?.vectors_config.as_ref()?;
    match config.config.as_ref()? {
        vectors_config::Config::Params(params) => Some(params.size),
        vectors_config::Config::ParamsMap(_) => None,
    }
}

/// Qdrant-backed index
pub struct QdrantIndex {
    client: Qdrant,
    collection: String,
    /// Vector size of the collection once it is known to exist
    ready: OnceCell<u64>,
}

impl QdrantIndex {
    /// Create a new index handle; the collection is created on first upsert
    pub fn new(url: &str, collection: &str) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .skip_compatibility_check()
            .build()
            .map_err(|e| Error::Qdrant(e.to_string()))?;

        Ok(Self {
            client,
            collection: collection.to_string(),
            ready: OnceCell::new(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    async fn collection_exists(&self) -> Result<bool> {
        if self.ready.initialized() {
            return Ok(true);
        }
        Ok(self.client.collection_exists(&self.collection).await?)
    }

    /// Ensure the collection exists and a keyword index on `table_id`.
    ///
    /// Returns the collection's vector size; `dimension` is only used to create it.
    async fn ensure_collection(&self, dimension: u64) -> Result<u64> {
        let size = self
            .ready
            .get_or_try_init(|| async {
                if self.client.collection_exists(&self.collection).await? {
                    let info = self.client.collection_info(&self.collection).await?;
                    let size = info
                        .result
                        .as_ref()
                        .and_then(collection_vector_size)
                        .ok_or_else(|| {
                            Error::Qdrant(format!(
                                "Collection '{}' has no single vector size",
                                self.collection
                            ))
                        })?;
                    debug!("Collection {} already exists with dimension {}", self.collection, size);
                    return Ok::<u64, Error>(size);
                }

                info!(
                    "Creating collection {} with dimension {}",
                    self.collection, dimension
                );
                self.client
                    .create_collection(
                        CreateCollectionBuilder::new(&self.collection)
                            .vectors_config(VectorParamsBuilder::new(dimension, Distance::Cosine)),
                    )
                    .await?;
                self.client
                    .create_field_index(CreateFieldIndexCollectionBuilder::new(
                        &self.collection,
                        "table_id",
                        FieldType::Keyword,
                    ))
                    .await?;
                Ok(dimension)
            })
            .await?;
        Ok(*size)
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, table_id: &str, points: Vec<RowPoint>) -> Result<()> {
        let Some(first) = points.first() else {
            return Ok(());
        };
        let dimension = self.ensure_collection(first.vector.len() as u64).await?;

        if let Some(mismatch) = points
            .iter()
            .find(|p| p.vector.len() as u64 != dimension || p.payload.table_id != table_id)
        {
            return Err(Error::Qdrant(format!(
                "Point for row {} does not fit collection '{}' (table {}, dimension {}, got {})",
                mismatch.payload.row_index,
                self.collection,
                table_id,
                dimension,
                mismatch.vector.len()
            )));
        }

        debug!(
            "Upserting {} points to collection {}",
            points.len(),
            self.collection
        );

        let point_structs: Vec<PointStruct> =
            points.into_iter().map(|p| p.to_point_struct()).collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, point_structs).wait(true))
            .await?;
        Ok(())
    }

    async fn search(&self, table_id: &str, vector: Vec<f32>, limit: usize) -> Result<Vec<RowHit>> {
        if !self.collection_exists().await? {
            debug!("Collection {} missing, no vector hits", self.collection);
            return Ok(Vec::new());
        }

        let response = self
            .client
            .search_points(
                SearchPointsBuilder::new(&self.collection, vector, limit as u64)
                    .filter(table_filter(table_id))
                    .with_payload(true),
            )
            .await?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                row_index_from_payload(&p.payload).map(|row_index| RowHit {
                    row_index,
                    score: p.score,
                })
            })
            .collect())
    }

    async fn count(&self, table_id: &str) -> Result<u64> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        let response = self
            .client
            .count(
                CountPointsBuilder::new(&self.collection)
                    .filter(table_filter(table_id))
                    .exact(true),
            )
            .await?;
        Ok(response.result.map(|r| r.count).unwrap_or(0))
    }

    async fn delete_table(&self, table_id: &str) -> Result<()> {
        if !self.collection_exists().await? {
            return Ok(());
        }

        info!(table_id = %table_id, "Deleting table vectors from {}", self.collection);
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(table_filter(table_id))
                    .wait(true),
            )
            .await?;
        Ok(())
    }
}

//! Process-wide service handles
//!
//! Built once at startup and cloned into every pipeline run and query.

use crate::config::Config;
use crate::embed::EmbeddingGateway;
use crate::error::{Error, Result};
use crate::ingest::Pipeline;
use crate::meta::MetaDb;
use crate::retrieval::Engine;
use crate::store::{create_vector_index, VectorIndex};
use std::sync::Arc;
use tracing::{info, warn};

/// Injected collaborators shared by the pipeline and the retrieval engine
#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub db: MetaDb,
    pub embedder: Arc<EmbeddingGateway>,
    pub index: Arc<dyn VectorIndex>,
}

impl Services {
    pub fn new(
        config: Config,
        db: MetaDb,
        embedder: Arc<EmbeddingGateway>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            db,
            embedder,
            index,
        }
    }

    /// Connect to the metadata database and build the configured backends
    pub async fn connect(config: Config) -> Result<Self> {
        let db = MetaDb::connect(&config).await?;
        if !db.is_initialized().await? {
            return Err(Error::NotInitialized);
        }

        let embedder = Arc::new(EmbeddingGateway::from_config(&config.embedding)?);
        let index = create_vector_index(&config)?;
        info!(
            vector_backend = %config.vector.backend,
            embedding_backend = %config.embedding.backend,
            "Services ready"
        );

        Ok(Self::new(config, db, embedder, index))
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(self.clone())
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.clone())
    }

    /// Delete a table with its rows, highlights, jobs and vectors
    pub async fn delete_table(&self, table_id: &str) -> Result<()> {
        if self.db.get_table(table_id).await?.is_none() {
            return Err(Error::TableNotFound(table_id.to_string()));
        }

        if let Err(e) = self.index.delete_table(table_id).await {
            warn!(table_id = %table_id, "Failed to delete table vectors: {}", e);
        }

        if !self.db.delete_table(table_id).await? {
            return Err(Error::TableNotFound(table_id.to_string()));
        }
        info!(table_id = %table_id, "Deleted table");
        Ok(())
    }
}

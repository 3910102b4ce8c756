//! In-process embeddings with fastembed

use super::Embedder;
use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Row texts are embedded as passages; fastembed batches internally too
const FASTEMBED_BATCH: usize = 256;

/// Model identifiers accepted for the local backend
fn local_model(name: &str) -> Result<EmbeddingModel> {
    match name {
        "BAAI/bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "BAAI/bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "BAAI/bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        "sentence-transformers/all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => Err(Error::Config(format!(
            "Model '{}' is not available for the local embedding backend; use the http backend",
            other
        ))),
    }
}

pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
    model_name: String,
    dimension: Option<usize>,
}

impl FastEmbedder {
    /// Load (downloading on first use) the configured model
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = local_model(&config.model)?;
        info!(model = %config.model, "Loading local embedding model");

        let text_embedding =
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(true))
                .map_err(|e| {
                    Error::Embedding(format!("Failed to load model '{}': {}", config.model, e))
                })?;

        Ok(Self {
            model: Arc::new(Mutex::new(text_embedding)),
            model_name: config.model.clone(),
            dimension: config.resolved_dimension(),
        })
    }
}

#[async_trait]
impl Embedder for FastEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(rows = texts.len(), model = %self.model_name, "Embedding row texts locally");

        // Inference is CPU-bound
        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || {
            let model = model
                .lock()
                .map_err(|_| Error::Embedding("Local embedding model lock poisoned".to_string()))?;
            model
                .embed(texts, Some(FASTEMBED_BATCH))
                .map_err(|e| Error::Embedding(e.to_string()))
        })
        .await
        .map_err(|e| Error::Embedding(format!("Embedding task failed: {}", e)))?
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

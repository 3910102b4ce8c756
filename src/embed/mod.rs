//! Embedding generation
//!
//! This module provides an abstraction over embedding models with:
//! - A trait for different embedding backends (fastembed, HTTP sidecar, hashing)
//! - The `EmbeddingGateway`, which batches, normalizes and tracks the vector dimension

#[cfg(feature = "local-embed")]
mod fastembed_impl;
mod hash;
mod http_backend;

#[cfg(feature = "local-embed")]
pub use fastembed_impl::*;
pub use hash::*;
pub use http_backend::*;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// L2-normalize a vector; the zero vector is returned unchanged
pub fn normalize_embedding(vector: &[f32]) -> Vec<f32> {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return vector.to_vec();
    }
    vector.iter().map(|v| v / norm).collect()
}

/// Trait for embedding providers
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>>;

    /// Declared embedding dimension, if the backend knows it up front
    fn dimension(&self) -> Option<usize>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Create an embedder based on configuration
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.backend.as_str() {
        #[cfg(feature = "local-embed")]
        "local" => Ok(Arc::new(FastEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embed"))]
        "local" => Err(Error::Config(
            "embedding.backend 'local' requires the local-embed feature".to_string(),
        )),
        "http" => Ok(Arc::new(HttpEmbedder::new(config)?)),
        "hash" => Ok(Arc::new(HashEmbedder::new(
            config.dimension.unwrap_or(DEFAULT_HASH_DIMENSION),
        ))),
        other => Err(Error::Config(format!(
            "Unsupported embedding backend '{}'",
            other
        ))),
    }
}

/// Batching, normalizing front door to an [`Embedder`].
///
/// The vector dimension is discovered once, either from the backend's
/// declaration or by embedding a sample text, and every later vector is
/// checked against it.
pub struct EmbeddingGateway {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    dimension: OnceCell<usize>,
}

impl EmbeddingGateway {
    pub fn new(embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        Self {
            embedder,
            batch_size: batch_size.max(1),
            dimension: OnceCell::new(),
        }
    }

    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let embedder = create_embedder(config)?;
        info!(
            "Embedding gateway using model {} ({} backend)",
            embedder.model_name(),
            config.backend
        );
        Ok(Self::new(embedder, config.batch_size))
    }

    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Vector length produced by this gateway
    pub async fn dimension(&self) -> Result<usize> {
        let dim = self
            .dimension
            .get_or_try_init(|| async {
                if let Some(declared) = self.embedder.dimension() {
                    return Ok(declared);
                }
                debug!("Discovering embedder vector dimension");
                let sample = self.embedder.embed(vec!["hello".to_string()]).await?;
                sample
                    .first()
                    .map(|v| v.len())
                    .filter(|len| *len > 0)
                    .ok_or_else(|| {
                        Error::Embedding("Embedder returned no vector for the sample text".to_string())
                    })
            })
            .await?;
        Ok(*dim)
    }

    /// Embed texts in `batch_size` batches, returning one unit vector per text
    pub async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let embeddings = self.embedder.embed(chunk.to_vec()).await?;
            if embeddings.len() != chunk.len() {
                return Err(Error::Embedding(format!(
                    "Embedder returned {} vectors for {} texts",
                    embeddings.len(),
                    chunk.len()
                )));
            }
            for vector in embeddings {
                all_embeddings.push(self.check_dimension(normalize_embedding(&vector))?);
            }
        }

        Ok(all_embeddings)
    }

    /// Embed a single text
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| Error::Embedding("Embedder returned no vector".to_string()))
    }

    fn check_dimension(&self, vector: Vec<f32>) -> Result<Vec<f32>> {
        if vector.is_empty() {
            return Err(Error::Embedding("Embedder returned an empty vector".to_string()));
        }
        // First vector fixes the dimension when it has not been discovered yet
        let _ = self.dimension.set(vector.len());
        match self.dimension.get() {
            Some(dim) if *dim != vector.len() => Err(Error::Embedding(format!(
                "Embedding dimension mismatch for model '{}': expected {}, got {}",
                self.model_name(),
                dim,
                vector.len()
            ))),
            _ => Ok(vector),
        }
    }
}

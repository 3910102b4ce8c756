//! Deterministic hashing embedder for offline use and tests

use super::Embedder;
use crate::error::Result;
use async_trait::async_trait;

pub const DEFAULT_HASH_DIMENSION: usize = 256;

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(FNV_PRIME)
    })
}

/// Bag-of-tokens embedder: each lowercased alphanumeric token is hashed
/// (FNV-1a) into a bucket with a hash-derived sign.
///
/// Texts sharing tokens get a positive cosine similarity; no model download needed.
pub struct HashEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            model_name: format!("fnv1a-hash-{}", dimension),
        }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let lowered = text.to_lowercase();
        for token in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.as_bytes());
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }
        vector
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

//! Configuration management for tablerag
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the table viewer; highlight links are built from it
    #[serde(default = "default_viewer_base_url")]
    pub viewer_base_url: String,

    /// Vector index configuration
    #[serde(default)]
    pub vector: VectorConfig,

    /// Embedding model configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Ingestion pipeline configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Query configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Highlight configuration
    #[serde(default)]
    pub highlight: HighlightConfig,

    /// Background worker configuration
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// "qdrant" or "memory"
    #[serde(default = "default_vector_backend")]
    pub backend: String,

    /// Qdrant connection URL
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Qdrant collection shared by all tables
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// "local" (fastembed), "http" or "hash"
    #[serde(default = "default_embedding_backend")]
    pub backend: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension; discovered from the model when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// Batch size for a single embedding call
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Base URL of the HTTP embedding sidecar
    #[serde(default = "default_embedding_backend_url")]
    pub backend_url: String,
}

/// Lookup the expected embedding dimension for a known model
pub fn embedding_dimension_for_model(model: &str) -> Option<usize> {
    match model {
        "BAAI/bge-small-en-v1.5" => Some(384),
        "BAAI/bge-base-en-v1.5" => Some(768),
        "BAAI/bge-large-en-v1.5" => Some(1024),
        "sentence-transformers/all-MiniLM-L6-v2" => Some(384),
        _ => None,
    }
}

impl EmbeddingConfig {
    /// Resolve the declared embedding dimension, if any
    pub fn resolved_dimension(&self) -> Option<usize> {
        match (embedding_dimension_for_model(&self.model), self.dimension) {
            (Some(expected), Some(configured)) if expected != configured => {
                warn!(
                    "Embedding dimension {} does not match model '{}' ({}); using {}",
                    configured, self.model, expected, expected
                );
                Some(expected)
            }
            (Some(expected), _) => Some(expected),
            (None, configured) => configured,
        }
    }
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Run the embedding phase as part of the upload job
    #[serde(default = "default_embed_on_upload")]
    pub embed_on_upload: bool,

    /// Rows between progress updates (and row-store batch size)
    #[serde(default = "default_progress_every_rows")]
    pub progress_every_rows: usize,

    /// Rows read per embedding window
    #[serde(default = "default_embed_scan_batch")]
    pub embed_scan_batch: usize,

    /// Rows embedded and upserted per batch
    #[serde(default = "default_embed_batch")]
    pub embed_batch: usize,

    /// Character budget of the flattened row text
    #[serde(default = "default_row_text_max_chars")]
    pub row_text_max_chars: usize,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Drop rows that share too few keywords with the query
    #[serde(default = "default_guardrails_enabled")]
    pub guardrails_enabled: bool,

    /// Minimum keyword hits for a row to survive the guardrail
    #[serde(default = "default_guardrails_min_token_match")]
    pub guardrails_min_token_match: usize,

    /// Free-text column ranked by the length shortcut
    #[serde(default = "default_text_column")]
    pub text_column: String,

    /// Categorical column used as a filter
    #[serde(default = "default_category_column")]
    pub category_column: String,

    /// Category values recognized as query hints
    #[serde(default = "default_category_values")]
    pub category_values: Vec<String>,

    /// RRF damping constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,
}

/// Highlight configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighlightConfig {
    /// Intended lifetime of a highlight. Recorded for viewers, never enforced.
    #[serde(default = "default_highlight_ttl_minutes")]
    pub ttl_minutes: u64,
}

/// Background worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Seconds between scans for jobs left in `indexing`
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for tablerag data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewer_base_url: default_viewer_base_url(),
            vector: VectorConfig::default(),
            embedding: EmbeddingConfig::default(),
            ingest: IngestConfig::default(),
            retrieval: RetrievalConfig::default(),
            highlight: HighlightConfig::default(),
            worker: WorkerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for VectorConfig {
    fn default() -> Self {
        Self {
            backend: default_vector_backend(),
            qdrant_url: default_qdrant_url(),
            collection_name: default_collection_name(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: default_embedding_backend(),
            model: default_embedding_model(),
            dimension: None,
            batch_size: default_embedding_batch_size(),
            backend_url: default_embedding_backend_url(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            embed_on_upload: default_embed_on_upload(),
            progress_every_rows: default_progress_every_rows(),
            embed_scan_batch: default_embed_scan_batch(),
            embed_batch: default_embed_batch(),
            row_text_max_chars: default_row_text_max_chars(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            guardrails_enabled: default_guardrails_enabled(),
            guardrails_min_token_match: default_guardrails_min_token_match(),
            text_column: default_text_column(),
            category_column: default_category_column(),
            category_values: default_category_values(),
            rrf_k: default_rrf_k(),
        }
    }
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            ttl_minutes: default_highlight_ttl_minutes(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

impl Config {
    /// Get the default base directory for tablerag (~/.tablerag)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tablerag")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("tablerag.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("tablerag.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific base directory
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.vector.backend.as_str(), "qdrant" | "memory") {
            return Err(Error::Config(format!(
                "vector.backend must be 'qdrant' or 'memory', got '{}'",
                self.vector.backend
            )));
        }

        if !matches!(self.embedding.backend.as_str(), "local" | "http" | "hash") {
            return Err(Error::Config(format!(
                "embedding.backend must be 'local', 'http' or 'hash', got '{}'",
                self.embedding.backend
            )));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be positive".to_string(),
            ));
        }

        if self.ingest.progress_every_rows == 0
            || self.ingest.embed_scan_batch == 0
            || self.ingest.embed_batch == 0
        {
            return Err(Error::Config(
                "ingest batch sizes must be positive".to_string(),
            ));
        }

        if self.retrieval.guardrails_enabled && self.retrieval.guardrails_min_token_match == 0 {
            return Err(Error::Config(
                "retrieval.guardrails_min_token_match must be >= 1 when guardrails are enabled"
                    .to_string(),
            ));
        }

        if self.retrieval.rrf_k == 0 {
            return Err(Error::Config("retrieval.rrf_k must be positive".to_string()));
        }

        if url::Url::parse(&self.viewer_base_url).is_err() {
            return Err(Error::Config(format!(
                "viewer_base_url is not a valid URL: '{}'",
                self.viewer_base_url
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.vector.collection_name, "table_rows");
        assert_eq!(config.ingest.embed_batch, 128);
        assert_eq!(config.ingest.row_text_max_chars, 2000);
        assert_eq!(config.retrieval.rrf_k, 60);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.init_paths(Some(tmp.path().to_path_buf()));
        config.vector.collection_name = "test_collection".to_string();
        config.retrieval.text_column = "comment".to_string();

        config.save().unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load_from(Some(tmp.path().to_path_buf())).unwrap();
        assert_eq!(loaded.vector.collection_name, "test_collection");
        assert_eq!(loaded.retrieval.text_column, "comment");
        assert_eq!(loaded.paths.db_file, tmp.path().join("tablerag.db"));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [retrieval]
            guardrails_enabled = false
            "#,
        )
        .unwrap();
        assert!(!config.retrieval.guardrails_enabled);
        assert_eq!(config.retrieval.category_column, "sentiment");
        assert_eq!(config.worker.poll_interval_secs, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.vector.backend = "pinecone".to_string();
        assert!(config.validate().is_err());
        config.vector.backend = "memory".to_string();
        assert!(config.validate().is_ok());

        config.ingest.embed_batch = 0;
        assert!(config.validate().is_err());
        config.ingest.embed_batch = 16;

        config.retrieval.guardrails_min_token_match = 0;
        assert!(config.validate().is_err());
        config.retrieval.guardrails_enabled = false;
        assert!(config.validate().is_ok());

        config.viewer_base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolved_dimension_matches_model() {
        let mut config = Config::default();
        config.embedding.model = "BAAI/bge-base-en-v1.5".to_string();
        config.embedding.dimension = Some(384);
        assert_eq!(config.embedding.resolved_dimension(), Some(768));

        config.embedding.model = "custom-model".to_string();
        assert_eq!(config.embedding.resolved_dimension(), Some(384));

        config.embedding.dimension = None;
        assert_eq!(config.embedding.resolved_dimension(), None);
    }
}

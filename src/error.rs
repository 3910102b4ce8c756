//! Custom error types for tablerag

use thiserror::Error;

/// Main error type for tablerag operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Qdrant error: {0}")]
    Qdrant(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    #[error("Empty CSV")]
    EmptyInput,

    #[error("No rows to embed for table {0}")]
    NoRowsToEmbed(String),

    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Highlight not found: {0}")]
    HighlightNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid job transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not initialized: run 'tablerag init' first")]
    NotInitialized,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for errors that name a missing entity the caller referenced
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::TableNotFound(_) | Error::JobNotFound(_) | Error::HighlightNotFound(_)
        )
    }
}

/// Result type alias for tablerag
pub type Result<T> = std::result::Result<T, Error>;

/// Convert qdrant errors
impl From<qdrant_client::QdrantError> for Error {
    fn from(err: qdrant_client::QdrantError) -> Self {
        Error::Qdrant(err.to_string())
    }
}

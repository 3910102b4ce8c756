//! Default values for configuration

/// Default viewer base URL used to build highlight links
pub fn default_viewer_base_url() -> String {
    std::env::var("TABLERAG_VIEWER_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:5173".to_string())
}

/// Default vector backend
pub fn default_vector_backend() -> String {
    "qdrant".to_string()
}

/// Default Qdrant gRPC URL for local development (port 6334, not 6333 REST)
pub fn default_qdrant_url() -> String {
    std::env::var("QDRANT_URL").unwrap_or_else(|_| "http://127.0.0.1:6334".to_string())
}

/// Default collection name (shared by all tables, partitioned by payload)
pub fn default_collection_name() -> String {
    "table_rows".to_string()
}

/// Default embedding backend kind
pub fn default_embedding_backend() -> String {
    "local".to_string()
}

/// Default embedding model (BAAI/bge-small-en-v1.5)
pub fn default_embedding_model() -> String {
    "BAAI/bge-small-en-v1.5".to_string()
}

/// Default embedding backend URL
pub fn default_embedding_backend_url() -> String {
    std::env::var("TABLERAG_EMBEDDING_BACKEND_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:7997".to_string())
}

/// Default batch size for a single embedding call
pub fn default_embedding_batch_size() -> usize {
    64
}

/// Embed rows as part of the upload job
pub fn default_embed_on_upload() -> bool {
    match std::env::var("TABLERAG_EMBED_ON_UPLOAD") {
        Ok(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"),
        Err(_) => true,
    }
}

/// Rows between progress updates while copying
pub fn default_progress_every_rows() -> usize {
    2000
}

/// Rows read from the store per embedding window
pub fn default_embed_scan_batch() -> usize {
    1000
}

/// Rows forwarded to the gateway (and upserted) per batch
pub fn default_embed_batch() -> usize {
    128
}

/// Character budget for the flattened row text
pub fn default_row_text_max_chars() -> usize {
    2000
}

/// Guardrails on by default
pub fn default_guardrails_enabled() -> bool {
    true
}

/// Keyword hits a row needs to survive the guardrail
pub fn default_guardrails_min_token_match() -> usize {
    1
}

/// Free-text column the length shortcut ranks on
pub fn default_text_column() -> String {
    "review".to_string()
}

/// Categorical column used for polarity filters
pub fn default_category_column() -> String {
    "sentiment".to_string()
}

/// Categorical values recognized in queries
pub fn default_category_values() -> Vec<String> {
    vec!["positive".to_string(), "negative".to_string()]
}

/// RRF damping constant
pub fn default_rrf_k() -> u32 {
    60
}

/// Highlight lifetime in minutes (not enforced)
pub fn default_highlight_ttl_minutes() -> u64 {
    30
}

/// Worker poll interval in seconds
pub fn default_poll_interval_secs() -> u64 {
    5
}

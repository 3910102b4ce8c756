//! tablerag: ask natural-language questions of uploaded CSV tables
//!
//! Rows are stored in SQLite, embedded into a vector index, and queried with a
//! hybrid pipeline that returns row-level citations and a viewer highlight.

pub mod commands;
pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod meta;
pub mod progress;
pub mod rank;
pub mod retrieval;
pub mod services;
pub mod store;

pub use error::{Error, Result};
pub use services::Services;

//! CLI commands implementation

pub mod ingest;
pub mod init;
pub mod jobs;
pub mod query;
pub mod tables;

pub use ingest::*;
pub use init::*;
pub use jobs::*;
pub use query::*;
pub use tables::*;

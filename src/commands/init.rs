//! Init command implementation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::meta::MetaDb;
use std::path::PathBuf;
use tracing::info;

/// Write a default config and create the metadata schema under `base_dir`
pub async fn cmd_init(base_dir: Option<PathBuf>, force: bool) -> Result<Config> {
    let mut config = Config::default();
    config.init_paths(base_dir);

    if config.paths.config_file.exists() && !force {
        return Err(Error::Config(format!(
            "Config already exists at {}. Use --force to overwrite.",
            config.paths.config_file.display()
        )));
    }

    config.save()?;
    MetaDb::new(&config.paths.db_file).await?;
    info!(base_dir = ?config.paths.base_dir, "Initialized tablerag");
    Ok(config)
}

pub fn print_init(config: &Config) {
    println!("✓ Initialized tablerag");
    println!("  Config: {}", config.paths.config_file.display());
    println!("  Database: {}", config.paths.db_file.display());
    println!("  Vector backend: {}", config.vector.backend);
    println!("  Embedding: {} ({})", config.embedding.backend, config.embedding.model);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init_creates_config_and_schema() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("home");

        let config = cmd_init(Some(base.clone()), false).await.unwrap();
        assert!(config.paths.config_file.exists());

        let loaded = Config::load(&base.join("config.toml")).unwrap();
        assert_eq!(loaded.paths.db_file, base.join("tablerag.db"));
        let db = MetaDb::connect(&loaded).await.unwrap();
        assert!(db.is_initialized().await.unwrap());

        let err = cmd_init(Some(base.clone()), false).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        cmd_init(Some(base), true).await.unwrap();
    }
}

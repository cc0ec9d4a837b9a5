//! Configuration management
//!
//! Layered loading: struct defaults, then an optional TOML file
//! (`config/logsift.toml`, overridable via `LOGSIFT_CONFIG`), then a `.env`
//! file, then environment variables with the pattern
//! `LOGSIFT__<SECTION>__<KEY>` (e.g. `LOGSIFT__ENGINE__CONCURRENCY=8`).

mod models;
mod sources;
mod validation;

pub use models::{
    Config, EngineConfig, RetrievalSettings, ScanSettings, StorageProvider, StorageSettings,
    StoreSettings,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("configuration validation failed: {0}")]
    Validation(#[from] ValidationError),
}

impl Config {
    /// Load and validate configuration from all sources.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load from a specific file path (tests and `--config` overrides).
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_validates() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.toml");
        fs::write(
            &config_path,
            r#"
[engine]
concurrency = 0
            "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::Validation(ValidationError::ZeroConcurrency))
        ));
    }

    #[test]
    fn test_load_minimal() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("ok.toml");
        fs::write(
            &config_path,
            r#"
[engine]
monitored_keywords = "panic"
            "#,
        )
        .unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.engine.keywords(), vec!["panic"]);
        assert_eq!(config.engine.concurrency, 4);
    }
}

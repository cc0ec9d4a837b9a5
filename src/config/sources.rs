use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "LOGSIFT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/logsift.toml";
const ENV_PREFIX: &str = "LOGSIFT";
const ENV_SEPARATOR: &str = "__";

/// Load configuration with priority (lowest to highest):
/// struct defaults, TOML file, `.env` entries via dotenvy, process
/// environment variables (`LOGSIFT__SECTION__KEY`).
pub fn load() -> Result<Config, ConfigError> {
    let _ = dotenvy::dotenv();

    let config_path = env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    load_from_sources(config_path)
}

/// Load from a specific path plus environment overrides. Used directly by
/// tests with throwaway config files.
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!(path = %config_path.display(), "loading configuration file");
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::debug!(
            path = %config_path.display(),
            "no configuration file, using defaults and environment overrides"
        );
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = load_from_sources(temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.engine.concurrency, 4);
        assert_eq!(config.engine.keywords(), vec!["error", "timeout"]);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("logsift.toml");

        let toml_content = r#"
[engine]
monitored_keywords = "error,timeout,deadlock"
concurrency = 2
safety_timeout_secs = 60

[scan]
batch_lines = 500
read_buffer = "128KB"

[retrieval]
max_attempts = 5
scratch_dir = "/tmp/logsift-scratch"

[storage]
provider = "memory"
        "#;
        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.engine.concurrency, 2);
        assert_eq!(config.engine.safety_timeout_secs, 60);
        assert_eq!(
            config.engine.keywords(),
            vec!["error", "timeout", "deadlock"]
        );
        assert_eq!(config.scan.batch_lines, 500);
        assert_eq!(config.scan.read_buffer.as_u64(), 128 * 1024);
        assert_eq!(config.retrieval.max_attempts, 5);
        assert_eq!(
            config.retrieval.scratch_dir,
            PathBuf::from("/tmp/logsift-scratch")
        );
        assert_eq!(
            config.storage.provider,
            super::super::models::StorageProvider::Memory
        );
    }
}

//! Server configuration

use anyhow::{Context, Result};
use automl_lib::PipelineConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming an optional configuration file
pub const CONFIG_PATH_ENV: &str = "AUTOML_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Instance name used in structured logs
    pub instance: String,

    pub port: u16,

    /// Directory holding `<dataset_id>.csv` files
    pub data_dir: PathBuf,

    /// Root of the artifact store
    pub artifact_dir: PathBuf,

    pub versions_to_keep: usize,

    /// Default per-run timeout; requests may override it
    pub training_timeout_secs: Option<u64>,

    pub pipeline: PipelineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance: std::env::var("HOSTNAME").unwrap_or_else(|_| "automl".to_string()),
            port: 8080,
            data_dir: PathBuf::from("data/datasets"),
            artifact_dir: PathBuf::from("data/artifacts"),
            versions_to_keep: 5,
            training_timeout_secs: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load from the optional config file, then `AUTOML__*` environment variables
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            builder = builder.add_source(config::File::with_name(&path));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("AUTOML")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pipeline.default_algorithms")
                    .with_list_parse_key("pipeline.identifier_patterns")
                    .with_list_parse_key("pipeline.target_candidates"),
            )
            .build()
            .context("Failed to read configuration sources")?;

        config
            .try_deserialize()
            .context("Invalid server configuration")
    }

    pub fn training_timeout(&self) -> Option<Duration> {
        self.training_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.versions_to_keep, 5);
        assert!(config.training_timeout().is_none());
        assert_eq!(config.pipeline.seed, 42);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("automl.json");
        std::fs::write(
            &path,
            r#"{"port": 9000, "training_timeout_secs": 30, "pipeline": {"seed": 7}}"#,
        )
        .unwrap();

        let config: ServerConfig = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.training_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.pipeline.seed, 7);
        assert_eq!(config.pipeline.min_rows, 10);
    }
}

//! Configuration management for the invoice risk engine

use crate::types::report::RiskLevelThresholds;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default embedding model identifier
pub const DEFAULT_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Semantic similarity strategy, resolved once when the engine is built
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SimilarityStrategy {
    /// Scan every stored embedding of the active model
    #[default]
    Exhaustive,
    /// Skip semantic search; embeddings are still persisted
    Disabled,
}

/// Persistence backend
#[derive(Debug, Clone, Deserialize, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub similarity: SimilarityConfig,
    pub detection: DetectionConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend: "memory" or "sqlite"
    pub backend: StoreBackend,
    /// SQLite database file
    pub path: String,
}

/// Embedding similarity configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Model id used when an incoming invoice carries no embedding
    pub model_name: String,
    /// "exhaustive" or "disabled"
    pub strategy: SimilarityStrategy,
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Risk score at which an invoice is logged as flagged for review
    pub review_threshold: u8,
    /// Risk level classification thresholds
    pub risk_levels: RiskLevelThresholds,
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Invoices assessed concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    pub report_interval_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file
    pub fn load() -> Result<Self> {
        Self::load_from_path("config/config.toml")
    }

    /// Load configuration from a specific path, then apply
    /// `INVOICE_GUARD__SECTION__KEY` environment overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("INVOICE_GUARD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Sqlite,
            path: "data/invoice_guard.db".to_string(),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            strategy: SimilarityStrategy::Exhaustive,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            review_threshold: 30,
            risk_levels: RiskLevelThresholds::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            report_interval_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.similarity.model_name, DEFAULT_MODEL);
        assert_eq!(config.similarity.strategy, SimilarityStrategy::Exhaustive);
        assert_eq!(config.detection.risk_levels.medium, 30);
        assert_eq!(config.detection.risk_levels.high, 70);
        assert_eq!(config.pipeline.workers, 1);
    }

    #[test]
    fn test_load_partial_file() {
        let path = std::env::temp_dir().join(format!("invoice-guard-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(
            &path,
            "[store]\nbackend = \"memory\"\n\n[similarity]\nstrategy = \"disabled\"\n",
        )
        .unwrap();

        let config = AppConfig::load_from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.similarity.strategy, SimilarityStrategy::Disabled);
        assert_eq!(config.similarity.model_name, DEFAULT_MODEL);
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load_from_path("/nonexistent/invoice-guard.toml").is_err());
    }
}

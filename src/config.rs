//! Configuration management for the fraud scoring service

use crate::explain::lime::{LimeSettings, DEFAULT_NUM_SAMPLES};
use crate::models::forest::ForestParams;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub explain: ExplainConfig,
    pub training: TrainingConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

/// HTTP listener configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Model artifacts configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Serialized classifier pipeline
    pub artifact_path: PathBuf,
    /// Original-space background rows for LIME
    pub reference_sample_path: PathBuf,
    /// Version string stamped on newly trained artifacts
    pub model_version: String,
    /// Positional name count used when the forest width is unknown
    pub fallback_feature_width: usize,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("model/model.json"),
            reference_sample_path: PathBuf::from("model/train_sample.csv"),
            model_version: "1.0.0".to_string(),
            fallback_feature_width: 64,
        }
    }
}

/// Explanation defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// `top_k` used when the query omits it
    pub default_top_k: usize,
    pub lime_num_samples: usize,
    pub lime_kernel_width: Option<f64>,
    /// Fixing the seed makes LIME explanations repeatable
    pub lime_random_seed: Option<u64>,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            lime_num_samples: DEFAULT_NUM_SAMPLES,
            lime_kernel_width: None,
            lime_random_seed: None,
        }
    }
}

impl ExplainConfig {
    pub fn lime_settings(&self) -> LimeSettings {
        LimeSettings {
            num_samples: self.lime_num_samples,
            kernel_width: self.lime_kernel_width,
            random_seed: self.lime_random_seed,
        }
    }
}

/// Data generation and training configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Labeled dataset, generated when missing
    pub data_path: PathBuf,
    /// Directory receiving model.json, feature_names.json, metrics.json and
    /// train_sample.csv
    pub output_dir: PathBuf,
    pub n_rows: usize,
    pub seed: u64,
    /// Held-out fraction for evaluation
    pub test_size: f64,
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Rows written to the reference sample
    pub reference_sample_size: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/transactions.csv"),
            output_dir: PathBuf::from("model"),
            n_rows: 12_000,
            seed: 42,
            test_size: 0.2,
            n_estimators: 250,
            max_depth: None,
            min_samples_split: 4,
            reference_sample_size: 1000,
        }
    }
}

impl TrainingConfig {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            max_features: None,
            seed: self.seed,
        }
    }
}

/// Periodic metrics reporting
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Seconds between summaries; 0 disables the reporter
    pub report_interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            report_interval_secs: 60,
        }
    }
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

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load `config/config.toml` when present, then `FRAUD__*` overrides
    pub fn load() -> Result<Self> {
        Self::build(File::with_name("config/config.toml").required(false))
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::build(File::from(path.as_ref()))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("FRAUD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

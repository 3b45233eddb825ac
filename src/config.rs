//! Configuration management for the scoring pipeline

use anyhow::{bail, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub models: ModelsConfig,
    pub ensemble: EnsembleConfig,
    pub post_filter: PostFilterConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub store: StoreConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming session envelopes
    pub session_subject: String,
    /// Subject for outgoing threat alerts
    pub alert_subject: String,
}

/// Model artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// Version tag reported on every verdict
    #[serde(default = "default_version_id")]
    pub version_id: String,
    /// Path to the gradient-boosted tree ONNX artifact
    pub xgb_artifact: String,
    /// Path to the sequence model ONNX artifact
    pub lstm_artifact: String,
    /// Event window length fed to the sequence model
    #[serde(default = "default_sequence_window")]
    pub sequence_window: usize,
    /// Number of threads for ONNX inference per model (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
    /// Deadline for a single model scoring call, in milliseconds
    #[serde(default = "default_scorer_timeout_ms")]
    pub scorer_timeout_ms: u64,
}

fn default_version_id() -> String {
    "v1".to_string()
}

fn default_sequence_window() -> usize {
    50
}

fn default_onnx_threads() -> usize {
    1
}

fn default_scorer_timeout_ms() -> u64 {
    250
}

/// Ensemble fusion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Tree model weight
    #[serde(default = "default_xgb_weight")]
    pub xgb_weight: f64,
    /// Sequence model weight
    #[serde(default = "default_lstm_weight")]
    pub lstm_weight: f64,
    /// Fused score at or above this value raises an alert
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_xgb_weight() -> f64 {
    0.6
}

fn default_lstm_weight() -> f64 {
    0.4
}

fn default_threshold() -> f64 {
    0.5
}

impl EnsembleConfig {
    /// Weights must sum to 1.0 and the threshold must be a probability.
    pub fn validate(&self) -> Result<()> {
        let total = self.xgb_weight + self.lstm_weight;
        if (total - 1.0).abs() > 0.01 {
            bail!("ensemble weights must sum to 1.0, got {total}");
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            bail!("decision threshold must be in [0, 1], got {}", self.threshold);
        }
        Ok(())
    }
}

/// Post-filter rule parameters
#[derive(Debug, Clone, Deserialize)]
pub struct PostFilterConfig {
    /// Sessions shorter than this are demoted as known-benign
    #[serde(default = "default_min_duration_secs")]
    pub min_duration_secs: i64,
    /// Action sequences treated as benign (exact or prefix match)
    #[serde(default = "default_benign_patterns")]
    pub benign_patterns: Vec<Vec<String>>,
}

fn default_min_duration_secs() -> i64 {
    10
}

fn default_benign_patterns() -> Vec<Vec<String>> {
    vec![vec!["login".to_string(), "logout".to_string()]]
}

/// Verdict cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    300
}

/// Per-client admission quota
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Window length in seconds
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,
    /// Admissions allowed per client per window
    #[serde(default = "default_rate_max_requests")]
    pub max_requests: u32,
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_rate_max_requests() -> u32 {
    100
}

/// Prediction store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/predictions.db".to_string()
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Number of concurrently processed requests in the service loop
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    4
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let app_config: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        app_config.ensemble.validate()?;

        Ok(app_config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                session_subject: "sessions".to_string(),
                alert_subject: "threat.alerts".to_string(),
            },
            models: ModelsConfig {
                version_id: default_version_id(),
                xgb_artifact: "models/xgboost.onnx".to_string(),
                lstm_artifact: "models/lstm.onnx".to_string(),
                sequence_window: default_sequence_window(),
                onnx_threads: default_onnx_threads(),
                scorer_timeout_ms: default_scorer_timeout_ms(),
            },
            ensemble: EnsembleConfig {
                xgb_weight: default_xgb_weight(),
                lstm_weight: default_lstm_weight(),
                threshold: default_threshold(),
            },
            post_filter: PostFilterConfig {
                min_duration_secs: default_min_duration_secs(),
                benign_patterns: default_benign_patterns(),
            },
            cache: CacheConfig {
                ttl_secs: default_cache_ttl_secs(),
            },
            rate_limit: RateLimitConfig {
                window_secs: default_rate_window_secs(),
                max_requests: default_rate_max_requests(),
            },
            store: StoreConfig {
                path: default_store_path(),
            },
            pipeline: PipelineConfig {
                workers: default_workers(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.ensemble.xgb_weight, 0.6);
        assert_eq!(config.ensemble.lstm_weight, 0.4);
        assert_eq!(config.ensemble.threshold, 0.5);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.models.sequence_window, 50);
    }

    #[test]
    fn test_default_weights_validate() {
        let config = AppConfig::default();
        assert!(config.ensemble.validate().is_ok());
    }

    #[test]
    fn test_unbalanced_weights_rejected() {
        let ensemble = EnsembleConfig {
            xgb_weight: 0.8,
            lstm_weight: 0.4,
            threshold: 0.5,
        };
        assert!(ensemble.validate().is_err());
    }

    #[test]
    fn test_out_of_range_threshold_rejected() {
        let ensemble = EnsembleConfig {
            xgb_weight: 0.6,
            lstm_weight: 0.4,
            threshold: 1.5,
        };
        assert!(ensemble.validate().is_err());
    }
}

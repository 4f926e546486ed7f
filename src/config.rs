//! Configuration for the SmartSync inference service.

use crate::registry::ModelEntry;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Logical name of the schedule model deployed by the training pipeline.
pub const DEFAULT_MODEL_NAME: &str = "schedule_predictor";

/// Main configuration for the inference service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logical model name; the scaler is resolved under the same name
    pub model_name: String,

    /// How long a loaded model or scaler stays in the registry cache
    #[serde(with = "duration_serde")]
    pub cache_ttl: Duration,

    /// End-to-end bound on a single prediction
    #[serde(with = "duration_serde")]
    pub inference_timeout: Duration,

    /// IANA zone used for hour-of-day and weekday features
    pub timezone: String,

    /// Path for storing state and statistics
    pub data_path: PathBuf,

    /// Local dataset snapshot used by the CLI
    pub dataset_path: PathBuf,

    /// Scheduled anomaly scan settings
    pub anomaly: AnomalyConfig,

    /// Port for the prediction entrypoint (0 for random)
    pub server_port: u16,

    /// Push notification gateway
    pub push: PushConfig,

    /// Model configuration document: logical name to artifact locations
    pub models: HashMap<String, ModelEntry>,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smartsync-inference");

        let artifact_dir = data_dir.join("models").join(DEFAULT_MODEL_NAME);
        let mut models = HashMap::new();
        models.insert(
            DEFAULT_MODEL_NAME.to_string(),
            ModelEntry {
                current_version: "v1".to_string(),
                format: "json".to_string(),
                model_url: artifact_dir.join("model.json").display().to_string(),
                scaler_url: artifact_dir.join("scaler.json").display().to_string(),
                deployed: true,
            },
        );

        Self {
            model_name: DEFAULT_MODEL_NAME.to_string(),
            cache_ttl: Duration::from_secs(60 * 60),
            inference_timeout: Duration::from_secs(5 * 60),
            timezone: "UTC".to_string(),
            dataset_path: data_dir.join("dataset.json"),
            data_path: data_dir,
            anomaly: AnomalyConfig::default(),
            server_port: 8787,
            push: PushConfig::default(),
            models,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.time_zone()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(&config_path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("smartsync-inference")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// Parse the configured time zone.
    pub fn time_zone(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimeZone(self.timezone.clone()))
    }
}

/// Settings for the timer-triggered anomaly scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// Time between scheduled scans
    #[serde(with = "duration_serde")]
    pub scan_interval: Duration,

    /// Upper bound on users processed per run
    pub max_users_per_run: usize,

    /// Users scanned concurrently
    pub concurrency: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(6 * 60 * 60),
            max_users_per_run: 100,
            concurrency: 4,
        }
    }
}

/// Push gateway endpoint. With no endpoint, notifications are only logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PushConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Unknown time zone: {0}")]
    InvalidTimeZone(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.cache_ttl, Duration::from_secs(3600));
        assert_eq!(config.anomaly.max_users_per_run, 100);
        assert_eq!(config.anomaly.scan_interval, Duration::from_secs(21_600));
        assert!(config.models.contains_key(DEFAULT_MODEL_NAME));
        assert_eq!(config.time_zone().unwrap(), chrono_tz::UTC);
    }

    #[test]
    fn test_durations_serialize_as_seconds() {
        let config = Config::default();
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["cache_ttl"], 3600);
        assert_eq!(json["anomaly"]["scan_interval"], 21_600);

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(back.inference_timeout, config.inference_timeout);
    }

    #[test]
    fn test_invalid_time_zone() {
        let config = Config {
            timezone: "Mars/Olympus".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.time_zone(),
            Err(ConfigError::InvalidTimeZone(_))
        ));
    }
}

//! Runtime configuration.
//!
//! ```yaml
//! pipeline:
//!   pass_threshold: 7.0
//!   max_revisions: 2
//! model:
//!   name: claude-sonnet-4-5-20250514
//!   max_tokens: 2048
//! stages:
//!   composition_temperature: 0.2
//!   review_temperature: 0.3
//! timeouts:
//!   model: 30s
//!   retrieval: 10s
//! retry:
//!   max_retries: 3
//!   min_delay: 250ms
//!   max_delay: 8s
//! provider:
//!   type: anthropic
//!   settings: {}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use attest_core::{PipelineSettings, SettingsError};

use crate::providers::DEFAULT_MODEL;
use crate::resilience::RetryPolicy;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid pipeline settings: {0}")]
    Pipeline(#[from] SettingsError),

    #[error("Invalid config '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Durations written as "30s", "250ms", "2m".
pub(crate) mod duration_text {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub name: String,
    pub max_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_MODEL.to_string(),
            max_tokens: 2048,
        }
    }
}

/// Sampling temperatures. Extraction and verification are fixed at 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StageConfig {
    pub composition_temperature: f32,
    pub review_temperature: f32,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            composition_temperature: 0.2,
            review_temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TimeoutConfig {
    /// Per model call, per attempt
    #[serde(with = "duration_text")]
    pub model: Duration,

    /// Per chunk store search, per attempt
    #[serde(with = "duration_text")]
    pub retrieval: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            model: Duration::from_secs(30),
            retrieval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(rename = "type")]
    pub provider_type: String,

    /// Passed to the provider factory as-is
    #[serde(default)]
    pub settings: JsonValue,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: "anthropic".to_string(),
            settings: JsonValue::Object(Default::default()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub pipeline: PipelineSettings,
    pub model: ModelConfig,
    pub stages: StageConfig,
    pub timeouts: TimeoutConfig,
    pub retry: RetryPolicy,
    pub provider: ProviderConfig,
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;

        if self.model.name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "model.name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.model.max_tokens == 0 {
            return Err(ConfigError::Invalid {
                field: "model.max_tokens",
                reason: "must be at least 1".to_string(),
            });
        }
        for (field, value) in [
            ("stages.composition_temperature", self.stages.composition_temperature),
            ("stages.review_temperature", self.stages.review_temperature),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{} is outside 0-1", value),
                });
            }
        }
        if self.timeouts.model.is_zero() || self.timeouts.retrieval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "timeouts",
                reason: "timeouts must be non-zero".to_string(),
            });
        }
        if self.retry.min_delay > self.retry.max_delay {
            return Err(ConfigError::Invalid {
                field: "retry",
                reason: "min_delay exceeds max_delay".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_is_all_defaults() {
        let config = RuntimeConfig::from_yaml("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.timeouts.model, Duration::from_secs(30));
        assert_eq!(config.provider.provider_type, "anthropic");
    }

    #[test]
    fn test_full_yaml() {
        let yaml = r#"
pipeline:
  pass_threshold: 8.0
  max_revisions: 1
  redact_audit: true
model:
  name: claude-haiku-4-5
timeouts:
  model: 45s
  retrieval: 500ms
retry:
  max_retries: 1
provider:
  type: anthropic
  settings:
    base_url: https://proxy.internal/v1
"#;
        let config = RuntimeConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.pipeline.pass_threshold, 8.0);
        assert!(config.pipeline.redact_audit);
        assert_eq!(config.model.name, "claude-haiku-4-5");
        assert_eq!(config.model.max_tokens, 2048);
        assert_eq!(config.timeouts.model, Duration::from_secs(45));
        assert_eq!(config.timeouts.retrieval, Duration::from_millis(500));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.provider.settings["base_url"], "https://proxy.internal/v1");
    }

    #[test]
    fn test_json_config() {
        let config = RuntimeConfig::from_json(r#"{"stages": {"review_temperature": 0.5}}"#).unwrap();
        assert_eq!(config.stages.review_temperature, 0.5);
        assert_eq!(config.stages.composition_temperature, 0.2);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            RuntimeConfig::from_yaml("pipeline:\n  top_k: 0\n"),
            Err(ConfigError::Pipeline(_))
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("stages:\n  review_temperature: 1.5\n"),
            Err(ConfigError::Invalid { field: "stages.review_temperature", .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("timeouts:\n  model: 0s\n"),
            Err(ConfigError::Invalid { field: "timeouts", .. })
        ));
        assert!(matches!(
            RuntimeConfig::from_yaml("timeouts:\n  model: soon\n"),
            Err(ConfigError::YamlError(_))
        ));
    }

    #[test]
    fn test_durations_serialize_as_text() {
        let yaml = serde_yaml::to_string(&RuntimeConfig::default()).unwrap();
        assert!(yaml.contains("model: 30s"));
        assert!(yaml.contains("min_delay: 250ms"));
    }
}

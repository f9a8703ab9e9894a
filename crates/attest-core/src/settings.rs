//! Pipeline settings, loaded from YAML or JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::quality::{DEFAULT_PASS_THRESHOLD, MAX_SCORE, MIN_SCORE};
use crate::retrieval::{DEFAULT_OVERFETCH_FACTOR, DEFAULT_SIMILARITY_THRESHOLD, DEFAULT_TOP_K};
use crate::verification::RejectionPriority;

pub const DEFAULT_MAX_REVISIONS: u32 = 2;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSettings {
    /// Minimum overall review score to pass
    pub pass_threshold: f64,

    /// Recompositions allowed after the first attempt
    pub max_revisions: u32,

    /// Chunks kept per source type
    pub top_k: usize,

    /// Minimum similarity for a chunk to be kept
    pub similarity_threshold: f64,

    /// Candidates fetched per kept chunk, before thresholding
    pub overfetch_factor: usize,

    pub rejection_priority: RejectionPriority,

    /// Strip free text from audit records
    pub redact_audit: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pass_threshold: DEFAULT_PASS_THRESHOLD,
            max_revisions: DEFAULT_MAX_REVISIONS,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            rejection_priority: RejectionPriority::default(),
            redact_audit: false,
        }
    }
}

impl PipelineSettings {
    pub fn from_yaml(yaml: &str) -> Result<Self, SettingsError> {
        let settings: PipelineSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: PipelineSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a file; `.json` is parsed as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json(&contents)
        } else {
            Self::from_yaml(&contents)
        }
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(MIN_SCORE..=MAX_SCORE).contains(&self.pass_threshold) {
            return Err(SettingsError::Invalid {
                field: "pass_threshold",
                reason: format!("{} is outside 0-10", self.pass_threshold),
            });
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SettingsError::Invalid {
                field: "similarity_threshold",
                reason: format!("{} is outside 0-1", self.similarity_threshold),
            });
        }
        if self.top_k == 0 {
            return Err(SettingsError::Invalid {
                field: "top_k",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.overfetch_factor == 0 {
            return Err(SettingsError::Invalid {
                field: "overfetch_factor",
                reason: "must be at least 1".to_string(),
            });
        }
        self.rejection_priority
            .validate()
            .map_err(|e| SettingsError::Invalid {
                field: "rejection_priority",
                reason: e.to_string(),
            })?;

        Ok(())
    }
}

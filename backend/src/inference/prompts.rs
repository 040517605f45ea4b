use serde::{Deserialize, Serialize};
use shared::{Severity, Urgency};
use std::path::Path;

use crate::config::ConfigError;

const DEFAULT_PROMPTS: &str = include_str!("../../config/prompts.yaml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub version: f32,
    pub detection: DetectionPrompt,
    pub advice: AdvicePrompt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionPrompt {
    pub max_tokens: u32,
    pub system: String,
    pub user: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvicePrompt {
    pub max_tokens: u32,
    pub system: String,
    pub user: String,
    pub fallback: String,
}

impl PromptConfig {
    /// Reads prompts from `path` when given, otherwise from the copy compiled into the binary.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let source = std::fs::read_to_string(path).map_err(|e| {
                    ConfigError::Prompts(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_yaml(&source)?
            }
            None => Self::from_yaml(DEFAULT_PROMPTS)?,
        };
        Ok(config)
    }

    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: PromptConfig =
            serde_yaml::from_str(source).map_err(|e| ConfigError::Prompts(e.to_string()))?;
        if config.detection.system.trim().is_empty() || config.advice.system.trim().is_empty() {
            return Err(ConfigError::Prompts("system prompts must not be empty".into()));
        }
        Ok(config)
    }

    pub fn detection_system(&self) -> String {
        self.detection
            .system
            .replace("{severity_choices}", &Severity::choices())
            .replace("{urgency_choices}", &Urgency::choices())
    }

    pub fn advice_user(&self, crop: &str, issue: &str) -> String {
        self.advice.user.replace("{crop}", crop).replace("{issue}", issue)
    }
}

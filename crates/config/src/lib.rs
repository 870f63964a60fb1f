//! Configuration loading, validation, and management for carepod.
//!
//! Loads configuration from a TOML file with environment variable overrides
//! for secrets. Every tunable constant in the pipeline lives here: the
//! escalation threshold, retrieval weights and budgets, memory retention,
//! and the completion-service endpoint. None of these values carry clinical
//! provenance; they are deployment knobs, adjustable without code changes.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Triage scoring and escalation settings
    #[serde(default)]
    pub triage: TriageConfig,

    /// Hybrid retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Memory store settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Turn pipeline settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Completion service settings
    #[serde(default)]
    pub completion: CompletionConfig,
}

/// Triage scoring and escalation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Score at or above which escalation is raised
    #[serde(default = "default_escalation_threshold")]
    pub escalation_threshold: u8,

    /// Handoff notification attempts before the hard alert
    #[serde(default = "default_notify_attempts")]
    pub notify_max_attempts: u32,

    /// Initial backoff between handoff attempts, in milliseconds
    #[serde(default = "default_notify_backoff_ms")]
    pub notify_backoff_ms: u64,
}

fn default_escalation_threshold() -> u8 {
    7
}
fn default_notify_attempts() -> u32 {
    4
}
fn default_notify_backoff_ms() -> u64 {
    100
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            escalation_threshold: default_escalation_threshold(),
            notify_max_attempts: default_notify_attempts(),
            notify_backoff_ms: default_notify_backoff_ms(),
        }
    }
}

/// Hybrid retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum chunks returned per turn
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Weight of the vector-similarity candidate score
    #[serde(default = "default_weight")]
    pub vector_weight: f32,

    /// Weight of the rule-based candidate score
    #[serde(default = "default_weight")]
    pub rules_weight: f32,

    /// Weight of the personalization adjustment
    #[serde(default = "default_weight")]
    pub personalization_weight: f32,

    /// Candidates scoring below this floor are dropped; an empty result is
    /// a valid outcome, not an error
    #[serde(default = "default_relevance_floor")]
    pub relevance_floor: f32,

    /// Per-step retrieval budget inside a turn, in milliseconds
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,
}

fn default_top_k() -> usize {
    5
}
fn default_weight() -> f32 {
    1.0
}
fn default_relevance_floor() -> f32 {
    0.05
}
fn default_step_timeout_ms() -> u64 {
    800
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            vector_weight: default_weight(),
            rules_weight: default_weight(),
            personalization_weight: default_weight(),
            relevance_floor: default_relevance_floor(),
            step_timeout_ms: default_step_timeout_ms(),
        }
    }
}

/// Memory store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Episodic entries older than this are pruned
    #[serde(default = "default_retention_days")]
    pub episodic_retention_days: i64,

    /// Cap on working-memory turns kept per session
    #[serde(default = "default_working_cap")]
    pub working_turn_cap: usize,
}

fn default_retention_days() -> i64 {
    180
}
fn default_working_cap() -> usize {
    64
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            episodic_retention_days: default_retention_days(),
            working_turn_cap: default_working_cap(),
        }
    }
}

/// Turn pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Budget for the feature-extraction completion call, in milliseconds
    #[serde(default = "default_extraction_timeout_ms")]
    pub extraction_timeout_ms: u64,

    /// Conversation rows loaded as context per turn
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_extraction_timeout_ms() -> u64 {
    2000
}
fn default_history_limit() -> usize {
    10
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extraction_timeout_ms: default_extraction_timeout_ms(),
            history_limit: default_history_limit(),
        }
    }
}

/// Completion service endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// OpenAI-compatible base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with each request
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; prefer the CAREPOD_API_KEY env var over the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
        }
    }
}

impl std::fmt::Debug for CompletionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus env overrides; used when no config file exists.
    pub fn from_env() -> Self {
        let mut config = AppConfig::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("CAREPOD_API_KEY") {
            if !key.is_empty() {
                self.completion.api_key = Some(key);
            }
        }
        if let Ok(url) = std::env::var("CAREPOD_COMPLETION_URL") {
            if !url.is_empty() {
                self.completion.base_url = url;
            }
        }
    }

    /// Validate all settings. Called at startup so misconfiguration fails
    /// fast instead of mid-turn.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.triage.escalation_threshold > 10 {
            return Err(ConfigError::Invalid(format!(
                "triage.escalation_threshold must be 0..=10, got {}",
                self.triage.escalation_threshold
            )));
        }
        if self.triage.notify_max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "triage.notify_max_attempts must be at least 1".into(),
            ));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid(
                "retrieval.top_k must be at least 1".into(),
            ));
        }
        let weights = [
            self.retrieval.vector_weight,
            self.retrieval.rules_weight,
            self.retrieval.personalization_weight,
        ];
        if weights.iter().any(|w| *w < 0.0) || weights.iter().all(|w| *w == 0.0) {
            return Err(ConfigError::Invalid(
                "retrieval weights must be non-negative and not all zero".into(),
            ));
        }
        if self.memory.episodic_retention_days <= 0 {
            return Err(ConfigError::Invalid(
                "memory.episodic_retention_days must be positive".into(),
            ));
        }
        if self.engine.extraction_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.extraction_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.triage.escalation_threshold, 7);
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.memory.episodic_retention_days, 180);
        assert_eq!(config.engine.extraction_timeout_ms, 2000);
    }

    #[test]
    fn parse_partial_toml() {
        let raw = r#"
            [triage]
            escalation_threshold = 8

            [retrieval]
            top_k = 3
            vector_weight = 2.0
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.triage.escalation_threshold, 8);
        assert_eq!(config.retrieval.top_k, 3);
        assert!((config.retrieval.vector_weight - 2.0).abs() < f32::EPSILON);
        // Unspecified sections keep their defaults
        assert_eq!(config.memory.working_turn_cap, 64);
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let config = AppConfig {
            triage: TriageConfig {
                escalation_threshold: 11,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_top_k() {
        let config = AppConfig {
            retrieval: RetrievalConfig {
                top_k: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_all_zero_weights() {
        let config = AppConfig {
            retrieval: RetrievalConfig {
                vector_weight: 0.0,
                rules_weight: 0.0,
                personalization_weight: 0.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_redacted_in_debug() {
        let config = CompletionConfig {
            api_key: Some("sk-secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("REDACTED"));
    }
}

//! CompletionService trait: the abstraction over the external
//! text-completion backend.
//!
//! The engine uses it for intake feature extraction and for synthesizing the
//! conversational reply. The service is injected as a capability; prompt
//! selection is a closed enum of turn intents rather than string-keyed
//! dispatch, so every call site is checked at compile time.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// The closed set of purposes a completion call can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnIntent {
    /// Extract a structured symptom feature set from a raw utterance
    ExtractFeatures,
    /// Produce the empathetic intake reply shown to the patient
    IntakeReply,
    /// Optionally synthesize an answer grounded in retrieved knowledge
    SynthesizeAnswer,
}

impl std::fmt::Display for TurnIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ExtractFeatures => "extract_features",
            Self::IntakeReply => "intake_reply",
            Self::SynthesizeAnswer => "synthesize_answer",
        };
        write!(f, "{s}")
    }
}

/// A request to the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// What this call is for; implementations may route on it
    pub intent: TurnIntent,

    /// The fully rendered prompt
    pub prompt: String,

    /// Temperature (0.0 = deterministic)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.2
}

impl CompletionRequest {
    pub fn new(intent: TurnIntent, prompt: impl Into<String>) -> Self {
        Self {
            intent,
            prompt: prompt.into(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }
}

/// A completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// The generated text
    pub text: String,

    /// Which model produced it
    pub model: String,
}

/// The core CompletionService trait.
///
/// Implementations: OpenAI-compatible HTTP endpoints, scripted mocks for
/// tests. The orchestrator calls `complete()` under its own timeout budget
/// and treats `Timeout` as a signal to degrade, never as a turn abort.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// A human-readable name for this service (e.g. "openai", "scripted").
    fn name(&self) -> &str;

    /// Send a prompt and get the generated text back.
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let req = CompletionRequest::new(TurnIntent::ExtractFeatures, "extract symptoms");
        assert!((req.temperature - 0.2).abs() < f32::EPSILON);
        assert!(req.max_tokens.is_none());
    }

    #[test]
    fn intent_serializes_snake_case() {
        let json = serde_json::to_string(&TurnIntent::ExtractFeatures).unwrap();
        assert_eq!(json, "\"extract_features\"");
    }
}

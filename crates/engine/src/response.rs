//! The Turn API: the request/response contract consumed by the chat
//! transport, which lives outside this repository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use carepod_core::knowledge::ScoredChunk;
use carepod_core::patient::PatientId;
use carepod_core::triage::TriageResult;
use carepod_triage::EscalationAdvice;

/// One incoming patient turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub patient_id: PatientId,
    pub utterance: String,

    /// Opaque transport context, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_context: Option<serde_json::Value>,
}

impl TurnRequest {
    pub fn new(patient_id: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            patient_id: PatientId::new(patient_id),
            utterance: utterance.into(),
            turn_context: None,
        }
    }
}

/// One retrieved guidance item, flattened for the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub text: String,
    pub source: String,
    pub score: f32,
}

impl From<ScoredChunk> for KnowledgeItem {
    fn from(scored: ScoredChunk) -> Self {
        Self {
            id: scored.chunk.id,
            text: scored.chunk.text,
            source: scored.chunk.metadata.source,
            score: scored.score,
        }
    }
}

/// The structured response for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    /// Conversational reply shown to the patient
    pub agent_response: String,

    pub triage: TriageResult,

    pub escalation: EscalationAdvice,

    /// Ranked guidance; empty when nothing cleared the relevance floor
    pub knowledge: Vec<KnowledgeItem>,

    /// Suggested follow-up questions for the next turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub follow_up_questions: Vec<String>,

    /// True when the turn ran without the completion service
    pub degraded: bool,

    pub timestamp: DateTime<Utc>,
}

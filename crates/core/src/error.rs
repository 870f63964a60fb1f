//! Error types for the carepod domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant. Recoverable errors
//! (extraction timeout, retrieval unavailability, merge conflicts) are
//! handled component-locally and never abort a turn; only escalation
//! exhaustion and persistence unreachability surface to the caller.

use thiserror::Error;

/// The top-level error type for all carepod operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Completion service errors ---
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    // --- Feature extraction errors ---
    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    // --- Retrieval errors ---
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    // --- Escalation errors ---
    #[error("Escalation error: {0}")]
    Escalation(#[from] EscalationError),

    // --- Memory store errors ---
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    // --- Persistence errors ---
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures of the external text-completion service.
#[derive(Debug, Clone, Error)]
pub enum CompletionError {
    #[error("Completion timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    #[error("Completion service failed: {message} (status: {status_code})")]
    Service { status_code: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid completion payload: {0}")]
    InvalidResponse(String),
}

/// Failures while turning an utterance into a structured feature set.
///
/// Both variants are recoverable: the orchestrator degrades to the
/// raw-utterance keyword path instead of aborting the turn.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    #[error("Feature extraction timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    #[error("Malformed feature set from extraction: {0}")]
    InvalidFeatureSet(String),
}

/// Failures of the knowledge retrieval path.
///
/// Recoverable: the orchestrator returns an empty knowledge set and the
/// escalation check proceeds unaffected.
#[derive(Debug, Clone, Error)]
pub enum RetrievalError {
    #[error("Knowledge index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Retrieval timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },
}

/// Failures of the escalation state machine.
#[derive(Debug, Clone, Error)]
pub enum EscalationError {
    #[error("Invalid escalation transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Handoff channel unavailable after {attempts} attempts")]
    ChannelUnavailable { attempts: u32 },
}

/// Failures of the layered memory store.
#[derive(Debug, Clone, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Commit conflict for identity {identity} (retries exhausted)")]
    CommitConflict { identity: String },
}

/// Failures of the relational persistence boundary.
#[derive(Debug, Clone, Error)]
pub enum PersistenceError {
    #[error("Persistence unreachable: {0}")]
    Unreachable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

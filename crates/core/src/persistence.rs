//! The relational persistence boundary.
//!
//! The core never issues raw queries; it speaks this narrow, typed
//! interface. Implementations (SQLite, in-memory) live in
//! `carepod-persistence`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PersistenceError;
use crate::patient::{PatientId, PatientSession};

/// One append-only conversation row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationRow {
    pub turn_id: Uuid,
    pub session_id: Uuid,
    pub patient_id: PatientId,
    pub utterance: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_score: Option<u8>,
    pub created_at: DateTime<Utc>,
}

/// Typed CRUD over sessions and conversation rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// The store name (e.g. "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Open a new active session for the identity.
    ///
    /// Enforces the one-active-session invariant by closing any prior
    /// active session for the same identity first.
    async fn create_session(
        &self,
        patient_id: &PatientId,
    ) -> std::result::Result<PatientSession, PersistenceError>;

    /// Append one conversation row. Rows are never updated or deleted.
    async fn append_turn(&self, row: ConversationRow)
        -> std::result::Result<(), PersistenceError>;

    /// Load the most recent conversation rows for an identity, newest first.
    async fn load_history(
        &self,
        patient_id: &PatientId,
        limit: usize,
    ) -> std::result::Result<Vec<ConversationRow>, PersistenceError>;

    /// Mark a session closed.
    async fn close_session(&self, session_id: Uuid)
        -> std::result::Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_row_serialization() {
        let row = ConversationRow {
            turn_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            patient_id: PatientId::from("p-1"),
            utterance: "my head hurts".into(),
            response: "How long has the headache lasted?".into(),
            urgency_score: Some(3),
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&row).unwrap();
        assert!(json.contains("my head hurts"));
        let back: ConversationRow = serde_json::from_str(&json).unwrap();
        assert_eq!(back.urgency_score, Some(3));
    }
}

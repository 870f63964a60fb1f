//! In-memory session store for tests and ephemeral deployments.

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use carepod_core::error::PersistenceError;
use carepod_core::patient::{PatientId, PatientSession, SessionStatus};
use carepod_core::persistence::{ConversationRow, SessionStore};

/// Sessions and conversation rows in process memory.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<Vec<PatientSession>>,
    rows: RwLock<Vec<ConversationRow>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active session for an identity, if one exists.
    pub async fn active_session(&self, patient_id: &PatientId) -> Option<PatientSession> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.patient_id == *patient_id && s.status == SessionStatus::Active)
            .cloned()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(
        &self,
        patient_id: &PatientId,
    ) -> Result<PatientSession, PersistenceError> {
        let mut sessions = self.sessions.write().await;
        // One active session per identity: close any prior one.
        for session in sessions.iter_mut() {
            if session.patient_id == *patient_id && session.status == SessionStatus::Active {
                session.status = SessionStatus::Closed;
            }
        }
        let session = PatientSession::new(patient_id.clone());
        sessions.push(session.clone());
        Ok(session)
    }

    async fn append_turn(&self, row: ConversationRow) -> Result<(), PersistenceError> {
        self.rows.write().await.push(row);
        Ok(())
    }

    async fn load_history(
        &self,
        patient_id: &PatientId,
        limit: usize,
    ) -> Result<Vec<ConversationRow>, PersistenceError> {
        let rows = self.rows.read().await;
        let mut history: Vec<ConversationRow> = rows
            .iter()
            .filter(|r| r.patient_id == *patient_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        history.truncate(limit);
        Ok(history)
    }

    async fn close_session(&self, session_id: Uuid) -> Result<(), PersistenceError> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| PersistenceError::SessionNotFound(session_id.to_string()))?;
        session.status = SessionStatus::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(patient: &str, utterance: &str) -> ConversationRow {
        ConversationRow {
            turn_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            patient_id: PatientId::from(patient),
            utterance: utterance.into(),
            response: "ok".into(),
            urgency_score: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_session_closes_prior_active() {
        let store = InMemorySessionStore::new();
        let id = PatientId::from("p-1");

        let first = store.create_session(&id).await.unwrap();
        let second = store.create_session(&id).await.unwrap();

        let active = store.active_session(&id).await.unwrap();
        assert_eq!(active.session_id, second.session_id);
        assert_ne!(first.session_id, second.session_id);
    }

    #[tokio::test]
    async fn history_is_per_patient_and_bounded() {
        let store = InMemorySessionStore::new();
        for i in 0..5 {
            store
                .append_turn(row("p-1", &format!("utterance {i}")))
                .await
                .unwrap();
        }
        store.append_turn(row("p-2", "other patient")).await.unwrap();

        let history = store
            .load_history(&PatientId::from("p-1"), 3)
            .await
            .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| r.patient_id.as_str() == "p-1"));
    }

    #[tokio::test]
    async fn close_unknown_session_errors() {
        let store = InMemorySessionStore::new();
        let err = store.close_session(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PersistenceError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn close_session_marks_closed() {
        let store = InMemorySessionStore::new();
        let id = PatientId::from("p-1");
        let session = store.create_session(&id).await.unwrap();

        store.close_session(session.session_id).await.unwrap();
        assert!(store.active_session(&id).await.is_none());
    }
}

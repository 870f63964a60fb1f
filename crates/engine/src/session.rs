//! Session lifecycle and per-patient escalation machines.
//!
//! Escalation state outlives individual turns and sessions: a pending case
//! stays pending across a reconnect, and only a resolved machine resets to
//! none when a new session starts.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use carepod_core::error::{EscalationError, PersistenceError};
use carepod_core::patient::{PatientId, PatientSession};
use carepod_core::persistence::SessionStore;
use carepod_core::triage::EscalationState;
use carepod_memory::MemoryStore;
use carepod_triage::EscalationMachine;

/// Tracks active sessions and owns each patient's escalation machine.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    memory: Arc<MemoryStore>,
    machines: RwLock<HashMap<PatientId, Arc<Mutex<EscalationMachine>>>>,
    active: RwLock<HashMap<PatientId, Uuid>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>, memory: Arc<MemoryStore>) -> Self {
        Self {
            store,
            memory,
            machines: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
        }
    }

    /// The escalation machine for an identity, created lazily.
    pub async fn machine(&self, patient_id: &PatientId) -> Arc<Mutex<EscalationMachine>> {
        {
            let machines = self.machines.read().await;
            if let Some(machine) = machines.get(patient_id) {
                return machine.clone();
            }
        }
        let mut machines = self.machines.write().await;
        machines
            .entry(patient_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(EscalationMachine::new())))
            .clone()
    }

    /// The active session for an identity, opening one if needed.
    ///
    /// Opening a session resets a resolved escalation machine to none and
    /// binds fresh working memory to the session.
    pub async fn ensure_session(
        &self,
        patient_id: &PatientId,
    ) -> Result<Uuid, PersistenceError> {
        if let Some(session_id) = self.active.read().await.get(patient_id) {
            return Ok(*session_id);
        }

        let session: PatientSession = self.store.create_session(patient_id).await?;
        self.memory
            .open_session(patient_id, session.session_id)
            .await;

        let machine = self.machine(patient_id).await;
        machine.lock().await.reset_for_new_session();

        self.active
            .write()
            .await
            .insert(patient_id.clone(), session.session_id);

        info!(patient_id = %patient_id, session_id = %session.session_id, "Session opened");
        Ok(session.session_id)
    }

    /// Graceful close: evict working memory and close the stored session.
    /// Escalation state is left untouched.
    pub async fn close_session(&self, patient_id: &PatientId) -> Result<(), PersistenceError> {
        let session_id = self.active.write().await.remove(patient_id);
        self.memory.evict(patient_id).await;
        if let Some(session_id) = session_id {
            self.store.close_session(session_id).await?;
            info!(patient_id = %patient_id, session_id = %session_id, "Session closed");
        }
        Ok(())
    }

    /// Session abort: escalation resolves directly from any state, then the
    /// session closes as usual.
    pub async fn abort_session(&self, patient_id: &PatientId) -> Result<(), PersistenceError> {
        let machine = self.machine(patient_id).await;
        machine.lock().await.abort();
        self.close_session(patient_id).await
    }

    /// Provider acknowledged the escalated case.
    pub async fn acknowledge_escalation(
        &self,
        patient_id: &PatientId,
    ) -> Result<(), EscalationError> {
        let machine = self.machine(patient_id).await;
        let result = machine.lock().await.acknowledge();
        result
    }

    /// Human actor resolved the escalated case.
    pub async fn resolve_escalation(
        &self,
        patient_id: &PatientId,
    ) -> Result<(), EscalationError> {
        let machine = self.machine(patient_id).await;
        let result = machine.lock().await.resolve();
        result
    }

    /// Current escalation state for an identity.
    pub async fn escalation_state(&self, patient_id: &PatientId) -> EscalationState {
        let machine = self.machine(patient_id).await;
        let state = machine.lock().await.state();
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepod_config::MemoryConfig;
    use carepod_core::audit::MemorySink;
    use carepod_core::triage::{TriageResult, UrgencyLevel};
    use carepod_memory::NullEmbedder;

    struct StubStore {
        sessions: RwLock<Vec<PatientSession>>,
    }

    impl StubStore {
        fn new() -> Self {
            Self {
                sessions: RwLock::new(Vec::new()),
            }
        }
    }

    #[async_trait::async_trait]
    impl SessionStore for StubStore {
        fn name(&self) -> &str {
            "stub"
        }

        async fn create_session(
            &self,
            patient_id: &PatientId,
        ) -> Result<PatientSession, PersistenceError> {
            let session = PatientSession::new(patient_id.clone());
            self.sessions.write().await.push(session.clone());
            Ok(session)
        }

        async fn append_turn(
            &self,
            _row: carepod_core::persistence::ConversationRow,
        ) -> Result<(), PersistenceError> {
            Ok(())
        }

        async fn load_history(
            &self,
            _patient_id: &PatientId,
            _limit: usize,
        ) -> Result<Vec<carepod_core::persistence::ConversationRow>, PersistenceError> {
            Ok(Vec::new())
        }

        async fn close_session(&self, session_id: Uuid) -> Result<(), PersistenceError> {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .iter_mut()
                .find(|s| s.session_id == session_id)
                .ok_or_else(|| PersistenceError::SessionNotFound(session_id.to_string()))?;
            session.status = carepod_core::patient::SessionStatus::Closed;
            Ok(())
        }
    }

    fn manager() -> SessionManager {
        let memory = Arc::new(MemoryStore::new(
            Arc::new(NullEmbedder),
            Arc::new(MemorySink::new()),
            MemoryConfig::default(),
        ));
        SessionManager::new(Arc::new(StubStore::new()), memory)
    }

    fn critical_result() -> TriageResult {
        TriageResult {
            score: 9,
            level: UrgencyLevel::Critical,
            reasoning: vec![],
            recommended_action: String::new(),
        }
    }

    #[tokio::test]
    async fn ensure_session_is_idempotent_per_identity() {
        let manager = manager();
        let id = PatientId::from("p-1");

        let first = manager.ensure_session(&id).await.unwrap();
        let second = manager.ensure_session(&id).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn new_session_resets_resolved_escalation() {
        let manager = manager();
        let id = PatientId::from("p-1");
        manager.ensure_session(&id).await.unwrap();

        {
            let machine = manager.machine(&id).await;
            let mut machine = machine.lock().await;
            machine.evaluate(&critical_result(), 7);
            machine.abort();
        }
        assert_eq!(
            manager.escalation_state(&id).await,
            EscalationState::Resolved
        );

        manager.close_session(&id).await.unwrap();
        manager.ensure_session(&id).await.unwrap();
        assert_eq!(manager.escalation_state(&id).await, EscalationState::None);
    }

    #[tokio::test]
    async fn pending_escalation_survives_new_session() {
        let manager = manager();
        let id = PatientId::from("p-1");
        manager.ensure_session(&id).await.unwrap();

        {
            let machine = manager.machine(&id).await;
            machine.lock().await.evaluate(&critical_result(), 7);
        }

        manager.close_session(&id).await.unwrap();
        manager.ensure_session(&id).await.unwrap();
        assert_eq!(
            manager.escalation_state(&id).await,
            EscalationState::Pending
        );
    }

    #[tokio::test]
    async fn abort_resolves_escalation_and_closes() {
        let manager = manager();
        let id = PatientId::from("p-1");
        manager.ensure_session(&id).await.unwrap();

        {
            let machine = manager.machine(&id).await;
            machine.lock().await.evaluate(&critical_result(), 7);
        }

        manager.abort_session(&id).await.unwrap();
        assert_eq!(
            manager.escalation_state(&id).await,
            EscalationState::Resolved
        );
    }

    #[tokio::test]
    async fn acknowledge_requires_notified_state() {
        let manager = manager();
        let id = PatientId::from("p-1");
        let err = manager.acknowledge_escalation(&id).await.unwrap_err();
        assert!(matches!(err, EscalationError::InvalidTransition { .. }));
    }
}

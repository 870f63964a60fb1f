//! The per-turn pipeline.
//!
//! Phases: received -> features-extracted -> scored -> (retrieval in
//! parallel with the escalation check) -> merged -> memory-committed ->
//! responded. Extraction failure or timeout sends the turn to the terminal
//! degraded phase, which still answers from the keyword fallback. The
//! memory commit is the last step, runs on its own task so cancellation of
//! the caller cannot leave a partial commit, and is atomic per turn.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use carepod_config::AppConfig;
use carepod_core::audit::AuditSink;
use carepod_core::completion::{CompletionRequest, CompletionService, TurnIntent};
use carepod_core::error::{Error, EscalationError};
use carepod_core::event::{DomainEvent, EventBus};
use carepod_core::knowledge::{Embedder, KnowledgeIndex, ScoredChunk};
use carepod_core::memory::{
    ConversationTurn, EpisodicDraft, ProceduralPrefs, SemanticDelta, TurnCommit,
};
use carepod_core::patient::{PatientId, SymptomFeatureSet};
use carepod_core::persistence::{ConversationRow, SessionStore};
use carepod_core::triage::TriageResult;
use carepod_memory::MemoryStore;
use carepod_retrieval::{HybridRetriever, RetrievalContext};
use carepod_triage::{EscalationAdvice, HandoffCase, HandoffChannel, RetryPolicy};

use crate::intake;
use crate::response::{KnowledgeItem, TurnRequest, TurnResponse};
use crate::session::SessionManager;

/// Pipeline phase, used for structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnPhase {
    Received,
    FeaturesExtracted,
    Scored,
    Merged,
    MemoryCommitted,
    Responded,
    Degraded,
}

impl std::fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::FeaturesExtracted => "features_extracted",
            Self::Scored => "scored",
            Self::Merged => "merged",
            Self::MemoryCommitted => "memory_committed",
            Self::Responded => "responded",
            Self::Degraded => "degraded",
        };
        write!(f, "{s}")
    }
}

/// A handoff channel that accepts every case and logs it.
///
/// Stands in for the external provider-notification integration in demos
/// and local runs.
pub struct LoggingHandoff;

#[async_trait::async_trait]
impl HandoffChannel for LoggingHandoff {
    async fn dispatch(&self, case: &HandoffCase) -> Result<(), EscalationError> {
        info!(
            patient_id = %case.patient_id,
            score = case.triage.score,
            summary = %case.summary,
            "Handoff dispatched"
        );
        Ok(())
    }
}

/// The orchestrator. One instance serves all patients; every turn runs as
/// its own unit of work with no shared mutable state outside the memory
/// store and the session manager.
pub struct Orchestrator {
    completion: Arc<dyn CompletionService>,
    retriever: HybridRetriever,
    memory: Arc<MemoryStore>,
    sessions: SessionManager,
    session_store: Arc<dyn SessionStore>,
    handoff: Arc<dyn HandoffChannel>,
    events: Arc<EventBus>,
    config: AppConfig,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        completion: Arc<dyn CompletionService>,
        index: Arc<dyn KnowledgeIndex>,
        embedder: Arc<dyn Embedder>,
        session_store: Arc<dyn SessionStore>,
        handoff: Arc<dyn HandoffChannel>,
        audit: Arc<dyn AuditSink>,
        config: AppConfig,
    ) -> Self {
        let memory = Arc::new(MemoryStore::new(
            embedder,
            audit,
            config.memory.clone(),
        ));
        let retriever = HybridRetriever::new(index, config.retrieval.clone());
        let sessions = SessionManager::new(session_store.clone(), memory.clone());

        Self {
            completion,
            retriever,
            memory,
            sessions,
            session_store,
            handoff,
            events: Arc::new(EventBus::default()),
            config,
        }
    }

    /// The domain event bus for monitoring subscribers.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Session and escalation lifecycle operations.
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// The layered memory store (read access for diagnostics and tests).
    pub fn memory(&self) -> &Arc<MemoryStore> {
        &self.memory
    }

    /// Process one patient turn.
    pub async fn process_turn(&self, request: TurnRequest) -> Result<TurnResponse, Error> {
        let patient_id = request.patient_id.clone();
        let utterance = request.utterance.clone();

        debug!(patient_id = %patient_id, phase = %TurnPhase::Received, "Turn started");
        self.events.publish(DomainEvent::TurnReceived {
            patient_id: patient_id.clone(),
            timestamp: Utc::now(),
        });

        // Persistence unreachable is one of the two failures that abort.
        let session_id = self.sessions.ensure_session(&patient_id).await?;

        // Risk factors come from semantic memory as of turn start; the
        // version travels to the commit for stale-read detection.
        let (semantic, semantic_version) = self.memory.semantic_versioned(&patient_id).await;
        let mut risk = semantic.risk_factors();

        // --- Feature extraction (bounded external call) ---
        let (features, semantic_delta, mut degraded) = self.extract(&utterance).await;
        // What intake just learned informs this turn's own scoring.
        risk.merge(&semantic_delta.risk_factors());

        let phase = if degraded {
            TurnPhase::Degraded
        } else {
            TurnPhase::FeaturesExtracted
        };
        debug!(patient_id = %patient_id, phase = %phase, symptoms = features.symptoms.len(), "Features ready");
        self.events.publish(DomainEvent::FeaturesExtracted {
            patient_id: patient_id.clone(),
            symptom_count: features.symptoms.len(),
            degraded,
            timestamp: Utc::now(),
        });

        // --- Scoring (pure) ---
        let result = carepod_triage::score(&features, &risk);
        debug!(
            patient_id = %patient_id,
            phase = %TurnPhase::Scored,
            score = result.score,
            level = %result.level,
            "Triage scored"
        );
        self.events.publish(DomainEvent::TriageScored {
            patient_id: patient_id.clone(),
            score: result.score,
            level: result.level,
            timestamp: Utc::now(),
        });

        // --- Fan-out: retrieval alongside the escalation check ---
        // Escalation is safety-critical and must not wait for a slow search.
        let retrieval_ctx = RetrievalContext {
            features: features.clone(),
            risk: risk.clone(),
        };
        let (chunks, _escalation_state) = tokio::join!(
            self.retrieve_bounded(&patient_id, &utterance, &retrieval_ctx),
            self.check_escalation(&patient_id, &result, &features),
        );

        debug!(patient_id = %patient_id, phase = %TurnPhase::Merged, chunks = chunks.len(), "Results merged");

        let advice = EscalationAdvice::for_triage(
            &result,
            &features,
            self.config.triage.escalation_threshold,
        );

        // --- Conversational reply ---
        let prefs = self.memory.procedural(&patient_id).await;
        let agent_response = self
            .build_reply(&utterance, &result, &prefs, degraded)
            .await;
        let follow_up_questions = intake::follow_up_questions(&features);

        // --- Atomic memory commit (last step, not cancellable) ---
        let commit = build_commit(&utterance, &agent_response, &result, semantic_delta);
        let memory = self.memory.clone();
        let commit_id = patient_id.clone();
        let commit_task = tokio::spawn(async move {
            memory
                .commit_turn(&commit_id, semantic_version, commit)
                .await
        });
        commit_task
            .await
            .map_err(|e| Error::Internal(format!("commit task failed: {e}")))??;

        debug!(patient_id = %patient_id, phase = %TurnPhase::MemoryCommitted, "Memory committed");
        self.events.publish(DomainEvent::MemoryCommitted {
            patient_id: patient_id.clone(),
            timestamp: Utc::now(),
        });

        // Conversation row to the relational store; losing it degrades the
        // response rather than discarding the turn.
        let row = ConversationRow {
            turn_id: Uuid::new_v4(),
            session_id,
            patient_id: patient_id.clone(),
            utterance: utterance.clone(),
            response: agent_response.clone(),
            urgency_score: Some(result.score),
            created_at: Utc::now(),
        };
        if let Err(e) = self.session_store.append_turn(row).await {
            error!(patient_id = %patient_id, error = %e, "Failed to persist conversation row");
            degraded = true;
        }

        if degraded {
            self.events.publish(DomainEvent::TurnDegraded {
                patient_id: patient_id.clone(),
                reason: "turn completed without full service path".into(),
                timestamp: Utc::now(),
            });
        }

        info!(
            patient_id = %patient_id,
            phase = %TurnPhase::Responded,
            score = result.score,
            level = %result.level,
            escalation_required = advice.required,
            degraded,
            "Turn completed"
        );

        Ok(TurnResponse {
            agent_response,
            triage: result,
            escalation: advice,
            knowledge: chunks.into_iter().map(KnowledgeItem::from).collect(),
            follow_up_questions,
            degraded,
            timestamp: Utc::now(),
        })
    }

    /// Run feature extraction under the configured budget.
    ///
    /// Returns the feature set, the semantic facts intake learned, and
    /// whether the turn is degraded (service failure or timeout). Malformed
    /// output is recovered via the keyword fallback without degrading.
    async fn extract(&self, utterance: &str) -> (SymptomFeatureSet, SemanticDelta, bool) {
        let budget = Duration::from_millis(self.config.engine.extraction_timeout_ms);
        let request = CompletionRequest::new(
            TurnIntent::ExtractFeatures,
            intake::extraction_prompt(utterance),
        )
        .with_max_tokens(512);

        match timeout(budget, self.completion.complete(request)).await {
            Ok(Ok(response)) => match intake::parse_extraction(&response.text) {
                Ok((features, semantic)) => (features, semantic, false),
                Err(e) => {
                    let (features, semantic) = intake::fallback_on_invalid(utterance, e);
                    (features, semantic, false)
                }
            },
            Ok(Err(e)) => {
                warn!(error = %e, "Completion service failed; degrading to keyword extraction");
                let (features, semantic) = intake::keyword_features(utterance);
                (features, semantic, true)
            }
            Err(_) => {
                warn!(
                    budget_ms = self.config.engine.extraction_timeout_ms,
                    "Feature extraction timed out; degrading to keyword extraction"
                );
                let (features, semantic) = intake::keyword_features(utterance);
                (features, semantic, true)
            }
        }
    }

    /// Retrieval bounded by the per-step budget. Unavailability and
    /// timeouts both collapse to an empty knowledge set; escalation is
    /// unaffected either way.
    async fn retrieve_bounded(
        &self,
        patient_id: &PatientId,
        utterance: &str,
        ctx: &RetrievalContext,
    ) -> Vec<ScoredChunk> {
        let budget = Duration::from_millis(self.config.retrieval.step_timeout_ms);
        let chunks = match timeout(budget, self.retriever.retrieve(utterance, ctx)).await {
            Ok(Ok(chunks)) => chunks,
            Ok(Err(e)) => {
                warn!(patient_id = %patient_id, error = %e, "Retrieval unavailable; returning empty knowledge set");
                Vec::new()
            }
            Err(_) => {
                warn!(
                    patient_id = %patient_id,
                    budget_ms = self.config.retrieval.step_timeout_ms,
                    "Retrieval timed out; returning empty knowledge set"
                );
                Vec::new()
            }
        };

        self.events.publish(DomainEvent::KnowledgeRetrieved {
            patient_id: patient_id.clone(),
            chunk_count: chunks.len(),
            timestamp: Utc::now(),
        });
        chunks
    }

    /// Evaluate escalation for this turn's result and, if newly raised,
    /// push the case through the handoff channel.
    async fn check_escalation(
        &self,
        patient_id: &PatientId,
        result: &TriageResult,
        features: &SymptomFeatureSet,
    ) {
        let machine = self.sessions.machine(patient_id).await;
        let mut machine = machine.lock().await;

        let raised = machine.evaluate(result, self.config.triage.escalation_threshold);
        if raised {
            self.publish_last_transition(patient_id, &machine);

            let case = HandoffCase {
                patient_id: patient_id.clone(),
                triage: result.clone(),
                summary: format!(
                    "score {}/10 ({}); symptoms: {}",
                    result.score,
                    result.level,
                    features.names().join(", ")
                ),
            };
            let policy = RetryPolicy::from_config(&self.config.triage);

            match machine.notify(self.handoff.as_ref(), &case, policy).await {
                Ok(()) => self.publish_last_transition(patient_id, &machine),
                Err(e) => {
                    // The one operator-visible hard alert: a pending
                    // escalation that never reached notified.
                    error!(
                        patient_id = %patient_id,
                        error = %e,
                        "Escalation handoff exhausted retries; case remains pending"
                    );
                    self.events.publish(DomainEvent::EscalationStuck {
                        patient_id: patient_id.clone(),
                        attempts: self.config.triage.notify_max_attempts,
                        timestamp: Utc::now(),
                    });
                }
            }
        }
    }

    fn publish_last_transition(
        &self,
        patient_id: &PatientId,
        machine: &carepod_triage::EscalationMachine,
    ) {
        if let Some(transition) = machine.history().last() {
            self.events.publish(DomainEvent::EscalationAdvanced {
                patient_id: patient_id.clone(),
                from: transition.from,
                to: transition.to,
                sequence: transition.sequence,
                timestamp: Utc::now(),
            });
        }
    }

    /// Persist communication-style preferences for an identity.
    /// Procedural memory is replaced wholesale; there is nothing to merge.
    pub async fn set_preferences(&self, patient_id: &PatientId, prefs: ProceduralPrefs) {
        self.memory.replace_procedural(patient_id, prefs).await;
    }

    /// Build the conversational reply: through the completion service when
    /// the turn is healthy, from the static template otherwise.
    async fn build_reply(
        &self,
        utterance: &str,
        result: &TriageResult,
        prefs: &ProceduralPrefs,
        degraded: bool,
    ) -> String {
        if degraded {
            return intake::fallback_reply(&result.recommended_action);
        }

        let budget = Duration::from_millis(self.config.retrieval.step_timeout_ms);
        let request = CompletionRequest::new(
            TurnIntent::IntakeReply,
            intake::reply_prompt(utterance, &result.level.to_string(), prefs),
        )
        .with_max_tokens(256);

        match timeout(budget, self.completion.complete(request)).await {
            Ok(Ok(response)) => response.text,
            Ok(Err(e)) => {
                warn!(error = %e, "Reply generation failed; using fallback reply");
                intake::fallback_reply(&result.recommended_action)
            }
            Err(_) => {
                warn!("Reply generation timed out; using fallback reply");
                intake::fallback_reply(&result.recommended_action)
            }
        }
    }
}

/// Assemble the turn's buffered memory mutations.
fn build_commit(
    utterance: &str,
    agent_response: &str,
    result: &TriageResult,
    semantic: SemanticDelta,
) -> TurnCommit {
    let snippet: String = utterance.trim().chars().take(120).collect();
    TurnCommit {
        working: vec![
            ConversationTurn::patient(utterance),
            ConversationTurn::agent(agent_response),
        ],
        semantic,
        episodic: Some(EpisodicDraft {
            content: format!(
                "reported: {snippet}; triage {} ({})",
                result.score, result.level
            ),
            urgency_score: Some(result.score),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepod_core::triage::UrgencyLevel;

    #[test]
    fn build_commit_carries_both_turns_and_episodic() {
        let result = TriageResult {
            score: 8,
            level: UrgencyLevel::Critical,
            reasoning: vec![],
            recommended_action: String::new(),
        };
        let commit = build_commit("my chest hurts", "Seek care now.", &result, SemanticDelta::default());

        assert_eq!(commit.working.len(), 2);
        let episodic = commit.episodic.unwrap();
        assert!(episodic.content.contains("triage 8"));
        assert_eq!(episodic.urgency_score, Some(8));
    }
}

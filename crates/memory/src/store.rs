//! The layered memory store.
//!
//! All four layers for all identities live behind one `RwLock`'d map.
//! Mutations emit audit events; the per-turn commit applies its whole
//! mutation set under the identity map's write lock, so a concurrent turn
//! for the same patient either sees all of it or none of it.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use carepod_config::MemoryConfig;
use carepod_core::audit::{AuditEvent, AuditOperation, AuditSink};
use carepod_core::error::{MemoryError, RetrievalError};
use carepod_core::knowledge::Embedder;
use carepod_core::memory::{
    ConversationTurn, EpisodicDraft, EpisodicEntry, MemoryLayer, ProceduralPrefs, SemanticDelta,
    SemanticMemory, TurnCommit, WorkingMemory,
};
use carepod_core::patient::PatientId;

use crate::vector::cosine_similarity;

/// All memory layers for one identity.
#[derive(Debug, Default)]
struct PatientMemory {
    working: WorkingMemory,
    episodic: Vec<EpisodicEntry>,
    semantic: SemanticMemory,
    /// Bumped on every semantic merge; lets a commit detect that another
    /// turn moved semantic memory since this turn read it
    semantic_version: u64,
    procedural: ProceduralPrefs,
}

/// An embedder that produces no vector.
///
/// Used when no embedding service is wired up; episodic entries are still
/// stored, they just cannot be recalled by similarity.
pub struct NullEmbedder;

#[async_trait::async_trait]
impl Embedder for NullEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// The layered per-patient memory store.
pub struct MemoryStore {
    state: RwLock<HashMap<PatientId, PatientMemory>>,
    embedder: Arc<dyn Embedder>,
    audit: Arc<dyn AuditSink>,
    config: MemoryConfig,
}

impl MemoryStore {
    pub fn new(embedder: Arc<dyn Embedder>, audit: Arc<dyn AuditSink>, config: MemoryConfig) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            embedder,
            audit,
            config,
        }
    }

    fn emit(&self, identity: &PatientId, layer: MemoryLayer, operation: AuditOperation) {
        self.audit
            .record(AuditEvent::now(identity.clone(), layer, operation));
    }

    // --- Reads (never-seen identities yield empty defaults) ---

    /// The current session's working memory.
    pub async fn working(&self, identity: &PatientId) -> WorkingMemory {
        self.state
            .read()
            .await
            .get(identity)
            .map(|m| m.working.clone())
            .unwrap_or_default()
    }

    /// All retained episodic entries, oldest first.
    pub async fn episodic(&self, identity: &PatientId) -> Vec<EpisodicEntry> {
        self.state
            .read()
            .await
            .get(identity)
            .map(|m| m.episodic.clone())
            .unwrap_or_default()
    }

    /// The semantic memory for an identity.
    pub async fn semantic(&self, identity: &PatientId) -> SemanticMemory {
        self.semantic_versioned(identity).await.0
    }

    /// The semantic memory together with its version counter.
    ///
    /// The orchestrator reads this at turn start and passes the version back
    /// at commit time so a stale read is detected and merged against the
    /// re-read state instead.
    pub async fn semantic_versioned(&self, identity: &PatientId) -> (SemanticMemory, u64) {
        self.state
            .read()
            .await
            .get(identity)
            .map(|m| (m.semantic.clone(), m.semantic_version))
            .unwrap_or_default()
    }

    /// The communication preferences for an identity.
    pub async fn procedural(&self, identity: &PatientId) -> ProceduralPrefs {
        self.state
            .read()
            .await
            .get(identity)
            .map(|m| m.procedural.clone())
            .unwrap_or_default()
    }

    // --- Mutations ---

    /// Append one working-memory turn, trimming to the configured cap.
    pub async fn append_working(&self, identity: &PatientId, turn: ConversationTurn) {
        {
            let mut state = self.state.write().await;
            let mem = state.entry(identity.clone()).or_default();
            mem.working.turns.push(turn);
            Self::trim_working(&mut mem.working, self.config.working_turn_cap);
        }
        self.emit(identity, MemoryLayer::Working, AuditOperation::Append);
    }

    /// Bind working memory to a session. Called at session start.
    pub async fn open_session(&self, identity: &PatientId, session_id: Uuid) {
        let mut state = self.state.write().await;
        let mem = state.entry(identity.clone()).or_default();
        mem.working = WorkingMemory {
            session_id: Some(session_id),
            turns: Vec::new(),
        };
    }

    /// Append one episodic snapshot, embedding it for later recall and
    /// pruning entries past the retention horizon.
    pub async fn append_episodic(
        &self,
        identity: &PatientId,
        draft: EpisodicDraft,
    ) -> Result<String, MemoryError> {
        let entry = self.build_episodic(&draft).await;
        let id = entry.id.clone();

        let pruned = {
            let mut state = self.state.write().await;
            let mem = state.entry(identity.clone()).or_default();
            mem.episodic.push(entry);
            Self::prune_episodic(&mut mem.episodic, self.config.episodic_retention_days)
        };

        self.emit(identity, MemoryLayer::Episodic, AuditOperation::Append);
        if pruned > 0 {
            debug!(identity = %identity, pruned, "Pruned episodic entries past retention");
            self.emit(identity, MemoryLayer::Episodic, AuditOperation::Prune);
        }
        Ok(id)
    }

    /// Merge a semantic delta. Commutative and idempotent; applying the same
    /// delta twice leaves the state unchanged.
    pub async fn merge_semantic(&self, identity: &PatientId, delta: &SemanticDelta) {
        {
            let mut state = self.state.write().await;
            let mem = state.entry(identity.clone()).or_default();
            mem.semantic.merge(delta);
            mem.semantic_version += 1;
        }
        self.emit(identity, MemoryLayer::Semantic, AuditOperation::Merge);
    }

    /// Replace the procedural preferences wholesale.
    pub async fn replace_procedural(&self, identity: &PatientId, prefs: ProceduralPrefs) {
        {
            let mut state = self.state.write().await;
            let mem = state.entry(identity.clone()).or_default();
            mem.procedural = prefs;
        }
        self.emit(identity, MemoryLayer::Procedural, AuditOperation::Replace);
    }

    /// Session close: discard working memory. The other layers outlive the
    /// session.
    pub async fn evict(&self, identity: &PatientId) {
        {
            let mut state = self.state.write().await;
            if let Some(mem) = state.get_mut(identity) {
                mem.working = WorkingMemory::default();
            }
        }
        self.emit(identity, MemoryLayer::Working, AuditOperation::Evict);
    }

    /// Apply one turn's buffered mutations as a single logical unit.
    ///
    /// `observed_semantic_version` is the version the turn read at its
    /// start. If another turn for the same identity merged in between, the
    /// merge here runs against the re-read current state, which is safe
    /// because semantic merges are commutative. The whole set is applied
    /// under the write lock: a concurrent reader sees all of it or none.
    pub async fn commit_turn(
        &self,
        identity: &PatientId,
        observed_semantic_version: u64,
        commit: TurnCommit,
    ) -> Result<(), MemoryError> {
        if commit.is_empty() {
            return Ok(());
        }

        // Embedding happens outside the lock; it may call a remote service.
        let episodic = match &commit.episodic {
            Some(draft) => Some(self.build_episodic(draft).await),
            None => None,
        };

        let (merged_semantic, appended_episodic, pruned) = {
            let mut state = self.state.write().await;
            let mem = state.entry(identity.clone()).or_default();

            if mem.semantic_version != observed_semantic_version {
                debug!(
                    identity = %identity,
                    observed = observed_semantic_version,
                    current = mem.semantic_version,
                    "Semantic memory moved during turn; merging against re-read state"
                );
            }

            for turn in commit.working {
                mem.working.turns.push(turn);
            }
            Self::trim_working(&mut mem.working, self.config.working_turn_cap);

            let merged_semantic = !commit.semantic.is_empty();
            if merged_semantic {
                mem.semantic.merge(&commit.semantic);
                mem.semantic_version += 1;
            }

            let appended = episodic.is_some();
            let mut pruned = 0;
            if let Some(entry) = episodic {
                mem.episodic.push(entry);
                pruned =
                    Self::prune_episodic(&mut mem.episodic, self.config.episodic_retention_days);
            }

            (merged_semantic, appended, pruned)
        };

        self.emit(identity, MemoryLayer::Working, AuditOperation::Append);
        if merged_semantic {
            self.emit(identity, MemoryLayer::Semantic, AuditOperation::Merge);
        }
        if appended_episodic {
            self.emit(identity, MemoryLayer::Episodic, AuditOperation::Append);
        }
        if pruned > 0 {
            self.emit(identity, MemoryLayer::Episodic, AuditOperation::Prune);
        }
        Ok(())
    }

    /// Recall episodic entries most similar to a query, best first.
    ///
    /// Entries stored without an embedding are skipped.
    pub async fn recall_episodic(
        &self,
        identity: &PatientId,
        query: &str,
        limit: usize,
    ) -> Vec<EpisodicEntry> {
        let query_embedding = match self.embedder.embed(query).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return Vec::new(),
            Err(e) => {
                warn!(identity = %identity, error = %e, "Episodic recall embedding failed");
                return Vec::new();
            }
        };

        let entries = self.episodic(identity).await;
        let mut scored: Vec<(f32, EpisodicEntry)> = entries
            .into_iter()
            .filter(|e| !e.embedding.is_empty())
            .map(|e| (cosine_similarity(&e.embedding, &query_embedding), e))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored.into_iter().map(|(_, e)| e).collect()
    }

    async fn build_episodic(&self, draft: &EpisodicDraft) -> EpisodicEntry {
        // A failed embedding downgrades recall, it never fails the turn.
        let embedding = match self.embedder.embed(&draft.content).await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Episodic embedding failed; storing without vector");
                Vec::new()
            }
        };
        EpisodicEntry {
            id: Uuid::new_v4().to_string(),
            content: draft.content.clone(),
            urgency_score: draft.urgency_score,
            created_at: Utc::now(),
            embedding,
        }
    }

    fn trim_working(working: &mut WorkingMemory, cap: usize) {
        if working.turns.len() > cap {
            let excess = working.turns.len() - cap;
            working.turns.drain(..excess);
        }
    }

    fn prune_episodic(entries: &mut Vec<EpisodicEntry>, retention_days: i64) -> usize {
        let horizon = Utc::now() - Duration::days(retention_days);
        let before = entries.len();
        entries.retain(|e| e.created_at >= horizon);
        before - entries.len()
    }
}

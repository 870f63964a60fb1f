//! Layered memory record types.
//!
//! Four memory variants share one identity key but have different lifetimes:
//! - *Working*: turns of the current session, dropped at session close
//! - *Episodic*: append-only embedded snapshots, pruned by retention
//! - *Semantic*: confidence-weighted facts, merged and never replaced
//! - *Procedural*: communication preferences, replaced wholesale
//!
//! The concrete store lives in `carepod-memory`; the types live here so the
//! scorer, retriever, and orchestrator can all speak them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::patient::RiskFactors;

/// Which memory layer an operation touched. Used in audit events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    Working,
    Episodic,
    Semantic,
    Procedural,
}

impl std::fmt::Display for MemoryLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Working => "working",
            Self::Episodic => "episodic",
            Self::Semantic => "semantic",
            Self::Procedural => "procedural",
        };
        write!(f, "{s}")
    }
}

/// Who spoke a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    Patient,
    Agent,
}

/// One working-memory conversation turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn patient(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Patient,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Working memory: the current session's conversation, nothing more.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkingMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,

    #[serde(default)]
    pub turns: Vec<ConversationTurn>,
}

impl WorkingMemory {
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }
}

/// One episodic snapshot: a summary of a past interaction plus the
/// embedding stored at append time for later similarity lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicEntry {
    pub id: String,

    pub content: String,

    /// Urgency score of the turn this snapshot came from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_score: Option<u8>,

    pub created_at: DateTime<Utc>,

    /// Embedding computed when the entry was appended
    #[serde(skip)]
    pub embedding: Vec<f32>,
}

/// What kind of fact a semantic entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Condition,
    Medication,
    Allergy,
}

/// A confidence-weighted fact about the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticFact {
    pub kind: FactKind,

    /// Confidence in 0.0..=1.0; merge keeps the maximum
    pub confidence: f32,

    pub noted_at: DateTime<Utc>,
}

impl SemanticFact {
    pub fn new(kind: FactKind, confidence: f32) -> Self {
        Self {
            kind,
            confidence: confidence.clamp(0.0, 1.0),
            noted_at: Utc::now(),
        }
    }
}

/// Semantic memory: a mapping from condition/medication/allergy names to
/// confidence-weighted facts, plus the one scalar field (age).
///
/// The merge is commutative and idempotent: set-union on keys,
/// max-confidence-wins on conflicts, last-write-wins on `age`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticMemory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(default)]
    pub facts: BTreeMap<String, SemanticFact>,
}

/// A semantic update produced by one turn. Same shape as the memory itself;
/// applying it twice yields the same state as once.
pub type SemanticDelta = SemanticMemory;

impl SemanticMemory {
    /// Merge a delta into this memory.
    ///
    /// Union on fact keys; for a key present on both sides the higher
    /// confidence wins (and on equal confidence the existing entry is kept,
    /// which keeps the merge idempotent). `age` is overwritten only when the
    /// delta carries one.
    pub fn merge(&mut self, delta: &SemanticDelta) {
        if delta.age.is_some() {
            self.age = delta.age;
        }
        for (name, fact) in &delta.facts {
            match self.facts.get(name) {
                Some(existing) if existing.confidence >= fact.confidence => {}
                _ => {
                    self.facts.insert(name.clone(), fact.clone());
                }
            }
        }
    }

    /// Record one fact, keeping the higher confidence on collision.
    pub fn note(&mut self, name: impl Into<String>, fact: SemanticFact) {
        let name = name.into();
        match self.facts.get(&name) {
            Some(existing) if existing.confidence >= fact.confidence => {}
            _ => {
                self.facts.insert(name, fact);
            }
        }
    }

    /// Project this memory onto the scorer's risk-factor view.
    pub fn risk_factors(&self) -> RiskFactors {
        let mut risk = RiskFactors {
            age: self.age,
            ..Default::default()
        };
        for (name, fact) in &self.facts {
            match fact.kind {
                FactKind::Condition => {
                    risk.chronic_conditions.insert(name.clone());
                }
                FactKind::Medication => {
                    risk.medications.insert(name.clone());
                }
                FactKind::Allergy => {
                    risk.allergies.insert(name.clone());
                }
            }
        }
        risk
    }

    pub fn is_empty(&self) -> bool {
        self.age.is_none() && self.facts.is_empty()
    }
}

/// Procedural memory: communication-style preferences.
///
/// No internal relationships, so updates replace the whole value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProceduralPrefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
}

/// Draft of an episodic entry; the store assigns the id and embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicDraft {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency_score: Option<u8>,
}

/// The buffered memory mutations of one turn.
///
/// The orchestrator accumulates these while the turn runs and hands the
/// whole set to the store at commit time; either all of it becomes visible
/// to subsequent turns or none of it does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnCommit {
    /// Working-memory turns to append (patient utterance + agent reply)
    #[serde(default)]
    pub working: Vec<ConversationTurn>,

    /// Semantic facts learned this turn
    #[serde(default, skip_serializing_if = "SemanticMemory::is_empty")]
    pub semantic: SemanticDelta,

    /// Episodic snapshot of the turn, if one should be recorded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episodic: Option<EpisodicDraft>,
}

impl TurnCommit {
    pub fn is_empty(&self) -> bool {
        self.working.is_empty() && self.semantic.is_empty() && self.episodic.is_none()
    }
}

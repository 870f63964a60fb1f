//! # Carepod Core
//!
//! Domain types, traits, and error definitions for the carepod triage engine.
//! This crate has **zero framework dependencies** beyond serde/tokio plumbing;
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (completion service, knowledge index,
//! relational store, audit sink) is defined as a trait here. Implementations
//! live in their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod audit;
pub mod completion;
pub mod error;
pub mod event;
pub mod knowledge;
pub mod memory;
pub mod patient;
pub mod persistence;
pub mod triage;

// Re-export key types at crate root for ergonomics
pub use audit::{AuditEvent, AuditOperation, AuditSink, TracingSink};
pub use completion::{CompletionRequest, CompletionResponse, CompletionService, TurnIntent};
pub use error::{Error, Result};
pub use event::{DomainEvent, EventBus};
pub use knowledge::{ChunkMetadata, Embedder, KnowledgeChunk, KnowledgeIndex, ScoredChunk};
pub use memory::{
    ConversationTurn, EpisodicEntry, MemoryLayer, ProceduralPrefs, SemanticDelta, SemanticFact,
    SemanticMemory, TurnCommit, TurnRole, WorkingMemory,
};
pub use patient::{PatientId, PatientSession, RiskFactors, SessionStatus, SymptomFeature, SymptomFeatureSet, VitalSigns};
pub use persistence::{ConversationRow, SessionStore};
pub use triage::{EscalationState, ScoreFactor, ScoreFactorKind, TriageResult, UrgencyLevel};

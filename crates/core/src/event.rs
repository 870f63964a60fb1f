//! Domain event system for turn lifecycle and safety monitoring.
//!
//! Events are published as the pipeline advances. Monitoring subscribes to
//! react without coupling to the orchestrator; in particular, the
//! escalation-stuck alert travels on this bus so a `pending` escalation
//! that never reaches `notified` is operator-visible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::patient::PatientId;
use crate::triage::{EscalationState, UrgencyLevel};

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn entered the pipeline
    TurnReceived {
        patient_id: PatientId,
        timestamp: DateTime<Utc>,
    },

    /// Feature extraction finished (or fell back to keywords)
    FeaturesExtracted {
        patient_id: PatientId,
        symptom_count: usize,
        degraded: bool,
        timestamp: DateTime<Utc>,
    },

    /// The scorer produced a result
    TriageScored {
        patient_id: PatientId,
        score: u8,
        level: UrgencyLevel,
        timestamp: DateTime<Utc>,
    },

    /// The escalation machine advanced
    EscalationAdvanced {
        patient_id: PatientId,
        from: EscalationState,
        to: EscalationState,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// Handoff retries exhausted; the case is stuck in `pending`.
    /// This is the one hard operator alert in the system.
    EscalationStuck {
        patient_id: PatientId,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// Knowledge retrieval finished
    KnowledgeRetrieved {
        patient_id: PatientId,
        chunk_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The turn's memory mutations were committed atomically
    MemoryCommitted {
        patient_id: PatientId,
        timestamp: DateTime<Utc>,
    },

    /// The turn completed in degraded mode
    TurnDegraded {
        patient_id: PatientId,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub. Components
/// subscribe to receive all events and filter for what they care about.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // Ignore send errors (no subscribers = that's fine)
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

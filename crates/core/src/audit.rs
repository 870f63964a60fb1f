//! Audit events for memory mutations.
//!
//! Every memory-store mutation emits one event to an `AuditSink`. Delivery
//! is fire-and-forget: a lost audit event never blocks or fails a clinical
//! turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryLayer;
use crate::patient::PatientId;

/// The memory operation that was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Append,
    Merge,
    Replace,
    Evict,
    Prune,
}

impl std::fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Append => "append",
            Self::Merge => "merge",
            Self::Replace => "replace",
            Self::Evict => "evict",
            Self::Prune => "prune",
        };
        write!(f, "{s}")
    }
}

/// One audit event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub identity: PatientId,
    pub layer: MemoryLayer,
    pub operation: AuditOperation,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn now(identity: PatientId, layer: MemoryLayer, operation: AuditOperation) -> Self {
        Self {
            identity,
            layer,
            operation,
            timestamp: Utc::now(),
        }
    }
}

/// Where audit events are written. Implementations must not block.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}

/// Audit sink that logs entries via `tracing::info!`. The default sink.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            identity = %event.identity,
            layer = %event.layer,
            operation = %event.operation,
            timestamp = %event.timestamp,
            "AUDIT"
        );
    }
}

/// In-memory audit sink that stores events in a vector.
/// Useful for tests and small deployments.
#[derive(Default)]
pub struct MemorySink {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events, in emission order.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Events for a single memory layer.
    pub fn events_for_layer(&self, layer: MemoryLayer) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.layer == layer)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl AuditSink for MemorySink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().unwrap().push(event);
    }
}

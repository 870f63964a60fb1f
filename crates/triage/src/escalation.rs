//! The escalation state machine.
//!
//! States advance one way: none -> pending -> notified -> acknowledged ->
//! resolved. The only exceptions are a direct jump to resolved on session
//! abort and the resolved -> none reset when a new session starts. A later,
//! lower triage score never demotes the state; demotion requires an
//! explicit human resolve. Every transition is recorded with a monotonic
//! sequence number and the triage snapshot that drove it, so a retried
//! evaluation inside one turn cannot reorder or regress the history.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use carepod_config::TriageConfig;
use carepod_core::error::EscalationError;
use carepod_core::patient::{PatientId, SymptomFeatureSet};
use carepod_core::triage::{EscalationState, TriageResult, UrgencyLevel};

use crate::scorer::red_flag_fired;

/// One recorded state transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    /// Monotonically increasing within one machine
    pub sequence: u64,
    pub from: EscalationState,
    pub to: EscalationState,
    /// The triage result that drove this transition, when one did
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub triage: Option<TriageResult>,
    pub timestamp: DateTime<Utc>,
}

/// The case payload handed to the external notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffCase {
    pub patient_id: PatientId,
    pub triage: TriageResult,
    pub summary: String,
}

/// The external handoff channel. May fail transiently; the machine retries.
#[async_trait]
pub trait HandoffChannel: Send + Sync {
    async fn dispatch(&self, case: &HandoffCase) -> Result<(), EscalationError>;
}

/// Bounded exponential backoff for handoff notification.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TriageConfig) -> Self {
        Self {
            max_attempts: config.notify_max_attempts,
            initial_backoff: Duration::from_millis(config.notify_backoff_ms),
        }
    }
}

/// Per-patient escalation ratchet.
#[derive(Debug, Default)]
pub struct EscalationMachine {
    state: EscalationState,
    sequence: u64,
    history: Vec<Transition>,
}

impl EscalationMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EscalationState {
        self.state
    }

    /// Append-only transition history, oldest first.
    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Sequence number of the latest transition.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    fn advance(&mut self, to: EscalationState, triage: Option<TriageResult>) {
        self.sequence += 1;
        self.history.push(Transition {
            sequence: self.sequence,
            from: self.state,
            to,
            triage,
            timestamp: Utc::now(),
        });
        self.state = to;
    }

    /// Evaluate a fresh triage result against the escalation threshold.
    ///
    /// Raises `none -> pending` when the score clears the threshold or the
    /// red-flag override fired. On an already escalated machine this records
    /// nothing and returns false: re-evaluating in the same turn (or scoring
    /// lower in a later turn) never moves the state backward or forward.
    pub fn evaluate(&mut self, result: &TriageResult, threshold: u8) -> bool {
        if self.state != EscalationState::None {
            return false;
        }
        if result.score >= threshold || red_flag_fired(result) {
            info!(
                score = result.score,
                level = %result.level,
                "Escalation raised"
            );
            self.advance(EscalationState::Pending, Some(result.clone()));
            return true;
        }
        false
    }

    /// Push a pending case through the handoff channel.
    ///
    /// Retries with exponential backoff up to the policy's attempt bound.
    /// On success the machine advances to `notified`. On exhaustion the
    /// state deliberately stays `pending` and the error is returned so the
    /// caller can raise the operator alert: a pending escalation that never
    /// reaches notified is a patient-safety gap, not a silent degrade.
    pub async fn notify(
        &mut self,
        channel: &dyn HandoffChannel,
        case: &HandoffCase,
        policy: RetryPolicy,
    ) -> Result<(), EscalationError> {
        if self.state != EscalationState::Pending {
            return Err(EscalationError::InvalidTransition {
                from: self.state.to_string(),
                to: EscalationState::Notified.to_string(),
            });
        }

        let mut backoff = policy.initial_backoff;
        for attempt in 1..=policy.max_attempts {
            match channel.dispatch(case).await {
                Ok(()) => {
                    self.advance(EscalationState::Notified, Some(case.triage.clone()));
                    info!(attempt, "Handoff channel accepted case");
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Handoff dispatch failed"
                    );
                    if attempt < policy.max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
            }
        }

        Err(EscalationError::ChannelUnavailable {
            attempts: policy.max_attempts,
        })
    }

    /// A human provider acknowledged the case.
    pub fn acknowledge(&mut self) -> Result<(), EscalationError> {
        if self.state != EscalationState::Notified {
            return Err(EscalationError::InvalidTransition {
                from: self.state.to_string(),
                to: EscalationState::Acknowledged.to_string(),
            });
        }
        self.advance(EscalationState::Acknowledged, None);
        Ok(())
    }

    /// Explicit case close by a human actor.
    pub fn resolve(&mut self) -> Result<(), EscalationError> {
        if self.state != EscalationState::Acknowledged {
            return Err(EscalationError::InvalidTransition {
                from: self.state.to_string(),
                to: EscalationState::Resolved.to_string(),
            });
        }
        self.advance(EscalationState::Resolved, None);
        Ok(())
    }

    /// Session abort: any state goes directly to resolved.
    pub fn abort(&mut self) {
        if self.state == EscalationState::Resolved {
            return;
        }
        self.advance(EscalationState::Resolved, None);
    }

    /// New-session reset: the single permitted backward edge,
    /// `resolved -> none`. Any other state is left untouched.
    pub fn reset_for_new_session(&mut self) {
        if self.state == EscalationState::Resolved {
            self.advance(EscalationState::None, None);
        }
    }
}

/// Escalation guidance surfaced in the turn response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationAdvice {
    pub required: bool,
    /// Routing level: "emergency", "urgent", "priority", or "routine"
    pub level: String,
    pub instructions: Vec<String>,
    pub provider_type: String,
}

impl EscalationAdvice {
    /// Build advice for a triage result and the symptoms behind it.
    pub fn for_triage(result: &TriageResult, features: &SymptomFeatureSet, threshold: u8) -> Self {
        let required = result.score >= threshold || red_flag_fired(result);
        let level = match result.level {
            UrgencyLevel::Critical => "emergency",
            UrgencyLevel::High => "urgent",
            UrgencyLevel::Moderate => "priority",
            UrgencyLevel::Low | UrgencyLevel::Minimal => "routine",
        };
        Self {
            required,
            level: level.to_string(),
            instructions: instructions_for(level),
            provider_type: provider_type(level, features),
        }
    }
}

/// Per-level patient instructions.
fn instructions_for(level: &str) -> Vec<String> {
    let lines: &[&str] = match level {
        "emergency" => &[
            "Call 911 immediately",
            "Do not drive yourself to the hospital",
            "Stay on the line with the emergency dispatcher",
            "Have someone stay with you if possible",
        ],
        "urgent" => &[
            "Go to the nearest emergency department",
            "Call ahead if possible to notify them",
            "Bring your medication list and ID",
            "Have someone drive you or call an ambulance",
        ],
        "priority" => &[
            "Contact your primary care provider today",
            "If unavailable, consider urgent care",
            "Monitor symptoms closely",
            "Seek immediate care if symptoms worsen",
        ],
        _ => &[
            "Schedule an appointment with a healthcare provider",
            "Continue current care if any",
            "Call if symptoms worsen",
        ],
    };
    lines.iter().map(|s| s.to_string()).collect()
}

/// Specialty routing based on level and presenting symptoms.
fn provider_type(level: &str, features: &SymptomFeatureSet) -> String {
    let names = features.names().join(" ").to_lowercase();
    match level {
        "emergency" | "urgent" => {
            if names.contains("chest") || names.contains("heart") {
                "Emergency Department (Cardiology)".into()
            } else if names.contains("breath") {
                "Emergency Department (Pulmonology)".into()
            } else {
                "Emergency Department".into()
            }
        }
        "priority" => "Urgent Care or Primary Care".into(),
        _ => "Primary Care Provider".into(),
    }
}

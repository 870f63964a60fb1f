//! Triage and escalation value objects.
//!
//! `TriageResult` is the scorer's output; `EscalationState` is the ratchet
//! the escalation machine advances through. Both are shared across crates,
//! so they live here rather than in the triage crate.

use serde::{Deserialize, Serialize};

/// Urgency level, a pure monotonic function of the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrgencyLevel {
    Minimal,
    Low,
    Moderate,
    High,
    Critical,
}

impl UrgencyLevel {
    /// The fixed score-to-level table.
    ///
    /// critical >= 8, high 6..=7, moderate 4..=5, low 2..=3, minimal 0..=1.
    pub fn from_score(score: u8) -> Self {
        match score {
            8.. => Self::Critical,
            6..=7 => Self::High,
            4..=5 => Self::Moderate,
            2..=3 => Self::Low,
            _ => Self::Minimal,
        }
    }
}

impl std::fmt::Display for UrgencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Which scoring component a reasoning entry came from.
///
/// Variants are listed in evaluation order; the scorer emits factors in
/// exactly this order so test assertions can rely on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreFactorKind {
    BaseSeverity,
    AgeRisk,
    ChronicConditions,
    PainScale,
    VitalSigns,
    RedFlagOverride,
}

/// One contributing factor in a triage score, with its contribution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub kind: ScoreFactorKind,

    /// Points this factor added to the raw score
    pub contribution: u8,

    /// Human-readable explanation (e.g. "worst symptom: chest pain")
    pub detail: String,
}

impl ScoreFactor {
    pub fn new(kind: ScoreFactorKind, contribution: u8, detail: impl Into<String>) -> Self {
        Self {
            kind,
            contribution,
            detail: detail.into(),
        }
    }
}

/// The scorer's verdict for one turn.
///
/// Deterministic: the same `SymptomFeatureSet` and `RiskFactors` always
/// produce an identical result, including reasoning order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageResult {
    /// Final clamped score, 0..=10
    pub score: u8,

    pub level: UrgencyLevel,

    /// Contributing factors in evaluation order
    pub reasoning: Vec<ScoreFactor>,

    pub recommended_action: String,
}

/// Escalation ratchet states.
///
/// Transitions only move forward; `Resolved` returns to `None` solely when a
/// new session starts. A later, lower triage score never demotes the state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationState {
    #[default]
    None,
    Pending,
    Notified,
    Acknowledged,
    Resolved,
}

impl std::fmt::Display for EscalationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Pending => "pending",
            Self::Notified => "notified",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        };
        write!(f, "{s}")
    }
}

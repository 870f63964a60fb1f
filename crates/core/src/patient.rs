//! Patient-facing value objects: sessions, symptom features, risk factors.
//!
//! These flow through the entire turn pipeline: the intake step produces a
//! `SymptomFeatureSet`, the memory store supplies `RiskFactors`, and the
//! scorer consumes both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Opaque patient identity token.
///
/// All memory layers and sessions are keyed by this value. The core never
/// interprets it; issuing and validating identities belongs to the excluded
/// credential layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatientId(pub String);

impl PatientId {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PatientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PatientId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Lifecycle status of a patient session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Closed,
}

/// One patient session.
///
/// Invariant: at most one active session per identity at a time. The
/// `SessionStore` enforces this by closing any prior active session when a
/// new one is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientSession {
    pub patient_id: PatientId,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
}

impl PatientSession {
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            session_id: Uuid::new_v4(),
            created_at: Utc::now(),
            status: SessionStatus::Active,
        }
    }
}

/// A single extracted symptom.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymptomFeature {
    /// Normalized symptom name (e.g. "chest pain")
    pub name: String,

    /// Reported severity, 0..=10
    pub severity: u8,

    /// Free-text duration as reported (e.g. "2 days")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,

    /// Red-flag marker requiring the safety override in scoring
    #[serde(default)]
    pub red_flag: bool,
}

impl SymptomFeature {
    pub fn new(name: impl Into<String>, severity: u8) -> Self {
        Self {
            name: name.into(),
            severity: severity.min(10),
            duration: None,
            red_flag: false,
        }
    }

    pub fn with_red_flag(mut self) -> Self {
        self.red_flag = true;
        self
    }

    pub fn with_duration(mut self, duration: impl Into<String>) -> Self {
        self.duration = Some(duration.into());
        self
    }
}

/// Reported vital signs for the current turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate_bpm: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub systolic_bp: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_c: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2_percent: Option<u8>,
}

impl VitalSigns {
    /// Whether any reported vital falls outside its normal adult range.
    ///
    /// Ranges: HR 50..=110 bpm, systolic 90..=160 mmHg, temp 35.5..=38.0 C,
    /// SpO2 >= 94%. Unreported vitals are not anomalies.
    pub fn any_abnormal(&self) -> bool {
        if let Some(hr) = self.heart_rate_bpm {
            if !(50..=110).contains(&hr) {
                return true;
            }
        }
        if let Some(bp) = self.systolic_bp {
            if !(90..=160).contains(&bp) {
                return true;
            }
        }
        if let Some(t) = self.temperature_c {
            if !(35.5..=38.0).contains(&t) {
                return true;
            }
        }
        if let Some(spo2) = self.spo2_percent {
            if spo2 < 94 {
                return true;
            }
        }
        false
    }
}

/// The ordered set of symptoms extracted from one utterance.
///
/// Produced fresh per turn and immutable once built: the scorer and the
/// retriever both read it, neither mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymptomFeatureSet {
    /// Symptoms in extraction order
    pub symptoms: Vec<SymptomFeature>,

    /// Patient-reported pain on a 0..=10 scale, if stated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pain_scale: Option<u8>,

    /// Reported vitals, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vitals: Option<VitalSigns>,
}

impl SymptomFeatureSet {
    pub fn new(symptoms: Vec<SymptomFeature>) -> Self {
        Self {
            symptoms,
            pain_scale: None,
            vitals: None,
        }
    }

    pub fn with_pain_scale(mut self, pain: u8) -> Self {
        self.pain_scale = Some(pain.min(10));
        self
    }

    pub fn with_vitals(mut self, vitals: VitalSigns) -> Self {
        self.vitals = Some(vitals);
        self
    }

    /// Whether any symptom carries a red-flag marker.
    pub fn has_red_flag(&self) -> bool {
        self.symptoms.iter().any(|s| s.red_flag)
    }

    /// Symptom names in extraction order.
    pub fn names(&self) -> Vec<&str> {
        self.symptoms.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.symptoms.is_empty()
    }
}

/// Patient risk factors sourced from Semantic Memory.
///
/// Set fields merge by union; `age` is the only scalar and follows
/// last-write-wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskFactors {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub chronic_conditions: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub medications: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allergies: BTreeSet<String>,
}

impl RiskFactors {
    /// Merge another set of risk factors into this one.
    ///
    /// Union on the set fields; `age` follows last-write-wins (the incoming
    /// value replaces only when present).
    pub fn merge(&mut self, other: &RiskFactors) {
        if other.age.is_some() {
            self.age = other.age;
        }
        self.chronic_conditions
            .extend(other.chronic_conditions.iter().cloned());
        self.medications.extend(other.medications.iter().cloned());
        self.allergies.extend(other.allergies.iter().cloned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_session_is_active() {
        let session = PatientSession::new(PatientId::from("p-001"));
        assert_eq!(session.status, SessionStatus::Active);
        assert_eq!(session.patient_id.as_str(), "p-001");
    }

    #[test]
    fn symptom_severity_clamped_at_construction() {
        let s = SymptomFeature::new("headache", 14);
        assert_eq!(s.severity, 10);
    }

    #[test]
    fn red_flag_detection() {
        let set = SymptomFeatureSet::new(vec![
            SymptomFeature::new("cough", 3),
            SymptomFeature::new("chest pain", 8).with_red_flag(),
        ]);
        assert!(set.has_red_flag());
        assert_eq!(set.names(), vec!["cough", "chest pain"]);
    }

    #[test]
    fn vitals_normal_when_unreported() {
        assert!(!VitalSigns::default().any_abnormal());
    }

    #[test]
    fn vitals_abnormal_heart_rate() {
        let v = VitalSigns {
            heart_rate_bpm: Some(140),
            ..Default::default()
        };
        assert!(v.any_abnormal());
    }

    #[test]
    fn vitals_abnormal_spo2() {
        let v = VitalSigns {
            spo2_percent: Some(88),
            ..Default::default()
        };
        assert!(v.any_abnormal());
    }

    #[test]
    fn risk_factor_merge_unions_sets_and_overwrites_age() {
        let mut base = RiskFactors {
            age: Some(40),
            chronic_conditions: ["diabetes".to_string()].into(),
            ..Default::default()
        };
        let delta = RiskFactors {
            age: Some(41),
            chronic_conditions: ["hypertension".to_string()].into(),
            allergies: ["penicillin".to_string()].into(),
            ..Default::default()
        };
        base.merge(&delta);

        assert_eq!(base.age, Some(41));
        assert_eq!(base.chronic_conditions.len(), 2);
        assert!(base.allergies.contains("penicillin"));
    }

    #[test]
    fn risk_factor_merge_keeps_age_when_delta_absent() {
        let mut base = RiskFactors {
            age: Some(72),
            ..Default::default()
        };
        base.merge(&RiskFactors::default());
        assert_eq!(base.age, Some(72));
    }
}

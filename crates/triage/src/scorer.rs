//! The deterministic triage scorer.
//!
//! Pure function, no I/O, no randomness: identical inputs always produce an
//! identical `TriageResult`, including the order of reasoning entries. Safe
//! to unit test without mocks.
//!
//! Scoring shape:
//! - base severity: the single worst symptom, never a sum, so listing many
//!   mild symptoms cannot inflate the score
//! - four additive modifiers, evaluated in fixed order: age band, chronic
//!   conditions (capped), pain scale (linear, capped), vital-sign anomaly
//! - final score clamped to 0..=10
//! - any red-flag symptom forces score >= 8 and the critical label

use carepod_core::patient::{RiskFactors, SymptomFeatureSet};
use carepod_core::triage::{ScoreFactor, ScoreFactorKind, TriageResult, UrgencyLevel};

/// Keyword floor for known symptom names. The per-symptom value is the
/// higher of this floor and the reported severity minus two, so a patient
/// reporting an unlisted symptom at 10/10 still registers.
fn severity_floor(name: &str) -> u8 {
    let name = name.to_lowercase();
    const TABLE: &[(&str, u8)] = &[
        ("chest pain", 8),
        ("shortness of breath", 8),
        ("trouble breathing", 8),
        ("difficulty breathing", 8),
        ("bleeding", 7),
        ("severe pain", 7),
        ("confusion", 6),
        ("fainting", 6),
        ("fever", 4),
        ("vomiting", 4),
        ("headache", 3),
        ("nausea", 3),
        ("dizziness", 3),
        ("dizzy", 3),
        ("swelling", 3),
        ("cough", 2),
        ("rash", 2),
        ("fatigue", 2),
        ("tired", 2),
    ];
    for (keyword, floor) in TABLE {
        if name.contains(keyword) {
            return *floor;
        }
    }
    1
}

/// Chronic conditions that raise risk. Contribution is +1 each, capped so a
/// long problem list cannot run the score away.
fn is_high_risk_condition(name: &str) -> bool {
    const HIGH_RISK: &[&str] = &[
        "diabetes",
        "heart disease",
        "hypertension",
        "copd",
        "asthma",
        "cancer",
        "immunocompromised",
        "kidney disease",
    ];
    let name = name.to_lowercase();
    HIGH_RISK.iter().any(|c| name.contains(c))
}

const CHRONIC_CAP: u8 = 2;
const PAIN_CAP: u8 = 2;
const VITALS_BONUS: u8 = 1;
const RED_FLAG_MIN_SCORE: u8 = 8;

/// Recommended action per urgency level.
fn recommended_action(level: UrgencyLevel) -> &'static str {
    match level {
        UrgencyLevel::Critical => "Call 911 immediately or go to the emergency room",
        UrgencyLevel::High => "Seek immediate medical attention within 2 hours",
        UrgencyLevel::Moderate => "Contact a healthcare provider within 24 hours",
        UrgencyLevel::Low => "Schedule an appointment within 1-2 weeks",
        UrgencyLevel::Minimal => "Monitor symptoms and consider self-care measures",
    }
}

/// Score one turn's features against the patient's risk factors.
pub fn score(features: &SymptomFeatureSet, risk: &RiskFactors) -> TriageResult {
    let mut reasoning = Vec::new();

    // Base: worst single symptom dominates.
    let base = features
        .symptoms
        .iter()
        .map(|s| {
            severity_floor(&s.name).max(s.severity.saturating_sub(2))
        })
        .max()
        .unwrap_or(0);
    let base_detail = match features
        .symptoms
        .iter()
        .max_by_key(|s| severity_floor(&s.name).max(s.severity.saturating_sub(2)))
    {
        Some(worst) => format!("worst symptom: {}", worst.name),
        None => "no symptoms extracted".to_string(),
    };
    reasoning.push(ScoreFactor::new(
        ScoreFactorKind::BaseSeverity,
        base,
        base_detail,
    ));

    // Age band: monotonically non-decreasing step function.
    let age_bonus = match risk.age {
        Some(age) if age >= 75 => 2,
        Some(age) if age >= 65 => 1,
        _ => 0,
    };
    if age_bonus > 0 {
        reasoning.push(ScoreFactor::new(
            ScoreFactorKind::AgeRisk,
            age_bonus,
            format!("age {} in elevated-risk band", risk.age.unwrap_or(0)),
        ));
    }

    // Chronic conditions: +1 each, capped.
    let high_risk: Vec<&String> = risk
        .chronic_conditions
        .iter()
        .filter(|c| is_high_risk_condition(c))
        .collect();
    let chronic_bonus = (high_risk.len() as u8).min(CHRONIC_CAP);
    if chronic_bonus > 0 {
        reasoning.push(ScoreFactor::new(
            ScoreFactorKind::ChronicConditions,
            chronic_bonus,
            format!(
                "high-risk history: {}",
                high_risk
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }

    // Pain scale: linear in reported pain, capped.
    let pain_bonus = features
        .pain_scale
        .map(|p| (p / 4).min(PAIN_CAP))
        .unwrap_or(0);
    if pain_bonus > 0 {
        reasoning.push(ScoreFactor::new(
            ScoreFactorKind::PainScale,
            pain_bonus,
            format!("reported pain {}/10", features.pain_scale.unwrap_or(0)),
        ));
    }

    // Vitals: fixed bonus if anything is out of range.
    let vitals_bonus = match features.vitals {
        Some(v) if v.any_abnormal() => VITALS_BONUS,
        _ => 0,
    };
    if vitals_bonus > 0 {
        reasoning.push(ScoreFactor::new(
            ScoreFactorKind::VitalSigns,
            vitals_bonus,
            "vital sign outside normal range",
        ));
    }

    // Clamp, not wraparound.
    let additive = (base + age_bonus + chronic_bonus + pain_bonus + vitals_bonus).min(10);

    // Safety override, evaluated last so it appears last in the reasoning.
    let (final_score, level) = if features.has_red_flag() {
        let raised = additive.max(RED_FLAG_MIN_SCORE);
        let flagged: Vec<&str> = features
            .symptoms
            .iter()
            .filter(|s| s.red_flag)
            .map(|s| s.name.as_str())
            .collect();
        reasoning.push(ScoreFactor::new(
            ScoreFactorKind::RedFlagOverride,
            raised - additive,
            format!("red-flag symptom present: {}", flagged.join(", ")),
        ));
        (raised, UrgencyLevel::Critical)
    } else {
        (additive, UrgencyLevel::from_score(additive))
    };

    TriageResult {
        score: final_score,
        level,
        reasoning,
        recommended_action: recommended_action(level).to_string(),
    }
}

/// Whether a result's score was forced up by the red-flag override.
pub fn red_flag_fired(result: &TriageResult) -> bool {
    result
        .reasoning
        .iter()
        .any(|f| f.kind == ScoreFactorKind::RedFlagOverride)
}

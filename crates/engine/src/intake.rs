//! Intake: turning a raw utterance into structured features.
//!
//! Primary path: the completion service extracts a JSON feature set under
//! the extraction budget. Fallback paths: malformed output falls back to
//! keyword matching on the utterance; a timeout or service failure also
//! falls back but marks the turn degraded. The keyword path alone is enough
//! to drive scoring, so the turn always produces a usable feature set.

use serde::Deserialize;
use tracing::warn;

use carepod_core::error::ExtractionError;
use carepod_core::memory::{FactKind, ProceduralPrefs, SemanticDelta, SemanticFact};
use carepod_core::patient::{SymptomFeature, SymptomFeatureSet, VitalSigns};

/// Symptom keywords recognized by the fallback extractor.
const SYMPTOM_KEYWORDS: &[&str] = &[
    "chest pain",
    "shortness of breath",
    "trouble breathing",
    "difficulty breathing",
    "bleeding",
    "headache",
    "fever",
    "nausea",
    "vomiting",
    "dizzy",
    "dizziness",
    "cough",
    "rash",
    "swelling",
    "fatigue",
    "tired",
    "pain",
    "ache",
    "hurt",
];

/// Symptoms that always carry the red-flag marker.
const RED_FLAG_SYMPTOMS: &[&str] = &[
    "chest pain",
    "shortness of breath",
    "trouble breathing",
    "difficulty breathing",
    "bleeding",
];

/// Utterance phrases that force the red flag even without a matching
/// symptom keyword.
const EMERGENCY_PHRASES: &[&str] = &[
    "can't breathe",
    "cannot breathe",
    "heart attack",
    "stroke",
    "unconscious",
    "911",
];

/// Chronic conditions the intake records into semantic memory.
const CONDITION_KEYWORDS: &[&str] = &[
    "diabetes",
    "hypertension",
    "heart disease",
    "asthma",
    "copd",
    "cancer",
    "kidney disease",
    "immunocompromised",
];

/// The JSON shape the extraction prompt asks the model for.
#[derive(Debug, Deserialize)]
struct ExtractedIntake {
    #[serde(default)]
    symptoms: Vec<ExtractedSymptom>,
    #[serde(default)]
    pain_scale: Option<u8>,
    #[serde(default)]
    vitals: Option<VitalSigns>,
    #[serde(default)]
    conditions: Vec<String>,
    #[serde(default)]
    medications: Vec<String>,
    #[serde(default)]
    allergies: Vec<String>,
    #[serde(default)]
    age: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ExtractedSymptom {
    name: String,
    #[serde(default)]
    severity: u8,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    red_flag: bool,
}

/// The prompt sent for feature extraction.
pub fn extraction_prompt(utterance: &str) -> String {
    format!(
        "You are a clinical intake assistant. Extract structured data from \
         the patient's message and answer with ONLY a JSON object of this \
         shape:\n\
         {{\"symptoms\":[{{\"name\":\"...\",\"severity\":0,\"duration\":null,\
         \"red_flag\":false}}],\"pain_scale\":null,\"conditions\":[],\
         \"medications\":[],\"allergies\":[],\"age\":null}}\n\
         Severity is 0-10. Mark red_flag true for symptoms needing emergency \
         care. Do not diagnose.\n\nPatient message: \"{utterance}\""
    )
}

/// The prompt for the conversational intake reply. Communication-style
/// preferences from procedural memory shape the register.
pub fn reply_prompt(utterance: &str, level: &str, prefs: &ProceduralPrefs) -> String {
    let tone = prefs.tone.as_deref().unwrap_or("warm and professional");
    let mut prompt = format!(
        "You are a compassionate medical intake specialist. The triage level \
         for this message is {level}. Reply in a {tone} tone in at most three \
         sentences, ask exactly one clarifying question, and never give a \
         diagnosis."
    );
    if let Some(language) = &prefs.language {
        prompt.push_str(&format!(" Answer in {language}."));
    }
    prompt.push_str(&format!("\n\nPatient message: \"{utterance}\""));
    prompt
}

/// Static reply used when the completion service is unavailable.
pub fn fallback_reply(recommended_action: &str) -> String {
    format!(
        "Thank you for the details. Based on what you've described: {}. \
         A clinician should confirm this guidance.",
        recommended_action
    )
}

/// Parse the extraction output into a feature set and the semantic facts it
/// carries. Malformed output is an `InvalidFeatureSet` error; the caller
/// decides to fall back to keywords.
pub fn parse_extraction(text: &str) -> Result<(SymptomFeatureSet, SemanticDelta), ExtractionError> {
    let json = strip_code_fences(text);
    let extracted: ExtractedIntake = serde_json::from_str(json)
        .map_err(|e| ExtractionError::InvalidFeatureSet(e.to_string()))?;

    let mut symptoms: Vec<SymptomFeature> = extracted
        .symptoms
        .into_iter()
        .filter(|s| !s.name.trim().is_empty())
        .map(|s| {
            let mut feature = SymptomFeature::new(s.name.trim().to_lowercase(), s.severity);
            feature.duration = s.duration;
            feature.red_flag = s.red_flag;
            feature
        })
        .collect();
    mark_known_red_flags(&mut symptoms);

    let mut features = SymptomFeatureSet::new(symptoms);
    if let Some(pain) = extracted.pain_scale {
        features = features.with_pain_scale(pain);
    }
    if let Some(vitals) = extracted.vitals {
        features = features.with_vitals(vitals);
    }

    let mut semantic = SemanticDelta {
        age: extracted.age,
        ..Default::default()
    };
    for condition in extracted.conditions {
        semantic.note(
            condition.trim().to_lowercase(),
            SemanticFact::new(FactKind::Condition, 0.8),
        );
    }
    for medication in extracted.medications {
        semantic.note(
            medication.trim().to_lowercase(),
            SemanticFact::new(FactKind::Medication, 0.8),
        );
    }
    for allergy in extracted.allergies {
        semantic.note(
            allergy.trim().to_lowercase(),
            SemanticFact::new(FactKind::Allergy, 0.9),
        );
    }

    Ok((features, semantic))
}

/// Keyword-based fallback extraction over the raw utterance.
///
/// Always produces at least one symptom token so the scorer has something
/// to work with, per the degraded-mode contract.
pub fn keyword_features(utterance: &str) -> (SymptomFeatureSet, SemanticDelta) {
    let lower = utterance.to_lowercase();

    let mut symptoms: Vec<SymptomFeature> = Vec::new();
    for keyword in SYMPTOM_KEYWORDS {
        // Generic terms already covered by a more specific match are
        // skipped, e.g. "pain" inside "chest pain".
        if lower.contains(keyword) && !symptoms.iter().any(|s| s.name.contains(keyword)) {
            symptoms.push(SymptomFeature::new(*keyword, 4));
        }
    }

    let emergency = EMERGENCY_PHRASES.iter().any(|p| lower.contains(p));
    if symptoms.is_empty() {
        // Raw utterance as the single symptom token.
        let token: String = utterance.trim().chars().take(80).collect();
        let severity = if emergency { 7 } else { 2 };
        symptoms.push(SymptomFeature::new(token.to_lowercase(), severity));
    }
    mark_known_red_flags(&mut symptoms);
    if emergency {
        if let Some(first) = symptoms.first_mut() {
            first.red_flag = true;
        }
    }

    let mut features = SymptomFeatureSet::new(symptoms);
    if let Some(pain) = parse_pain_scale(&lower) {
        features = features.with_pain_scale(pain);
    }

    let mut semantic = SemanticDelta {
        age: parse_age(&lower),
        ..Default::default()
    };
    for condition in CONDITION_KEYWORDS {
        if lower.contains(condition) {
            semantic.note(
                condition.to_string(),
                SemanticFact::new(FactKind::Condition, 0.6),
            );
        }
    }
    if let Some(allergy) = parse_allergy(&lower) {
        semantic.note(allergy, SemanticFact::new(FactKind::Allergy, 0.7));
    }

    (features, semantic)
}

/// Follow-up questions for the next turn, derived from what was extracted.
pub fn follow_up_questions(features: &SymptomFeatureSet) -> Vec<String> {
    if features.is_empty() {
        return vec!["Can you describe what symptoms you're experiencing?".into()];
    }

    let mut questions = Vec::new();
    if features.pain_scale.is_none() {
        questions.push("On a scale of 0-10, how would you rate your discomfort?".to_string());
    }
    if features.symptoms.iter().all(|s| s.duration.is_none()) {
        questions.push("How long have you been experiencing these symptoms?".to_string());
    }
    questions.push("Have you taken any medications for this?".to_string());

    for symptom in &features.symptoms {
        if symptom.name.contains("pain") {
            questions
                .push("Can you describe the type of pain - sharp, dull, or throbbing?".to_string());
            break;
        }
        if symptom.name.contains("fever") {
            questions
                .push("Have you taken your temperature? If so, what was it?".to_string());
            break;
        }
    }

    questions.truncate(3);
    questions
}

fn mark_known_red_flags(symptoms: &mut [SymptomFeature]) {
    for symptom in symptoms {
        if RED_FLAG_SYMPTOMS.iter().any(|rf| symptom.name.contains(rf)) {
            symptom.red_flag = true;
        }
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix("```").unwrap_or(trimmed);
    trimmed.trim()
}

/// Parse a "9/10"-style pain report.
fn parse_pain_scale(lower: &str) -> Option<u8> {
    let pos = lower.find("/10")?;
    let digits: Vec<char> = lower[..pos]
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return None;
    }
    let value: String = digits.into_iter().rev().collect();
    value.parse::<u8>().ok().map(|p| p.min(10))
}

/// Parse "... 72 years old ..." style age mentions.
fn parse_age(lower: &str) -> Option<u32> {
    let tokens: Vec<&str> = lower.split_whitespace().collect();
    for i in 0..tokens.len().saturating_sub(1) {
        if tokens[i + 1].starts_with("year") {
            if let Ok(age) = tokens[i].trim_matches(|c: char| !c.is_ascii_digit()).parse() {
                return Some(age);
            }
        }
    }
    None
}

/// Parse "allergic to X" mentions.
fn parse_allergy(lower: &str) -> Option<String> {
    let rest = lower.split("allergic to ").nth(1)?;
    let allergen: String = rest
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string();
    if allergen.is_empty() {
        None
    } else {
        Some(allergen)
    }
}

/// Log-and-fallback wrapper used by the orchestrator when extraction output
/// cannot be parsed.
pub fn fallback_on_invalid(
    utterance: &str,
    error: ExtractionError,
) -> (SymptomFeatureSet, SemanticDelta) {
    warn!(error = %error, "Extraction output invalid; using keyword fallback");
    keyword_features(utterance)
}

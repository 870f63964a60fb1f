//! Patient-personalization re-weighting.
//!
//! Chunks about conditions the patient is known to have move up; chunks
//! contraindicated by their medications or allergies move down. The
//! adjustment is bounded to [-1, 1] and only re-ranks; removal decisions
//! belong to the relevance floor.

use carepod_core::knowledge::KnowledgeChunk;
use carepod_core::patient::RiskFactors;

const CONDITION_BOOST: f32 = 0.5;
const CONTRAINDICATION_PENALTY: f32 = 0.5;

/// Compute the personalization adjustment for one chunk.
pub fn adjustment(chunk: &KnowledgeChunk, risk: &RiskFactors) -> f32 {
    let mut value = 0.0f32;

    for condition in &chunk.metadata.conditions {
        let condition = condition.to_lowercase();
        if risk
            .chronic_conditions
            .iter()
            .any(|c| c.to_lowercase() == condition)
        {
            value += CONDITION_BOOST;
        }
    }

    for contraindication in &chunk.metadata.contraindications {
        let contraindication = contraindication.to_lowercase();
        let hits_medication = risk
            .medications
            .iter()
            .any(|m| m.to_lowercase() == contraindication);
        let hits_allergy = risk
            .allergies
            .iter()
            .any(|a| a.to_lowercase() == contraindication);
        if hits_medication || hits_allergy {
            value -= CONTRAINDICATION_PENALTY;
        }
    }

    value.clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepod_core::knowledge::ChunkMetadata;

    fn chunk(conditions: &[&str], contraindications: &[&str]) -> KnowledgeChunk {
        KnowledgeChunk {
            id: "k".into(),
            text: "guidance".into(),
            metadata: ChunkMetadata {
                conditions: conditions.iter().map(|s| s.to_string()).collect(),
                contraindications: contraindications.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn known_condition_boosts() {
        let risk = RiskFactors {
            chronic_conditions: ["diabetes".to_string()].into(),
            ..Default::default()
        };
        let adj = adjustment(&chunk(&["Diabetes"], &[]), &risk);
        assert!(adj > 0.0);
    }

    #[test]
    fn allergy_contraindication_penalizes() {
        let risk = RiskFactors {
            allergies: ["aspirin".to_string()].into(),
            ..Default::default()
        };
        let adj = adjustment(&chunk(&[], &["aspirin"]), &risk);
        assert!(adj < 0.0);
    }

    #[test]
    fn medication_contraindication_penalizes() {
        let risk = RiskFactors {
            medications: ["warfarin".to_string()].into(),
            ..Default::default()
        };
        let adj = adjustment(&chunk(&[], &["warfarin"]), &risk);
        assert!(adj < 0.0);
    }

    #[test]
    fn unrelated_chunk_is_neutral() {
        let risk = RiskFactors {
            chronic_conditions: ["asthma".to_string()].into(),
            allergies: ["latex".to_string()].into(),
            ..Default::default()
        };
        let adj = adjustment(&chunk(&["migraine"], &["ibuprofen"]), &risk);
        assert_eq!(adj, 0.0);
    }

    #[test]
    fn adjustment_is_bounded() {
        let risk = RiskFactors {
            chronic_conditions: ["a".to_string(), "b".to_string(), "c".to_string()].into(),
            allergies: ["x".to_string(), "y".to_string(), "z".to_string()].into(),
            ..Default::default()
        };
        let boosted = adjustment(&chunk(&["a", "b", "c"], &[]), &risk);
        assert!((boosted - 1.0).abs() < f32::EPSILON);

        let penalized = adjustment(&chunk(&[], &["x", "y", "z"]), &risk);
        assert!((penalized + 1.0).abs() < f32::EPSILON);
    }
}

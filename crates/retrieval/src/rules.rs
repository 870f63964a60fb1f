//! Tag construction for the rule-based candidate set.
//!
//! Tags come from the current turn's symptoms plus the patient's known
//! chronic conditions, normalized and deduplicated in a stable order.

use std::collections::BTreeSet;

use carepod_core::patient::{RiskFactors, SymptomFeatureSet};

/// Build the lookup tags for one turn.
pub fn build_tags(features: &SymptomFeatureSet, risk: &RiskFactors) -> Vec<String> {
    let mut tags = BTreeSet::new();
    for symptom in &features.symptoms {
        tags.insert(symptom.name.trim().to_lowercase());
    }
    for condition in &risk.chronic_conditions {
        tags.insert(condition.trim().to_lowercase());
    }
    tags.into_iter().filter(|t| !t.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepod_core::patient::SymptomFeature;

    #[test]
    fn tags_combine_symptoms_and_conditions() {
        let features = SymptomFeatureSet::new(vec![
            SymptomFeature::new("Chest Pain", 8),
            SymptomFeature::new("nausea", 3),
        ]);
        let risk = RiskFactors {
            chronic_conditions: ["diabetes".to_string()].into(),
            ..Default::default()
        };

        let tags = build_tags(&features, &risk);
        assert_eq!(tags, vec!["chest pain", "diabetes", "nausea"]);
    }

    #[test]
    fn tags_deduplicate() {
        let features = SymptomFeatureSet::new(vec![SymptomFeature::new("asthma", 4)]);
        let risk = RiskFactors {
            chronic_conditions: ["Asthma".to_string()].into(),
            ..Default::default()
        };

        let tags = build_tags(&features, &risk);
        assert_eq!(tags, vec!["asthma"]);
    }

    #[test]
    fn empty_inputs_give_no_tags() {
        assert!(build_tags(&SymptomFeatureSet::default(), &RiskFactors::default()).is_empty());
    }
}

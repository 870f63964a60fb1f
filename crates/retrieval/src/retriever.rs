//! The hybrid retriever.
//!
//! Per turn: embed the query and search the index (vector set), look up
//! chunks by the turn's tags (rule set), merge by chunk id, apply the
//! personalization adjustment, and rank. The three sets are computed
//! independently; a chunk found by both paths carries both scores into the
//! fusion.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use carepod_config::RetrievalConfig;
use carepod_core::error::RetrievalError;
use carepod_core::knowledge::{KnowledgeIndex, ScoredChunk};
use carepod_core::patient::{RiskFactors, SymptomFeatureSet};

use crate::fusion::{rank, Candidate, FusionWeights};
use crate::personalize::adjustment;
use crate::rules::build_tags;

/// Overfetch factor for the component searches, so fusion has enough
/// candidates to re-rank before truncating to top-k.
const CANDIDATE_MULTIPLIER: usize = 3;

/// Patient context the retriever personalizes against.
#[derive(Debug, Clone, Default)]
pub struct RetrievalContext {
    pub features: SymptomFeatureSet,
    pub risk: RiskFactors,
}

/// The hybrid retriever over a knowledge index adapter.
pub struct HybridRetriever {
    index: Arc<dyn KnowledgeIndex>,
    config: RetrievalConfig,
}

impl HybridRetriever {
    pub fn new(index: Arc<dyn KnowledgeIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    /// Retrieve ranked guidance for a query in the given patient context.
    ///
    /// Returns at most `top_k` chunks. An empty result means no candidate
    /// cleared the relevance floor, which is a valid clinical outcome; index
    /// failures surface as errors for the orchestrator to degrade on.
    pub async fn retrieve(
        &self,
        query: &str,
        ctx: &RetrievalContext,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let fetch = self.config.top_k * CANDIDATE_MULTIPLIER;

        // Candidate set (a): vector similarity.
        let query_embedding = self.index.embed(query).await?;
        let vector_hits = self
            .index
            .similarity_search(&query_embedding, fetch)
            .await?;

        // Candidate set (b): rule-based tag lookup.
        let tags = build_tags(&ctx.features, &ctx.risk);
        let rule_hits = if tags.is_empty() {
            Vec::new()
        } else {
            self.index.find_by_tags(&tags, fetch).await?
        };

        debug!(
            vector = vector_hits.len(),
            rules = rule_hits.len(),
            tags = tags.len(),
            "Hybrid retrieval candidates"
        );

        // Merge by chunk id.
        let mut merged: HashMap<String, Candidate> = HashMap::new();
        for hit in vector_hits {
            merged.insert(
                hit.chunk.id.clone(),
                Candidate {
                    vector_score: hit.score,
                    rules_score: 0.0,
                    personal_adjustment: 0.0,
                    chunk: hit.chunk,
                },
            );
        }
        for chunk in rule_hits {
            merged
                .entry(chunk.id.clone())
                .and_modify(|c| c.rules_score = 1.0)
                .or_insert(Candidate {
                    chunk,
                    vector_score: 0.0,
                    rules_score: 1.0,
                    personal_adjustment: 0.0,
                });
        }

        // Candidate set (c): personalization re-weighting.
        for candidate in merged.values_mut() {
            candidate.personal_adjustment = adjustment(&candidate.chunk, &ctx.risk);
        }

        let results = rank(
            merged.into_values().collect(),
            FusionWeights::from_config(&self.config),
            self.config.relevance_floor,
            self.config.top_k,
        );

        debug!(returned = results.len(), "Hybrid retrieval ranked");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::InMemoryKnowledgeIndex;
    use carepod_core::knowledge::{ChunkMetadata, KnowledgeChunk};
    use carepod_core::patient::SymptomFeature;
    use chrono::Utc;

    fn chunk(id: &str, text: &str, conditions: &[&str], contraindications: &[&str]) -> KnowledgeChunk {
        KnowledgeChunk {
            id: id.into(),
            text: text.into(),
            metadata: ChunkMetadata {
                conditions: conditions.iter().map(|s| s.to_string()).collect(),
                contraindications: contraindications.iter().map(|s| s.to_string()).collect(),
                severity_class: 5,
                source: "test-corpus".into(),
                updated_at: Some(Utc::now()),
            },
        }
    }

    async fn seeded_index() -> Arc<InMemoryKnowledgeIndex> {
        let index = InMemoryKnowledgeIndex::new();
        index
            .insert_all([
                chunk(
                    "cardiac",
                    "Sudden chest pain with shortness of breath requires emergency assessment",
                    &["chest pain"],
                    &[],
                ),
                chunk(
                    "headache",
                    "Tension headache usually resolves with rest and hydration",
                    &["headache"],
                    &[],
                ),
                chunk(
                    "nsaid",
                    "Ibuprofen relieves headache and inflammation",
                    &["headache"],
                    &["ibuprofen"],
                ),
            ])
            .await;
        Arc::new(index)
    }

    fn ctx(symptom: &str) -> RetrievalContext {
        RetrievalContext {
            features: SymptomFeatureSet::new(vec![SymptomFeature::new(symptom, 5)]),
            risk: RiskFactors::default(),
        }
    }

    #[tokio::test]
    async fn retrieves_relevant_chunk_first() {
        let retriever = HybridRetriever::new(seeded_index().await, RetrievalConfig::default());

        let results = retriever
            .retrieve("sudden chest pain", &ctx("chest pain"))
            .await
            .unwrap();

        assert!(!results.is_empty());
        assert_eq!(results[0].chunk.id, "cardiac");
    }

    #[tokio::test]
    async fn output_bounded_by_top_k() {
        let retriever = HybridRetriever::new(
            seeded_index().await,
            RetrievalConfig {
                top_k: 1,
                ..Default::default()
            },
        );

        let results = retriever
            .retrieve("headache", &ctx("headache"))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn nonsense_query_returns_empty_not_error() {
        let retriever = HybridRetriever::new(
            seeded_index().await,
            RetrievalConfig {
                relevance_floor: 0.2,
                ..Default::default()
            },
        );

        let results = retriever
            .retrieve("zzzzqqq xyzzy", &RetrievalContext::default())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn stable_order_across_runs() {
        let retriever = HybridRetriever::new(seeded_index().await, RetrievalConfig::default());
        let ctx = ctx("headache");

        let first = retriever.retrieve("headache relief", &ctx).await.unwrap();
        let second = retriever.retrieve("headache relief", &ctx).await.unwrap();

        let ids = |r: &[ScoredChunk]| r.iter().map(|s| s.chunk.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first), ids(&second));
    }

    #[tokio::test]
    async fn contraindicated_chunk_sinks_but_survives() {
        let retriever = HybridRetriever::new(seeded_index().await, RetrievalConfig::default());
        let mut ctx = ctx("headache");
        ctx.risk.allergies.insert("ibuprofen".into());

        let results = retriever.retrieve("headache relief", &ctx).await.unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert!(ids.contains(&"nsaid"), "penalized chunk must not vanish");
        let nsaid_pos = ids.iter().position(|id| *id == "nsaid").unwrap();
        let headache_pos = ids.iter().position(|id| *id == "headache").unwrap();
        assert!(headache_pos < nsaid_pos, "contraindicated chunk should rank below");
    }

    #[tokio::test]
    async fn known_condition_boosts_rank() {
        let index = InMemoryKnowledgeIndex::new();
        index
            .insert_all([
                chunk("generic", "General guidance on intermittent dizziness", &[], &[]),
                chunk(
                    "diabetic",
                    "Guidance on intermittent dizziness for diabetes patients",
                    &["diabetes"],
                    &[],
                ),
            ])
            .await;
        let retriever = HybridRetriever::new(Arc::new(index), RetrievalConfig::default());

        let mut ctx = ctx("dizziness");
        ctx.risk.chronic_conditions.insert("diabetes".into());

        let results = retriever
            .retrieve("intermittent dizziness guidance", &ctx)
            .await
            .unwrap();
        assert_eq!(results[0].chunk.id, "diabetic");
    }

    #[tokio::test]
    async fn rule_hits_surface_without_text_overlap() {
        let retriever = HybridRetriever::new(seeded_index().await, RetrievalConfig::default());

        // The query text shares no words with the cardiac chunk; the tag
        // lookup must still surface it.
        let results = retriever
            .retrieve("it hurts", &ctx("chest pain"))
            .await
            .unwrap();
        assert!(results.iter().any(|r| r.chunk.id == "cardiac"));
    }
}

//! Weighted fusion of the three candidate scores.
//!
//! Relevance is the weighted sum of the vector and rule scores; the
//! personalization adjustment re-ranks on top of it. The relevance floor is
//! applied before personalization so a penalty can only move a chunk down
//! the list, never remove it.

use carepod_config::RetrievalConfig;
use carepod_core::knowledge::{KnowledgeChunk, ScoredChunk};

/// Weights for the three candidate components.
#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f32,
    pub rules: f32,
    pub personalization: f32,
}

impl FusionWeights {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            vector: config.vector_weight,
            rules: config.rules_weight,
            personalization: config.personalization_weight,
        }
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            vector: 1.0,
            rules: 1.0,
            personalization: 1.0,
        }
    }
}

/// One merged candidate before final ranking.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: KnowledgeChunk,
    /// Cosine similarity from the vector search, 0 when absent
    pub vector_score: f32,
    /// Rule-match score, 1.0 for a tag hit, 0 when absent
    pub rules_score: f32,
    /// Personalization adjustment in -1.0..=1.0
    pub personal_adjustment: f32,
}

/// Rank merged candidates deterministically.
///
/// Candidates whose relevance (vector + rules, weighted) misses the floor
/// are dropped; the survivors are ordered by final score, then corpus
/// recency (newer first), then chunk id. Running this twice on identical
/// input yields an identical order.
pub fn rank(
    candidates: Vec<Candidate>,
    weights: FusionWeights,
    relevance_floor: f32,
    top_k: usize,
) -> Vec<ScoredChunk> {
    let mut scored: Vec<ScoredChunk> = candidates
        .into_iter()
        .filter_map(|c| {
            let relevance = weights.vector * c.vector_score + weights.rules * c.rules_score;
            if relevance < relevance_floor {
                return None;
            }
            Some(ScoredChunk {
                score: relevance + weights.personalization * c.personal_adjustment,
                chunk: c.chunk,
            })
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.chunk
                    .metadata
                    .updated_at
                    .cmp(&a.chunk.metadata.updated_at)
            })
            .then_with(|| a.chunk.id.cmp(&b.chunk.id))
    });
    scored.truncate(top_k);
    scored
}

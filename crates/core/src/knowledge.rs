//! Knowledge index traits and chunk types.
//!
//! The clinical corpus lives behind the `KnowledgeIndex` adapter: a narrow,
//! read-only interface over a similarity-searchable document store. The
//! retriever never owns chunks, it only reads and re-ranks them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

/// Corpus metadata attached to every chunk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Condition tags this chunk is about (e.g. "angina", "migraine")
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,

    /// Severity class of the guidance, 0..=10
    #[serde(default)]
    pub severity_class: u8,

    /// Source attribution (guideline body, document name)
    #[serde(default)]
    pub source: String,

    /// Corpus recency, used as the first tie-breaker in ranking
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Medications/allergens this guidance is contraindicated for
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contraindications: Vec<String>,
}

/// One entry of the external clinical corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeChunk {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// A chunk with the relevance score a search or ranking step assigned it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: KnowledgeChunk,
    pub score: f32,
}

/// Text-to-vector embedding capability.
///
/// Split out from `KnowledgeIndex` because the memory store also embeds
/// episodic entries at append time without ever searching the corpus.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, RetrievalError>;
}

/// The knowledge index adapter.
///
/// Implementations wrap whatever vector store backs the corpus; the
/// in-memory implementation in `carepod-retrieval` backs tests and the CLI
/// demo.
#[async_trait]
pub trait KnowledgeIndex: Embedder {
    /// The adapter name (e.g. "in_memory").
    fn name(&self) -> &str;

    /// Rank corpus chunks by similarity to a query embedding.
    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> std::result::Result<Vec<ScoredChunk>, RetrievalError>;

    /// Look up chunks whose condition tags intersect the given tags.
    ///
    /// Backs the rule-based candidate set; matching is exact on normalized
    /// tag strings.
    async fn find_by_tags(
        &self,
        tags: &[String],
        top_k: usize,
    ) -> std::result::Result<Vec<KnowledgeChunk>, RetrievalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_serialization_roundtrip() {
        let chunk = KnowledgeChunk {
            id: "kc-001".into(),
            text: "Chest pain with dyspnea warrants immediate evaluation.".into(),
            metadata: ChunkMetadata {
                conditions: vec!["chest pain".into(), "angina".into()],
                severity_class: 9,
                source: "cardiology-guidelines".into(),
                updated_at: Some(Utc::now()),
                contraindications: vec![],
            },
        };
        let json = serde_json::to_string(&chunk).unwrap();
        let back: KnowledgeChunk = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, "kc-001");
        assert_eq!(back.metadata.conditions.len(), 2);
    }

    #[test]
    fn metadata_defaults_are_empty() {
        let meta: ChunkMetadata = serde_json::from_str("{}").unwrap();
        assert!(meta.conditions.is_empty());
        assert_eq!(meta.severity_class, 0);
        assert!(meta.updated_at.is_none());
    }
}

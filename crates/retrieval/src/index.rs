//! In-memory knowledge index.
//!
//! A test and demo double for the external vector store: chunks live in a
//! `RwLock`'d vector with embeddings computed at insert time by the
//! hashing embedder.

use async_trait::async_trait;
use tokio::sync::RwLock;

use carepod_core::error::RetrievalError;
use carepod_core::knowledge::{Embedder, KnowledgeChunk, KnowledgeIndex, ScoredChunk};
use carepod_memory::cosine_similarity;

use crate::embedding::HashingEmbedder;

struct IndexedChunk {
    chunk: KnowledgeChunk,
    embedding: Vec<f32>,
}

/// An in-memory similarity-searchable corpus.
pub struct InMemoryKnowledgeIndex {
    embedder: HashingEmbedder,
    chunks: RwLock<Vec<IndexedChunk>>,
}

impl InMemoryKnowledgeIndex {
    pub fn new() -> Self {
        Self {
            embedder: HashingEmbedder::new(),
            chunks: RwLock::new(Vec::new()),
        }
    }

    /// Insert a chunk, embedding its text together with its condition tags
    /// so tag words are searchable too.
    pub async fn insert(&self, chunk: KnowledgeChunk) {
        let text = format!("{} {}", chunk.text, chunk.metadata.conditions.join(" "));
        let embedding = self.embedder.embed_sync(&text);
        self.chunks
            .write()
            .await
            .push(IndexedChunk { chunk, embedding });
    }

    /// Bulk insert.
    pub async fn insert_all(&self, chunks: impl IntoIterator<Item = KnowledgeChunk>) {
        for chunk in chunks {
            self.insert(chunk).await;
        }
    }

    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

impl Default for InMemoryKnowledgeIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for InMemoryKnowledgeIndex {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embedder.embed_sync(text))
    }
}

#[async_trait]
impl KnowledgeIndex for InMemoryKnowledgeIndex {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let chunks = self.chunks.read().await;
        let mut scored: Vec<ScoredChunk> = chunks
            .iter()
            .map(|ic| ScoredChunk {
                chunk: ic.chunk.clone(),
                score: cosine_similarity(&ic.embedding, query_embedding),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn find_by_tags(
        &self,
        tags: &[String],
        top_k: usize,
    ) -> Result<Vec<KnowledgeChunk>, RetrievalError> {
        let normalized: Vec<String> = tags.iter().map(|t| t.to_lowercase()).collect();
        let chunks = self.chunks.read().await;

        let mut matched: Vec<&IndexedChunk> = chunks
            .iter()
            .filter(|ic| {
                ic.chunk
                    .metadata
                    .conditions
                    .iter()
                    .any(|c| normalized.contains(&c.to_lowercase()))
            })
            .collect();

        // Stable order: id ascending.
        matched.sort_by(|a, b| a.chunk.id.cmp(&b.chunk.id));
        Ok(matched
            .into_iter()
            .take(top_k)
            .map(|ic| ic.chunk.clone())
            .collect())
    }
}

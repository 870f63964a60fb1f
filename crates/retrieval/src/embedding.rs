//! Deterministic hashing embedder.
//!
//! Buckets word hashes into a fixed-dimension bag-of-words vector. Not a
//! semantic model, but fully deterministic, dependency-free, and good
//! enough for tests and the CLI demo corpus. A production deployment wires
//! a real embedding service through the same `Embedder` trait.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use carepod_core::error::RetrievalError;
use carepod_core::knowledge::Embedder;

/// Dimension of the hashed bag-of-words space.
const DEFAULT_DIM: usize = 128;

/// A deterministic token-hash embedder.
pub struct HashingEmbedder {
    dim: usize,
}

impl HashingEmbedder {
    pub fn new() -> Self {
        Self { dim: DEFAULT_DIM }
    }

    pub fn with_dim(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Synchronous embedding used internally by the in-memory index.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dim];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() as usize) % self.dim;
            vector[bucket] += 1.0;
        }
        // L2-normalize so cosine similarity behaves across text lengths.
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RetrievalError> {
        Ok(self.embed_sync(text))
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use carepod_memory::cosine_similarity;

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let embedder = HashingEmbedder::new();
        let a = embedder.embed("chest pain and dyspnea").await.unwrap();
        let b = embedder.embed("chest pain and dyspnea").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn identical_text_has_unit_similarity() {
        let embedder = HashingEmbedder::new();
        let a = embedder.embed("mild headache for two days").await.unwrap();
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn overlapping_text_scores_higher_than_disjoint() {
        let embedder = HashingEmbedder::new();
        let query = embedder.embed("chest pain pressure").await.unwrap();
        let related = embedder
            .embed("crushing chest pain with pressure radiating")
            .await
            .unwrap();
        let unrelated = embedder.embed("seasonal pollen allergy sneezing").await.unwrap();

        assert!(
            cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated)
        );
    }

    #[test]
    fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new();
        let v = embedder.embed_sync("");
        assert!(v.iter().all(|x| *x == 0.0));
    }

    #[test]
    fn single_char_tokens_ignored() {
        let embedder = HashingEmbedder::new();
        let v = embedder.embed_sync("a I x");
        assert!(v.iter().all(|x| *x == 0.0));
    }
}

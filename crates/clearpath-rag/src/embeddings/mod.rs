pub mod cache;
pub mod hash;

use anyhow::Result;

pub use cache::{CacheStats, QueryEmbeddingCache};
pub use hash::HashEmbedder;

/// Unified embedding model trait
pub trait EmbeddingModel: Send + Sync {
    /// Embed a search query. Implementations return a unit-normalized vector
    /// and must be deterministic for identical input.
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a document/passage for index construction
    fn embed_document(&self, text: &str) -> Result<Vec<f32>>;

    /// Batch embed documents for ingestion
    fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed_document(t)).collect()
    }

    /// Embedding vector dimension
    fn dimension(&self) -> usize;
}

/// Scale `vector` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Inner product of two equal-length vectors (cosine similarity when both are unit-normalized).
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

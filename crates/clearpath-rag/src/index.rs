//! Vector index boundary.
//!
//! The retriever only needs `search`: the top `k` `(score, id)` pairs sorted
//! by descending inner product, with missing slots padded by [`NO_MATCH`].
//! [`FlatIndex`] is an exact in-memory implementation of that contract.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::embeddings::{inner_product, l2_normalize, EmbeddingModel};
use crate::types::Corpus;

/// Sentinel id for an empty result slot.
pub const NO_MATCH: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f32,
    pub id: i64,
}

impl SearchHit {
    pub fn empty() -> Self {
        Self {
            score: f32::MIN,
            id: NO_MATCH,
        }
    }

    pub fn is_match(&self) -> bool {
        self.id != NO_MATCH
    }
}

pub trait VectorIndex: Send + Sync {
    /// Top `k` hits by descending inner product. May pad with [`SearchHit::empty`].
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>>;

    /// Number of indexed vectors
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dimension(&self) -> usize;
}

/// Brute-force inner-product index over unit-normalized vectors.
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    /// Embed every corpus entry with `model` and index it under its position.
    pub fn build(corpus: &Corpus, model: &dyn EmbeddingModel) -> Result<Self> {
        let mut index = Self::new(model.dimension());
        let embeddings = model.embed_documents(&corpus.texts())?;
        for vector in embeddings {
            index.add(vector)?;
        }
        tracing::info!(
            vectors = index.len(),
            dimension = index.dimension,
            "Built flat inner-product index"
        );
        Ok(index)
    }

    /// Normalize and append a vector; its id is its position.
    pub fn add(&mut self, mut vector: Vec<f32>) -> Result<i64> {
        if vector.len() != self.dimension {
            return Err(anyhow!(
                "vector dimension {} does not match index dimension {}",
                vector.len(),
                self.dimension
            ));
        }
        l2_normalize(&mut vector);
        self.vectors.push(vector);
        Ok(self.vectors.len() as i64 - 1)
    }
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(anyhow!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.dimension
            ));
        }

        let mut hits: Vec<SearchHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(id, v)| SearchHit {
                score: inner_product(query, v),
                id: id as i64,
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits.resize(k, SearchHit::empty());
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_orders_by_descending_score() {
        let mut index = FlatIndex::new(2);
        index.add(vec![1.0, 0.0]).unwrap();
        index.add(vec![0.0, 1.0]).unwrap();
        index.add(vec![1.0, 1.0]).unwrap();

        let hits = index.search(&[1.0, 0.0], 3).unwrap();
        let ids: Vec<i64> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![0, 2, 1]);
        assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_pads_with_sentinel_when_short() {
        let mut index = FlatIndex::new(2);
        index.add(vec![1.0, 0.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], 5).unwrap();
        assert_eq!(hits.len(), 5);
        assert!(hits[0].is_match());
        assert!(hits[1..].iter().all(|h| h.id == NO_MATCH));
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let mut index = FlatIndex::new(3);
        assert!(index.add(vec![1.0]).is_err());
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_add_normalizes() {
        let mut index = FlatIndex::new(2);
        index.add(vec![10.0, 0.0]).unwrap();
        let hits = index.search(&[1.0, 0.0], 1).unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}

//! Cached similarity retrieval
//!
//! Embeds the query (through the LRU cache), asks the vector index for the
//! top K candidates and keeps the ones at or above the similarity threshold,
//! in the index's order.

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embeddings::{EmbeddingModel, QueryEmbeddingCache};
use crate::error::{RagError, RagResult};
use crate::index::VectorIndex;
use crate::types::{Corpus, PassageRecord};

/// Retrieval result plus the bookkeeping the pipeline logs.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOutcome {
    pub passages: Vec<PassageRecord>,
    pub cache_hit: bool,
    /// Real (non-sentinel) candidates the index returned.
    pub candidates: usize,
    pub below_threshold: usize,
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingModel>,
    cache: Arc<QueryEmbeddingCache>,
    top_k: usize,
    similarity_threshold: f32,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, config: &RetrievalConfig) -> Self {
        let cache = Arc::new(QueryEmbeddingCache::new(config.cache_capacity));
        Self::with_cache(embedder, cache, config)
    }

    /// Share an existing cache (e.g. one cache across several retrievers).
    pub fn with_cache(
        embedder: Arc<dyn EmbeddingModel>,
        cache: Arc<QueryEmbeddingCache>,
        config: &RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            cache,
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
        }
    }

    pub fn cache(&self) -> &QueryEmbeddingCache {
        &self.cache
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    pub fn retrieve(
        &self,
        query: &str,
        index: &dyn VectorIndex,
        corpus: &Corpus,
    ) -> RagResult<Vec<PassageRecord>> {
        Ok(self.retrieve_detailed(query, index, corpus)?.passages)
    }

    pub fn retrieve_detailed(
        &self,
        query: &str,
        index: &dyn VectorIndex,
        corpus: &Corpus,
    ) -> RagResult<RetrievalOutcome> {
        if index.is_empty() {
            tracing::debug!("Vector index is empty, nothing to retrieve");
            return Ok(RetrievalOutcome::default());
        }

        let embedding = self.cache.get_or_embed(query, self.embedder.as_ref())?;

        let hits = index
            .search(&embedding.vector, self.top_k)
            .map_err(RagError::Index)?;

        let mut outcome = RetrievalOutcome {
            cache_hit: embedding.hit,
            ..RetrievalOutcome::default()
        };

        for hit in hits.iter().filter(|h| h.is_match()) {
            let Some(entry) = corpus.get(hit.id) else {
                tracing::warn!(
                    id = hit.id,
                    corpus_len = corpus.len(),
                    "Index returned id outside corpus"
                );
                continue;
            };
            outcome.candidates += 1;

            if hit.score.is_nan() || hit.score < self.similarity_threshold {
                outcome.below_threshold += 1;
                continue;
            }
            if outcome.passages.len() == self.top_k {
                break;
            }

            outcome.passages.push(PassageRecord {
                id: entry.id,
                document_name: entry.document_name.clone(),
                text: entry.text.clone(),
                similarity_score: round_score(hit.score),
            });
        }

        tracing::debug!(
            cache_hit = outcome.cache_hit,
            candidates = outcome.candidates,
            kept = outcome.passages.len(),
            threshold = self.similarity_threshold,
            "Retrieved passages above threshold"
        );

        Ok(outcome)
    }
}

fn round_score(score: f32) -> f32 {
    (score * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::index::{FlatIndex, SearchHit};
    use crate::test_support::{
        sample_corpus, CountingEmbedder, FailingEmbedder, FailingIndex, ScriptedIndex,
        UncappedIndex,
    };

    fn config() -> RetrievalConfig {
        RetrievalConfig::default()
    }

    fn hit(score: f32, id: i64) -> SearchHit {
        SearchHit { score, id }
    }

    #[test]
    fn test_filters_threshold_skips_sentinels_and_rounds() {
        let corpus = sample_corpus();
        let index = ScriptedIndex::new(vec![
            hit(0.912_345_6, 2),
            hit(0.25, 0),
            hit(0.249_9, 1),
            SearchHit::empty(),
            SearchHit::empty(),
        ]);
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(8)), &config());

        let outcome = retriever
            .retrieve_detailed("pricing", &index, &corpus)
            .unwrap();
        let scores: Vec<f32> = outcome.passages.iter().map(|p| p.similarity_score).collect();
        let ids: Vec<u64> = outcome.passages.iter().map(|p| p.id).collect();

        assert_eq!(ids, vec![2, 0]);
        assert_eq!(scores, vec![0.9123, 0.25]);
        assert_eq!(outcome.candidates, 3);
        assert_eq!(outcome.below_threshold, 1);
        assert_eq!(
            outcome.passages[0].document_name,
            corpus.get(2).unwrap().document_name
        );
    }

    #[test]
    fn test_never_more_than_top_k() {
        let corpus = sample_corpus();
        let hits = (0..corpus.len() as i64).map(|id| hit(0.9, id)).collect();
        let index = ScriptedIndex::new(hits);
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(8)), &config());

        let passages = retriever.retrieve("anything", &index, &corpus).unwrap();
        assert!(corpus.len() > 5);
        assert_eq!(passages.len(), 5);
    }

    #[test]
    fn test_nan_score_is_dropped() {
        let corpus = sample_corpus();
        let index = ScriptedIndex::new(vec![hit(f32::NAN, 0), hit(0.7, 1)]);
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(8)), &config());

        let outcome = retriever.retrieve_detailed("q", &index, &corpus).unwrap();
        let ids: Vec<u64> = outcome.passages.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![1]);
        assert_eq!(outcome.below_threshold, 1);
        assert!(outcome.passages.iter().all(|p| p.similarity_score >= 0.25));
    }

    #[test]
    fn test_caps_results_when_index_returns_more_than_k() {
        let corpus = sample_corpus();
        let hits = (0..corpus.len() as i64).map(|id| hit(0.9, id)).collect();
        let index = UncappedIndex::new(hits);
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(8)), &config());

        let passages = retriever.retrieve("anything", &index, &corpus).unwrap();
        let ids: Vec<u64> = passages.iter().map(|p| p.id).collect();
        assert_eq!(corpus.len(), 7);
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_out_of_range_id_skipped() {
        let corpus = sample_corpus();
        let index = ScriptedIndex::new(vec![hit(0.99, 10_000), hit(0.8, 1)]);
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(8)), &config());
        let passages = retriever.retrieve("q", &index, &corpus).unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].id, 1);
    }

    #[test]
    fn test_empty_index_returns_empty_without_embedding() {
        let embedder = Arc::new(CountingEmbedder::new(16));
        let retriever = Retriever::new(embedder.clone(), &config());
        let index = FlatIndex::new(16);
        let passages = retriever
            .retrieve("How do I reset my password?", &index, &Corpus::default())
            .unwrap();
        assert!(passages.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[test]
    fn test_repeat_query_hits_cache_with_identical_scores() {
        let corpus = sample_corpus();
        let embedder = Arc::new(CountingEmbedder::new(256));
        let index = FlatIndex::build(&corpus, embedder.as_ref()).unwrap();
        embedder.reset();
        let retriever = Retriever::new(embedder.clone(), &config());

        let first = retriever
            .retrieve_detailed("How much does the Pro plan cost?", &index, &corpus)
            .unwrap();
        let second = retriever
            .retrieve_detailed("  how much does the PRO plan cost?", &index, &corpus)
            .unwrap();

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.passages, second.passages);
        assert_eq!(embedder.calls(), 1);
        assert!(!first.passages.is_empty());
        assert_eq!(first.passages[0].document_name, "14_Pricing_Sheet.pdf");
    }

    #[test]
    fn test_threshold_and_k_hold_for_any_query() {
        let corpus = sample_corpus();
        let embedder = Arc::new(HashEmbedder::new(64));
        let index = FlatIndex::build(&corpus, embedder.as_ref()).unwrap();
        let retriever = Retriever::new(embedder, &config());

        let queries = [
            "",
            "pricing",
            "pro plan cost per month",
            "keyboard shortcuts",
            "reset password account",
            "What is the weather today?",
            "slack jira github integrations catalog",
            "!!!",
        ];
        for q in queries {
            let passages = retriever.retrieve(q, &index, &corpus).unwrap();
            assert!(passages.len() <= 5, "query {:?}", q);
            assert!(
                passages.iter().all(|p| p.similarity_score >= 0.25),
                "query {:?}",
                q
            );
        }
    }

    #[test]
    fn test_embedding_failure_propagates() {
        let corpus = sample_corpus();
        let index = ScriptedIndex::new(vec![hit(0.9, 0)]);
        let retriever = Retriever::new(Arc::new(FailingEmbedder), &config());
        let err = retriever.retrieve("q", &index, &corpus).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[test]
    fn test_index_failure_propagates() {
        let corpus = sample_corpus();
        let retriever = Retriever::new(Arc::new(HashEmbedder::new(8)), &config());
        let err = retriever.retrieve("q", &FailingIndex, &corpus).unwrap_err();
        assert!(matches!(err, RagError::Index(_)));
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.123_456), 0.1235);
        assert_eq!(round_score(1.0), 1.0);
    }
}

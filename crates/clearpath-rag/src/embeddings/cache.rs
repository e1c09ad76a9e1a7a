//! Bounded LRU cache of query embeddings.
//!
//! Keys are blake3 digests of the trimmed, lower-cased query, so repeated
//! questions that differ only in case or surrounding whitespace share one
//! entry. The lock covers only the map operations: the embedding call itself
//! runs outside the critical section.

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::EmbeddingModel;
use crate::error::{RagError, RagResult};

pub const DEFAULT_CACHE_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub len: usize,
    pub capacity: usize,
}

/// Embedding produced by [`QueryEmbeddingCache::get_or_embed`].
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub vector: Vec<f32>,
    pub hit: bool,
}

pub struct QueryEmbeddingCache {
    entries: Mutex<LruCache<String, Vec<f32>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl QueryEmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Stable key for a query: blake3 hex digest of the normalized text.
    pub fn cache_key(query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        blake3::hash(normalized.as_bytes()).to_hex().to_string()
    }

    /// Look up a key and mark it most recently used.
    ///
    /// Entries that are empty, contain non-finite values or do not have
    /// `expected_dim` components are dropped and reported as a miss.
    pub fn get(&self, key: &str, expected_dim: usize) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock();
        let vector = entries.get(key)?;
        if is_well_formed(vector, expected_dim) {
            return Some(vector.clone());
        }
        let found_dim = vector.len();
        entries.pop(key);
        tracing::warn!(
            key = %key,
            expected_dim,
            found_dim,
            "Discarding malformed cached embedding"
        );
        None
    }

    /// Insert a vector unless the key is already present.
    ///
    /// Returns the vector now stored under `key`; if another caller inserted
    /// first, its vector wins and is returned.
    pub fn insert(&self, key: String, vector: Vec<f32>) -> Vec<f32> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(&key) {
            return existing.clone();
        }
        if let Some((evicted, _)) = entries.push(key, vector.clone()) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(evicted = %evicted, "Evicted least recently used query embedding");
        }
        vector
    }

    /// Return the cached embedding for `query`, computing it with `model` on a miss.
    pub fn get_or_embed(
        &self,
        query: &str,
        model: &dyn EmbeddingModel,
    ) -> RagResult<CachedEmbedding> {
        let key = Self::cache_key(query);

        if let Some(vector) = self.get(&key, model.dimension()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, "Query embedding cache hit");
            return Ok(CachedEmbedding { vector, hit: true });
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = model.embed_query(query).map_err(RagError::Embedding)?;
        let vector = self.insert(key, vector);
        Ok(CachedEmbedding { vector, hit: false })
    }

    /// Whether `query` is cached. Does not touch recency.
    pub fn contains(&self, query: &str) -> bool {
        self.entries.lock().contains(&Self::cache_key(query))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

impl Default for QueryEmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

fn is_well_formed(vector: &[f32], expected_dim: usize) -> bool {
    !vector.is_empty() && vector.len() == expected_dim && vector.iter().all(|x| x.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CountingEmbedder, FailingEmbedder};
    use std::sync::Arc;

    #[test]
    fn test_key_normalizes_case_and_whitespace() {
        assert_eq!(
            QueryEmbeddingCache::cache_key("  Pro Plan Price "),
            QueryEmbeddingCache::cache_key("pro plan price")
        );
        assert_ne!(
            QueryEmbeddingCache::cache_key("pro plan"),
            QueryEmbeddingCache::cache_key("pro plans")
        );
    }

    #[test]
    fn test_hit_skips_embedding_call() {
        let cache = QueryEmbeddingCache::new(4);
        let model = CountingEmbedder::new(8);

        let first = cache.get_or_embed("How much is Pro?", &model).unwrap();
        let second = cache.get_or_embed("how much is pro?  ", &model).unwrap();

        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(first.vector, second.vector);
        assert_eq!(model.calls(), 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_evicts_first_inserted_when_full() {
        let cache = QueryEmbeddingCache::new(3);
        let model = CountingEmbedder::new(4);
        for q in ["q0", "q1", "q2", "q3"] {
            cache.get_or_embed(q, &model).unwrap();
        }
        assert!(!cache.contains("q0"));
        assert!(cache.contains("q1"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_hit_refreshes_recency() {
        let cache = QueryEmbeddingCache::new(3);
        let model = CountingEmbedder::new(4);
        for q in ["q0", "q1", "q2"] {
            cache.get_or_embed(q, &model).unwrap();
        }
        // touch the oldest entry, then overflow
        cache.get_or_embed("q0", &model).unwrap();
        cache.get_or_embed("q3", &model).unwrap();

        assert!(cache.contains("q0"));
        assert!(!cache.contains("q1"));
        assert!(cache.contains("q2"));
        assert!(cache.contains("q3"));
    }

    #[test]
    fn test_embedding_failure_propagates_and_caches_nothing() {
        let cache = QueryEmbeddingCache::new(4);
        let err = cache.get_or_embed("anything", &FailingEmbedder).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_malformed_entry_is_recomputed() {
        let cache = QueryEmbeddingCache::new(4);
        let model = CountingEmbedder::new(4);
        let key = QueryEmbeddingCache::cache_key("broken");
        cache.entries.lock().put(key.clone(), vec![f32::NAN, 0.0]);

        let result = cache.get_or_embed("broken", &model).unwrap();
        assert!(!result.hit);
        assert_eq!(result.vector.len(), 4);
        assert_eq!(model.calls(), 1);
        assert_eq!(cache.get(&key, 4), Some(result.vector));
    }

    #[test]
    fn test_first_insert_wins() {
        let cache = QueryEmbeddingCache::new(4);
        let key = QueryEmbeddingCache::cache_key("q");
        cache.insert(key.clone(), vec![1.0, 0.0]);
        let stored = cache.insert(key.clone(), vec![0.0, 1.0]);
        assert_eq!(stored, vec![1.0, 0.0]);
    }

    /// Reads the cache from inside `embed_query`; blocks forever if the
    /// caller still holds the cache lock.
    struct ReentrantEmbedder {
        cache: Arc<QueryEmbeddingCache>,
        inner: CountingEmbedder,
    }

    impl EmbeddingModel for ReentrantEmbedder {
        fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            let _ = self.cache.len();
            let _ = self.cache.stats();
            self.inner.embed_query(text)
        }

        fn embed_document(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            self.inner.embed_document(text)
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
    }

    #[test]
    fn test_embedding_runs_without_cache_lock_held() {
        let cache = Arc::new(QueryEmbeddingCache::new(4));
        let model = ReentrantEmbedder {
            cache: Arc::clone(&cache),
            inner: CountingEmbedder::new(4),
        };

        let (tx, rx) = std::sync::mpsc::channel();
        let worker_cache = Arc::clone(&cache);
        std::thread::spawn(move || {
            let first = worker_cache.get_or_embed("reset password", &model).map(|e| e.hit);
            let second = worker_cache.get_or_embed("reset password", &model).map(|e| e.hit);
            let _ = tx.send((first.is_ok_and(|hit| !hit), second.is_ok_and(|hit| hit)));
        });

        let (miss, hit) = rx
            .recv_timeout(std::time::Duration::from_secs(5))
            .expect("get_or_embed deadlocked while embedding");
        assert!(miss);
        assert!(hit);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_access_stays_bounded() {
        let cache = Arc::new(QueryEmbeddingCache::new(16));
        let model = Arc::new(CountingEmbedder::new(4));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                let model = Arc::clone(&model);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let q = format!("query {}", (t * 7 + i) % 40);
                        cache.get_or_embed(&q, model.as_ref()).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.len, 16);
        assert_eq!(stats.hits + stats.misses, 400);
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// A retrieved passage annotated with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageRecord {
    #[serde(rename = "chunk_id")]
    pub id: u64,
    pub document_name: String,
    pub text: String,
    /// Inner product with the query vector, rounded to 4 decimals.
    pub similarity_score: f32,
}

/// One chunk of the corpus as produced by the (external) index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusEntry {
    #[serde(alias = "chunk_id")]
    pub id: u64,
    pub document_name: String,
    pub text: String,
}

/// Ordered chunk metadata. Position `i` corresponds to vector id `i` in the
/// index built over the same chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
}

impl Corpus {
    pub fn new(entries: Vec<CorpusEntry>) -> Self {
        Self { entries }
    }

    /// Parse the `[{"chunk_id", "document_name", "text"}, ...]` layout.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let corpus = Self::from_json(&content)?;
        tracing::info!(path = %path.display(), chunks = corpus.len(), "Loaded corpus metadata");
        Ok(corpus)
    }

    /// Resolve an index id. Negative (sentinel) and out-of-range ids yield `None`.
    pub fn get(&self, index_id: i64) -> Option<&CorpusEntry> {
        usize::try_from(index_id)
            .ok()
            .and_then(|idx| self.entries.get(idx))
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn texts(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

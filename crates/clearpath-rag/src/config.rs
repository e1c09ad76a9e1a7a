use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::embeddings::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::ConfigError;
use crate::memory::MemoryConfig;
use crate::rag::evaluator::EvaluationPolicy;
use crate::rag::prompt::SYSTEM_PROMPT;
use crate::rag::router::{ModelTable, RoutingPolicy};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub retrieval: RetrievalConfig,
    pub routing: RoutingPolicy,
    pub models: ModelTable,
    pub evaluation: EvaluationPolicy,
    pub memory: MemoryConfig,
    pub generation: GenerationConfig,
    pub harness: HarnessConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Candidates with a raw inner product below this are dropped.
    pub similarity_threshold: f32,
    pub cache_capacity: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            similarity_threshold: 0.25,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: usize,
    pub system_prompt: String,
    /// Longest accepted query, in characters.
    pub max_query_chars: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            system_prompt: SYSTEM_PROMPT.to_string(),
            max_query_chars: 2000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Pause between eval cases, for rate-limited providers.
    pub case_delay_ms: u64,
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.retrieval.top_k == 0 {
            return invalid("retrieval.top_k must be > 0");
        }
        if self.retrieval.cache_capacity == 0 {
            return invalid("retrieval.cache_capacity must be > 0");
        }
        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return invalid("retrieval.similarity_threshold must be in [-1.0, 1.0]");
        }
        if !(0.0..=1.0).contains(&self.evaluation.overlap_threshold) {
            return invalid("evaluation.overlap_threshold must be in [0.0, 1.0]");
        }
        if self.routing.short_query_words > self.routing.long_query_words {
            return invalid("routing.short_query_words must be <= long_query_words");
        }
        if self.models.simple.trim().is_empty() || self.models.complex.trim().is_empty() {
            return invalid("models.simple and models.complex must be non-empty");
        }
        if self.memory.max_pairs == 0 {
            return invalid("memory.max_pairs must be > 0");
        }
        if self.generation.max_query_chars == 0 {
            return invalid("generation.max_query_chars must be > 0");
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return invalid("generation.temperature must be in [0.0, 2.0]");
        }
        if self.generation.max_tokens == 0 {
            return invalid("generation.max_tokens must be > 0");
        }
        Ok(())
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// `<config dir>/clearpath-rag/config.json`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("clearpath-rag")
            .join("config.json")
    }

    /// Read the file at `path` (or [`default_path`](Self::default_path)) when it
    /// exists; otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if path.exists() {
            tracing::info!(path = %path.display(), "Loading configuration");
            Self::from_file(&path)
        } else {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }
}

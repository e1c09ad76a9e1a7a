pub mod config;
pub mod embeddings;
pub mod error;
pub mod harness;
pub mod index;
pub mod llm;
pub mod memory;
pub mod pipeline;
pub mod rag;
pub mod retrieval;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export primary types for convenience
pub use config::{GenerationConfig, HarnessConfig, RagConfig, RetrievalConfig};
pub use embeddings::{CacheStats, EmbeddingModel, HashEmbedder, QueryEmbeddingCache};
pub use error::{ConfigError, RagError, RagResult};
pub use harness::{builtin_cases, format_report, run_cases, EvalCase, EvalReport, Expectations};
pub use index::{FlatIndex, SearchHit, VectorIndex, NO_MATCH};
pub use llm::{ChatMessage, Generation, GenerationRequest, Generator, Role};
pub use memory::{ConversationMemory, MemoryConfig, MemoryStats};
pub use pipeline::{ChatRequest, ChatResponse, DebugInfo, Health, Pipeline, SourceInfo};
pub use rag::{
    Classification, ClassificationResult, ComplexityClassifier, Confidence, EvaluationResult,
    QualityFlag, ResponseEvaluator,
};
pub use retrieval::{RetrievalOutcome, Retriever};
pub use types::{Corpus, CorpusEntry, PassageRecord};

// Re-export common types
pub use anyhow::{Error, Result};

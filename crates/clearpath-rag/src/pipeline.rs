//! Request pipeline: retrieve, route, generate, evaluate, remember.
//!
//! A [`Pipeline`] owns every component and is shared behind an `Arc`; the
//! only per-request mutable state is the embedding cache and the
//! conversation memory, each behind its own lock.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{GenerationConfig, RagConfig};
use crate::embeddings::EmbeddingModel;
use crate::error::{RagError, RagResult};
use crate::index::VectorIndex;
use crate::llm::{GenerationRequest, Generator};
use crate::memory::ConversationMemory;
use crate::rag::evaluator::{Confidence, QualityFlag, ResponseEvaluator};
use crate::rag::prompt::{build_context, build_messages};
use crate::rag::router::{Classification, ComplexityClassifier, Signal};
use crate::retrieval::Retriever;
use crate::types::{Corpus, PassageRecord};

pub const DEFAULT_SESSION: &str = "default";

fn default_session() -> String {
    DEFAULT_SESSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default = "default_session")]
    pub session_id: String,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: default_session(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    pub chunk_id: u64,
    pub document_name: String,
    pub similarity_score: f32,
}

impl From<&PassageRecord> for SourceInfo {
    fn from(passage: &PassageRecord) -> Self {
        Self {
            chunk_id: passage.id,
            document_name: passage.document_name.clone(),
            similarity_score: passage.similarity_score,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DebugInfo {
    pub classification: Classification,
    pub model_used: String,
    pub complex_score: i32,
    pub signals: Vec<Signal>,
    pub tokens_input: usize,
    pub tokens_output: usize,
    pub latency_ms: f64,
    pub confidence: Confidence,
    pub flags: Vec<QualityFlag>,
}

impl DebugInfo {
    /// Human-readable flag forms, e.g. `no_context`.
    pub fn flag_strings(&self) -> Vec<String> {
        self.flags.iter().map(ToString::to_string).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceInfo>,
    pub debug: DebugInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub index_size: usize,
    pub chunks_loaded: usize,
}

pub struct Pipeline {
    retriever: Retriever,
    index: Arc<dyn VectorIndex>,
    corpus: Arc<Corpus>,
    classifier: ComplexityClassifier,
    evaluator: ResponseEvaluator,
    memory: ConversationMemory,
    generator: Arc<dyn Generator>,
    generation: GenerationConfig,
}

impl Pipeline {
    /// Validate `config` and wire the components around the given collaborators.
    pub fn from_config(
        config: &RagConfig,
        embedder: Arc<dyn EmbeddingModel>,
        index: Arc<dyn VectorIndex>,
        corpus: Arc<Corpus>,
        generator: Arc<dyn Generator>,
    ) -> RagResult<Self> {
        config.validate()?;

        if index.len() != corpus.len() {
            tracing::warn!(
                index_size = index.len(),
                chunks_loaded = corpus.len(),
                "Index and corpus sizes differ"
            );
        }

        let classifier =
            ComplexityClassifier::new(config.routing.clone(), config.models.clone())?;

        tracing::info!(
            index_size = index.len(),
            chunks_loaded = corpus.len(),
            top_k = config.retrieval.top_k,
            simple_model = %config.models.simple,
            complex_model = %config.models.complex,
            "Pipeline ready"
        );

        Ok(Self {
            retriever: Retriever::new(embedder, &config.retrieval),
            index,
            corpus,
            classifier,
            evaluator: ResponseEvaluator::new(config.evaluation.clone()),
            memory: ConversationMemory::new(&config.memory),
            generator,
            generation: config.generation.clone(),
        })
    }

    pub async fn answer(&self, request: ChatRequest) -> RagResult<ChatResponse> {
        let query = self.validate(&request)?;
        let session_id = request.session_id.as_str();

        let retrieval = self
            .retriever
            .retrieve_detailed(query, self.index.as_ref(), &self.corpus)?;
        let passages = retrieval.passages;

        let routing = self.classifier.classify(query);

        let context = build_context(&passages);
        let history = self.memory.history(session_id);
        let messages = build_messages(&self.generation.system_prompt, &history, &context, query);

        let started = Instant::now();
        let generation = self
            .generator
            .generate(GenerationRequest {
                model: routing.model_used.clone(),
                messages,
                temperature: self.generation.temperature,
                max_tokens: self.generation.max_tokens,
            })
            .await
            .map_err(RagError::Generation)?;
        let latency_ms = round_latency(started.elapsed().as_secs_f64() * 1000.0);

        let evaluation = self.evaluator.evaluate(&generation.response, &passages);

        self.memory.record(session_id, query, &evaluation.response);

        tracing::info!(
            query = %query,
            session_id = %session_id,
            classification = %routing.classification,
            model_used = %routing.model_used,
            complex_score = routing.complex_score,
            tokens_input = generation.tokens_input,
            tokens_output = generation.tokens_output,
            latency_ms,
            confidence = %evaluation.confidence,
            flags = ?evaluation.flag_strings(),
            num_sources = passages.len(),
            cache_hit = retrieval.cache_hit,
            "Chat request handled"
        );

        Ok(ChatResponse {
            response: evaluation.response,
            sources: passages.iter().map(SourceInfo::from).collect(),
            debug: DebugInfo {
                classification: routing.classification,
                model_used: routing.model_used,
                complex_score: routing.complex_score,
                signals: routing.signals,
                tokens_input: generation.tokens_input,
                tokens_output: generation.tokens_output,
                latency_ms,
                confidence: evaluation.confidence,
                flags: evaluation.flags,
            },
        })
    }

    pub fn health(&self) -> Health {
        Health {
            status: "ok",
            index_size: self.index.len(),
            chunks_loaded: self.corpus.len(),
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn classifier(&self) -> &ComplexityClassifier {
        &self.classifier
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }

    /// Trimmed query, or why the request is rejected.
    fn validate<'a>(&self, request: &'a ChatRequest) -> RagResult<&'a str> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(RagError::InvalidRequest("query must not be empty".to_string()));
        }
        let chars = query.chars().count();
        if chars > self.generation.max_query_chars {
            return Err(RagError::InvalidRequest(format!(
                "query is {} characters, limit is {}",
                chars, self.generation.max_query_chars
            )));
        }
        Ok(query)
    }
}

fn round_latency(ms: f64) -> f64 {
    (ms * 10.0).round() / 10.0
}

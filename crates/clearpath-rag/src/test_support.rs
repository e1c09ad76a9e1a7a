//! Test doubles shared by the unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::{EmbeddingModel, HashEmbedder};
use crate::index::{SearchHit, VectorIndex};
use crate::llm::{Generation, GenerationRequest, Generator};
use crate::types::{Corpus, CorpusEntry};

/// Hash embedder that counts query embeddings.
pub struct CountingEmbedder {
    inner: HashEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            inner: HashEmbedder::new(dimension),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.calls.store(0, Ordering::SeqCst);
    }
}

impl EmbeddingModel for CountingEmbedder {
    fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed_query(text)
    }

    fn embed_document(&self, text: &str) -> Result<Vec<f32>> {
        self.inner.embed_document(text)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

pub struct FailingEmbedder;

impl EmbeddingModel for FailingEmbedder {
    fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding backend unavailable"))
    }

    fn embed_document(&self, _text: &str) -> Result<Vec<f32>> {
        Err(anyhow!("embedding backend unavailable"))
    }

    fn dimension(&self) -> usize {
        4
    }
}

/// Returns the same hits for every query.
pub struct ScriptedIndex {
    hits: Vec<SearchHit>,
}

impl ScriptedIndex {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

impl VectorIndex for ScriptedIndex {
    fn search(&self, _query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let mut hits = self.hits.clone();
        hits.truncate(k);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.hits.iter().filter(|h| h.is_match()).count()
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// Ignores `k` and returns every scripted hit.
pub struct UncappedIndex {
    hits: Vec<SearchHit>,
}

impl UncappedIndex {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

impl VectorIndex for UncappedIndex {
    fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }

    fn len(&self) -> usize {
        self.hits.len()
    }

    fn dimension(&self) -> usize {
        0
    }
}

pub struct FailingIndex;

impl VectorIndex for FailingIndex {
    fn search(&self, _query: &[f32], _k: usize) -> Result<Vec<SearchHit>> {
        Err(anyhow!("index file is corrupt"))
    }

    fn len(&self) -> usize {
        1
    }

    fn dimension(&self) -> usize {
        0
    }
}

/// Replies with a fixed answer and records every request it receives.
pub struct ScriptedGenerator {
    response: String,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<Generation> {
        let tokens_input = request
            .messages
            .iter()
            .map(|m| m.content.split_whitespace().count())
            .sum();
        self.requests.lock().push(request);
        Ok(Generation {
            response: self.response.clone(),
            tokens_input,
            tokens_output: self.response.split_whitespace().count(),
        })
    }
}

pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    async fn generate(&self, _request: GenerationRequest) -> Result<Generation> {
        Err(anyhow!("provider returned 503"))
    }
}

/// Small corpus modelled on the product documentation set.
pub fn sample_corpus() -> Corpus {
    let chunks = [
        (
            "01_Getting_Started.pdf",
            "Welcome to Clearpath. Create your first project from the dashboard and invite teammates.",
        ),
        (
            "05_Account_Security.pdf",
            "To reset your password open Settings, choose Security, and click Reset password.",
        ),
        (
            "14_Pricing_Sheet.pdf",
            "How much does the Pro plan cost? The Pro plan costs $49/month per user.",
        ),
        (
            "11_Keyboard_Shortcuts.pdf",
            "Press Ctrl+K to open search. Press C to create a task and G then P for projects.",
        ),
        (
            "09_Integrations_Catalog.pdf",
            "Clearpath integrates with Slack, Jira, GitHub and Google Drive.",
        ),
        (
            "07_Mobile_App.pdf",
            "The mobile app supports offline mode on iOS and Android devices.",
        ),
        (
            "12_Data_Export.pdf",
            "Workspace admins can export tasks to CSV or JSON from the admin console.",
        ),
    ];
    Corpus::new(
        chunks
            .iter()
            .enumerate()
            .map(|(i, (doc, text))| CorpusEntry {
                id: i as u64,
                document_name: doc.to_string(),
                text: text.to_string(),
            })
            .collect(),
    )
}

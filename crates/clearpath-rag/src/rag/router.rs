//! Deterministic complexity router
//!
//! Scores a query with a fixed, ordered set of weighted signals and routes it
//! to the cheap or the expensive generation tier. Every signal that fires is
//! recorded with its measured value, so a caller can see exactly how the
//! score was built. Positive and negative signals are additive; nothing
//! short-circuits.

use regex::Regex;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Simple,
    Complex,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Simple => "simple",
            Classification::Complex => "complex",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification -> generation model id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTable {
    pub simple: String,
    pub complex: String,
}

impl ModelTable {
    pub fn model_for(&self, classification: Classification) -> &str {
        match classification {
            Classification::Simple => &self.simple,
            Classification::Complex => &self.complex,
        }
    }
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            simple: "llama-3.1-8b-instant".to_string(),
            complex: "llama-3.3-70b-versatile".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    LongQuery,
    ReasoningKeywords,
    MultipleQuestions,
    MultiSentence,
    ComparisonPattern,
    ComplaintDetected,
    ShortQuery,
    GreetingDetected,
    YesNoResponse,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::LongQuery => "long_query",
            SignalKind::ReasoningKeywords => "reasoning_keywords",
            SignalKind::MultipleQuestions => "multiple_questions",
            SignalKind::MultiSentence => "multi_sentence",
            SignalKind::ComparisonPattern => "comparison_pattern",
            SignalKind::ComplaintDetected => "complaint_detected",
            SignalKind::ShortQuery => "short_query",
            SignalKind::GreetingDetected => "greeting_detected",
            SignalKind::YesNoResponse => "yes_no_response",
        }
    }
}

/// One fired signal. Serializes as its rendered description,
/// e.g. `long_query (word_count=23)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signal {
    pub kind: SignalKind,
    pub weight: i32,
    pub detail: Option<String>,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} ({})", self.kind.as_str(), detail),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

impl Serialize for Signal {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub classification: Classification,
    pub model_used: String,
    pub complex_score: i32,
    pub signals: Vec<Signal>,
}

impl ClassificationResult {
    pub fn fired(&self, kind: SignalKind) -> bool {
        self.signals.iter().any(|s| s.kind == kind)
    }

    pub fn signal_descriptions(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.to_string()).collect()
    }
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub long_query: i32,
    pub reasoning_keywords: i32,
    pub multiple_questions: i32,
    pub multi_sentence: i32,
    pub comparison_pattern: i32,
    pub complaint: i32,
    pub short_query: i32,
    pub greeting: i32,
    pub yes_no: i32,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            long_query: 2,
            reasoning_keywords: 2,
            multiple_questions: 1,
            multi_sentence: 1,
            comparison_pattern: 1,
            complaint: 1,
            short_query: -2,
            greeting: -2,
            yes_no: -1,
        }
    }
}

/// Data tables and bounds driving the classifier.
///
/// Keywords are matched as lower-case substrings. Comparison patterns match
/// anywhere; greeting and yes/no patterns only count when the match starts at
/// the beginning of the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingPolicy {
    pub complex_threshold: i32,
    pub long_query_words: usize,
    pub short_query_words: usize,
    pub min_question_marks: usize,
    pub min_sentences: usize,
    pub weights: SignalWeights,
    pub reasoning_keywords: Vec<String>,
    pub complaint_keywords: Vec<String>,
    pub comparison_patterns: Vec<String>,
    pub greeting_patterns: Vec<String>,
    pub yes_no_patterns: Vec<String>,
}

#[rustfmt::skip]
const REASONING_KEYWORDS: &[&str] = &[
    "explain", "compare", "analyze", "difference", "why", "how does",
    "what happens", "describe", "elaborate", "detail", "advantages",
    "disadvantages", "trade-off", "tradeoff", "versus", "vs",
    "recommend", "suggest", "best practice", "architecture", "design",
    "strategy", "approach", "workflow", "process", "troubleshoot",
    "debug", "diagnose", "investigate", "complex", "advanced",
];

#[rustfmt::skip]
const COMPLAINT_KEYWORDS: &[&str] = &[
    "not working", "broken", "bug", "crash", "error", "issue",
    "problem", "fail", "can't", "cannot", "unable", "stuck",
    "wrong", "fix", "help me", "urgent", "frustrated",
];

const COMPARISON_PATTERNS: &[&str] = &[
    r"\bvs\.?\b",
    r"\bversus\b",
    r"\bcompared?\s+to\b",
    r"\bdifference\s+between\b",
    r"\bwhich\s+(one|plan|option)\b",
    r"\bbetter\s+than\b",
    r"\bpros?\s+and\s+cons?\b",
];

const GREETING_PATTERNS: &[&str] =
    &[r"^(hi|hello|hey|howdy|greetings|good\s*(morning|afternoon|evening)|yo|sup)\b"];

const YES_NO_PATTERNS: &[&str] =
    &[r"^(yes|no|yeah|nah|yep|nope|sure|ok|okay|absolutely|definitely|correct|right)\b"];

/// How many matched reasoning / complaint keywords a signal description lists.
const REASONING_DETAIL_LIMIT: usize = 3;
const COMPLAINT_DETAIL_LIMIT: usize = 2;

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            complex_threshold: 2,
            long_query_words: 20,
            short_query_words: 8,
            min_question_marks: 2,
            min_sentences: 3,
            weights: SignalWeights::default(),
            reasoning_keywords: owned(REASONING_KEYWORDS),
            complaint_keywords: owned(COMPLAINT_KEYWORDS),
            comparison_patterns: owned(COMPARISON_PATTERNS),
            greeting_patterns: owned(GREETING_PATTERNS),
            yes_no_patterns: owned(YES_NO_PATTERNS),
        }
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

pub struct ComplexityClassifier {
    policy: RoutingPolicy,
    models: ModelTable,
    comparison: Vec<Regex>,
    greeting: Vec<Regex>,
    yes_no: Vec<Regex>,
}

impl ComplexityClassifier {
    /// Compile the policy's patterns. Fails only on an invalid regex.
    pub fn new(mut policy: RoutingPolicy, models: ModelTable) -> Result<Self, ConfigError> {
        for keywords in [&mut policy.reasoning_keywords, &mut policy.complaint_keywords] {
            for kw in keywords.iter_mut() {
                *kw = kw.to_lowercase();
            }
        }
        Ok(Self {
            comparison: compile_all(&policy.comparison_patterns)?,
            greeting: compile_all(&policy.greeting_patterns)?,
            yes_no: compile_all(&policy.yes_no_patterns)?,
            policy,
            models,
        })
    }

    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    pub fn classify(&self, query: &str) -> ClassificationResult {
        let policy = &self.policy;
        let weights = &policy.weights;
        let text = query.trim().to_lowercase();
        let word_count = text.split_whitespace().count();
        let sentence_count = text
            .split(['.', '!', '?'])
            .filter(|s| !s.trim().is_empty())
            .count();

        let mut signals = Vec::new();

        if word_count >= policy.long_query_words {
            signals.push(signal(
                SignalKind::LongQuery,
                weights.long_query,
                Some(format!("word_count={}", word_count)),
            ));
        }

        let reasoning = matched_keywords(&text, &policy.reasoning_keywords);
        if !reasoning.is_empty() {
            signals.push(signal(
                SignalKind::ReasoningKeywords,
                weights.reasoning_keywords,
                Some(join_limited(&reasoning, REASONING_DETAIL_LIMIT)),
            ));
        }

        let question_marks = text.matches('?').count();
        if question_marks >= policy.min_question_marks {
            signals.push(signal(
                SignalKind::MultipleQuestions,
                weights.multiple_questions,
                Some(format!("count={}", question_marks)),
            ));
        }

        if sentence_count >= policy.min_sentences {
            signals.push(signal(
                SignalKind::MultiSentence,
                weights.multi_sentence,
                Some(format!("count={}", sentence_count)),
            ));
        }

        if self.comparison.iter().any(|re| re.is_match(&text)) {
            signals.push(signal(
                SignalKind::ComparisonPattern,
                weights.comparison_pattern,
                None,
            ));
        }

        let complaints = matched_keywords(&text, &policy.complaint_keywords);
        if !complaints.is_empty() {
            signals.push(signal(
                SignalKind::ComplaintDetected,
                weights.complaint,
                Some(join_limited(&complaints, COMPLAINT_DETAIL_LIMIT)),
            ));
        }

        if word_count < policy.short_query_words {
            signals.push(signal(
                SignalKind::ShortQuery,
                weights.short_query,
                Some(format!("word_count={}", word_count)),
            ));
        }

        if matches_at_start(&self.greeting, &text) {
            signals.push(signal(SignalKind::GreetingDetected, weights.greeting, None));
        }

        if matches_at_start(&self.yes_no, &text) {
            signals.push(signal(SignalKind::YesNoResponse, weights.yes_no, None));
        }

        let complex_score: i32 = signals.iter().map(|s| s.weight).sum();
        let classification = if complex_score >= policy.complex_threshold {
            Classification::Complex
        } else {
            Classification::Simple
        };
        let model_used = self.models.model_for(classification).to_string();

        tracing::info!(
            classification = %classification,
            score = complex_score,
            model = %model_used,
            signals = signals.len(),
            "Complexity router decision"
        );

        ClassificationResult {
            classification,
            model_used,
            complex_score,
            signals,
        }
    }
}

impl Default for ComplexityClassifier {
    fn default() -> Self {
        Self::new(RoutingPolicy::default(), ModelTable::default())
            .expect("default routing patterns are valid")
    }
}

fn compile_all(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|source| ConfigError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

fn signal(kind: SignalKind, weight: i32, detail: Option<String>) -> Signal {
    Signal {
        kind,
        weight,
        detail,
    }
}

fn matched_keywords<'a>(text: &str, keywords: &'a [String]) -> Vec<&'a str> {
    keywords
        .iter()
        .filter(|kw| text.contains(kw.as_str()))
        .map(|kw| kw.as_str())
        .collect()
}

fn join_limited(items: &[&str], limit: usize) -> String {
    items.iter().take(limit).copied().collect::<Vec<_>>().join(", ")
}

/// True if any pattern has a match beginning at offset 0. Leftmost-first
/// search means a match at 0, if one exists, is the one `find` returns.
fn matches_at_start(patterns: &[Regex], text: &str) -> bool {
    patterns
        .iter()
        .any(|re| re.find(text).is_some_and(|m| m.start() == 0))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Response quality auditing
//!
//! Inspects a generated answer against the passages it was grounded on and
//! raises typed flags for missing context, refusals, out-of-domain
//! vocabulary, low lexical overlap with the context and prices the context
//! never mentions. Any flag drops confidence to `low`.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::sync::LazyLock;

use crate::types::PassageRecord;

static CONTENT_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[a-zA-Z]{3,}\b").expect("content word regex is valid")
});

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$[\d,]+(?:\.\d{2})?(?:/\w+)?").expect("price regex is valid")
});

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagKind {
    NoContext,
    RefusalDetected,
    HallucinationKeyword,
    PotentialHallucination,
    UnsourcedPricing,
}

impl FlagKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlagKind::NoContext => "no_context",
            FlagKind::RefusalDetected => "refusal_detected",
            FlagKind::HallucinationKeyword => "hallucination_keyword",
            FlagKind::PotentialHallucination => "potential_hallucination",
            FlagKind::UnsourcedPricing => "unsourced_pricing",
        }
    }
}

/// A detected quality issue together with the evidence that raised it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityFlag {
    NoContext,
    RefusalDetected { phrase: String },
    HallucinationKeyword { keywords: Vec<String> },
    PotentialHallucination { overlap: f64, threshold: f64 },
    UnsourcedPricing { prices: Vec<String> },
}

impl QualityFlag {
    pub fn kind(&self) -> FlagKind {
        match self {
            QualityFlag::NoContext => FlagKind::NoContext,
            QualityFlag::RefusalDetected { .. } => FlagKind::RefusalDetected,
            QualityFlag::HallucinationKeyword { .. } => FlagKind::HallucinationKeyword,
            QualityFlag::PotentialHallucination { .. } => FlagKind::PotentialHallucination,
            QualityFlag::UnsourcedPricing { .. } => FlagKind::UnsourcedPricing,
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind().as_str();
        match self {
            QualityFlag::NoContext | QualityFlag::RefusalDetected { .. } => f.write_str(kind),
            QualityFlag::HallucinationKeyword { keywords } => {
                write!(f, "{} ({})", kind, keywords.join(", "))
            }
            QualityFlag::PotentialHallucination { overlap, threshold } => write!(
                f,
                "{} (overlap={:.1}%, threshold={:.0}%)",
                kind,
                overlap * 100.0,
                threshold * 100.0
            ),
            QualityFlag::UnsourcedPricing { prices } => write!(
                f,
                "{} (response mentions {} not found in retrieved docs)",
                kind,
                prices.join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub response: String,
    pub confidence: Confidence,
    pub flags: Vec<QualityFlag>,
}

impl EvaluationResult {
    pub fn has_flag(&self, kind: FlagKind) -> bool {
        self.flags.iter().any(|f| f.kind() == kind)
    }

    pub fn flag(&self, kind: FlagKind) -> Option<&QualityFlag> {
        self.flags.iter().find(|f| f.kind() == kind)
    }

    /// Human-readable rendering of every flag, in check order.
    pub fn flag_strings(&self) -> Vec<String> {
        self.flags.iter().map(|f| f.to_string()).collect()
    }
}

// ============================================================================
// Policy
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationPolicy {
    /// Minimum fraction of response content words that must appear in the context.
    pub overlap_threshold: f64,
    pub refusal_phrases: Vec<String>,
    /// Terms the corpus never discusses; seeing one suggests invented content.
    pub hallucination_keywords: Vec<String>,
    pub stopwords: Vec<String>,
}

const REFUSAL_PHRASES: &[&str] = &[
    "i don't know",
    "i cannot",
    "i'm not sure",
    "i do not have access",
    "i don't have enough information",
    "i'm unable to",
    "i am not sure",
    "i am unable",
    "i cannot provide",
    "i don't have information",
    "not in the documentation",
    "not mentioned in",
    "beyond my knowledge",
];

#[rustfmt::skip]
const HALLUCINATION_KEYWORDS: &[&str] = &[
    "blockchain", "cryptocurrency", "nft", "quantum", "bitcoin",
    "ethereum", "metaverse", "web3", "defi", "dao", "solana",
    "dogecoin", "mining", "token sale", "ico",
];

#[rustfmt::skip]
const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being",
    "have", "has", "had", "do", "does", "did", "will", "would", "could",
    "should", "may", "might", "shall", "can", "need", "must",
    "i", "you", "he", "she", "it", "we", "they", "me", "him", "her",
    "us", "them", "my", "your", "his", "its", "our", "their",
    "this", "that", "these", "those", "what", "which", "who", "whom",
    "and", "but", "or", "nor", "not", "so", "yet", "both", "either",
    "neither", "each", "every", "all", "any", "few", "more", "most",
    "other", "some", "such", "no", "only", "own", "same", "than",
    "too", "very", "just", "also", "how", "when", "where", "why",
    "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "up", "about", "into", "through", "during", "before", "after",
    "above", "below", "between", "under", "again", "further", "then",
    "once", "here", "there", "if", "because", "as", "until", "while",
    "based", "provided", "using", "used", "like", "including",
    "please", "note", "however", "well", "per",
];

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for EvaluationPolicy {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.30,
            refusal_phrases: owned(REFUSAL_PHRASES),
            hallucination_keywords: owned(HALLUCINATION_KEYWORDS),
            stopwords: owned(STOPWORDS),
        }
    }
}

// ============================================================================
// Evaluator
// ============================================================================

pub struct ResponseEvaluator {
    policy: EvaluationPolicy,
    stopwords: HashSet<String>,
}

impl ResponseEvaluator {
    pub fn new(mut policy: EvaluationPolicy) -> Self {
        lowercase_all(&mut policy.refusal_phrases);
        lowercase_all(&mut policy.hallucination_keywords);
        let stopwords = policy.stopwords.iter().map(|s| s.to_lowercase()).collect();
        Self { policy, stopwords }
    }

    pub fn policy(&self) -> &EvaluationPolicy {
        &self.policy
    }

    /// Run every check in order. Never fails.
    pub fn evaluate(&self, response: &str, passages: &[PassageRecord]) -> EvaluationResult {
        let response_lower = response.to_lowercase();
        let context_text = passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let mut flags = Vec::new();

        if passages.is_empty() {
            flags.push(QualityFlag::NoContext);
        }

        if let Some(phrase) = self.detect_refusal(&response_lower) {
            flags.push(QualityFlag::RefusalDetected { phrase });
        }

        let keywords = self.detect_out_of_domain(&response_lower);
        if !keywords.is_empty() {
            flags.push(QualityFlag::HallucinationKeyword { keywords });
        }

        if !passages.is_empty() {
            if let Some(flag) = self.check_overlap(response, &context_text) {
                flags.push(flag);
            }
            if let Some(flag) = check_pricing(response, &context_text) {
                flags.push(flag);
            }
        }

        let confidence = if flags.is_empty() {
            Confidence::High
        } else {
            Confidence::Low
        };

        tracing::debug!(
            confidence = %confidence,
            flags = ?flags.iter().map(|f| f.kind().as_str()).collect::<Vec<_>>(),
            passages = passages.len(),
            "Evaluated response"
        );

        EvaluationResult {
            response: response.to_string(),
            confidence,
            flags,
        }
    }

    fn detect_refusal(&self, response_lower: &str) -> Option<String> {
        self.policy
            .refusal_phrases
            .iter()
            .find(|phrase| response_lower.contains(phrase.as_str()))
            .cloned()
    }

    fn detect_out_of_domain(&self, response_lower: &str) -> Vec<String> {
        self.policy
            .hallucination_keywords
            .iter()
            .filter(|kw| response_lower.contains(kw.as_str()))
            .cloned()
            .collect()
    }

    fn check_overlap(&self, response: &str, context_text: &str) -> Option<QualityFlag> {
        let response_words = self.content_words(response);
        if response_words.is_empty() {
            return None;
        }
        let context_words = self.content_words(context_text);
        let shared = response_words.intersection(&context_words).count();
        let overlap = shared as f64 / response_words.len() as f64;

        if overlap < self.policy.overlap_threshold {
            Some(QualityFlag::PotentialHallucination {
                overlap,
                threshold: self.policy.overlap_threshold,
            })
        } else {
            None
        }
    }

    /// Alphabetic tokens of three or more letters, lower-cased, minus stop words.
    fn content_words(&self, text: &str) -> HashSet<String> {
        let lower = text.to_lowercase();
        CONTENT_WORD_RE
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|w| !self.stopwords.contains(*w))
            .map(str::to_string)
            .collect()
    }
}

impl Default for ResponseEvaluator {
    fn default() -> Self {
        Self::new(EvaluationPolicy::default())
    }
}

fn lowercase_all(items: &mut [String]) {
    for item in items.iter_mut() {
        *item = item.to_lowercase();
    }
}

/// Price tokens such as `$29`, `$2,500`, `$9.99` or `$49/month`.
pub fn extract_prices(text: &str) -> BTreeSet<String> {
    PRICE_RE
        .find_iter(text)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn check_pricing(response: &str, context_text: &str) -> Option<QualityFlag> {
    let response_prices = extract_prices(response);
    if response_prices.is_empty() {
        return None;
    }
    let context_prices = extract_prices(context_text);
    let prices: Vec<String> = response_prices
        .difference(&context_prices)
        .cloned()
        .collect();

    if prices.is_empty() {
        None
    } else {
        Some(QualityFlag::UnsourcedPricing { prices })
    }
}

// ============================================================================
// Tests
// ============================================================================

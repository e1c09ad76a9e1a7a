//! Query-side RAG logic: model routing, prompt assembly, answer evaluation.

pub mod evaluator;
pub mod prompt;
pub mod router;

// Re-export commonly used types
pub use evaluator::{
    extract_prices, Confidence, EvaluationPolicy, EvaluationResult, FlagKind, QualityFlag,
    ResponseEvaluator,
};
pub use prompt::{build_context, build_messages, NO_CONTEXT_PLACEHOLDER, SYSTEM_PROMPT};
pub use router::{
    Classification, ClassificationResult, ComplexityClassifier, ModelTable, RoutingPolicy, Signal,
    SignalKind, SignalWeights,
};

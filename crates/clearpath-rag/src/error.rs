use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the query pipeline.
///
/// Collaborator failures (embedding model, vector index, generator) keep the
/// original error as their source and are never retried here.
#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding call failed")]
    Embedding(#[source] anyhow::Error),

    #[error("vector index search failed")]
    Index(#[source] anyhow::Error),

    #[error("generation call failed")]
    Generation(#[source] anyhow::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Errors raised while loading or compiling configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type RagResult<T> = std::result::Result<T, RagError>;

//! Error taxonomy for the ragforge engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Rejected at engine construction; never retried.
    #[error("invalid config at `{path}`: {reason}")]
    InvalidConfig { path: String, reason: String },

    /// Fatal: the store holds vectors of a different dimension than the
    /// embedding model produces. Re-ingest with a matching model.
    #[error(
        "embedding dimension mismatch: store holds {expected}-dim vectors, got {actual} \
         (re-ingest with a matching embedding model)"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    /// Failure from a language backend (embed/generate/score).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        status: Option<u16>,
        retryable: bool,
    },

    #[error("store error: {0}")]
    Store(String),

    #[error("history error: {0}")]
    History(String),

    #[error("loader error: {0}")]
    Loader(String),

    /// Malformed output from a language model. Swallowed at the
    /// documented fallback sites, surfaced everywhere else.
    #[error("parse error: {0}")]
    Parse(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Transient provider failure (rate limit, server error, network).
    pub fn provider_retryable(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Provider {
            message: message.into(),
            status,
            retryable: true,
        }
    }

    /// Permanent provider failure (bad request, auth, unsupported op).
    pub fn provider_fatal(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Provider {
            message: message.into(),
            status,
            retryable: false,
        }
    }

    pub fn invalid_config(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether a retry loop may re-attempt the failed operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { retryable, .. } => *retryable,
            Self::Store(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

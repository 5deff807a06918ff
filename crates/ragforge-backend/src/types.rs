//! Streaming generation types.

use std::pin::Pin;

use futures::Stream;
use ragforge_core::Result;
use serde::{Deserialize, Serialize};

/// Token accounting reported by a backend, when available.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
}

/// One element of a generation stream. `delta` may be empty on the
/// terminal element that carries `finish_reason`/`usage`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerationChunk {
    pub delta: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

impl GenerationChunk {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            ..Default::default()
        }
    }
}

/// Pull-based lazy sequence of generation chunks. Dropping the stream
/// cancels the underlying request.
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<GenerationChunk>> + Send>>;

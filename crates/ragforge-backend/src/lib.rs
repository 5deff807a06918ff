//! ragforge backend — the language-model capability boundary.
//!
//! The engine talks to every provider through [`LanguageBackend`].
//! [`http::OpenAiCompatBackend`] covers the OpenAI-compatible wire
//! format (OpenAI, OpenRouter, Ollama); [`mock::MockBackend`] is the
//! deterministic scripted backend used by tests.

pub mod http;
pub mod mock;
pub mod retry;
pub mod types;

use async_trait::async_trait;
use ragforge_core::{Error, Result};

pub use http::OpenAiCompatBackend;
pub use mock::MockBackend;
pub use types::{GenerationChunk, GenerationStream, TokenUsage};

/// A language-model provider: embeddings plus (streaming) generation.
///
/// Contracts: embedding dimension is consistent across calls; streams
/// yield chunks in production order; failures carry retryability so the
/// caller's retry policy can classify them.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::provider_fatal("empty embedding response", None))
    }

    /// Complete a prompt in one shot.
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String>;

    /// Stream a completion. The stream owns its request; dropping it
    /// releases the underlying connection.
    fn generate_stream(&self, prompt: &str, system: Option<&str>) -> GenerationStream;
}

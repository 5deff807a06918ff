//! Generation driver: one-shot answers and the streaming wrapper.

use std::sync::Arc;

use ragforge_backend::retry::with_retry;
use ragforge_backend::{GenerationStream, LanguageBackend};
use ragforge_core::events::{emit, PipelineEvents};
use ragforge_core::{OutputFormat, Result};
use serde::Serialize;
use tokio_stream::StreamExt;
use tracing::debug;

use crate::prompt::SYSTEM_PROMPT;

/// A generated answer. JSON mode parses the model output; output that
/// fails to parse stays text rather than failing the query.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum AnswerBody {
    Text(String),
    Json(serde_json::Value),
}

impl AnswerBody {
    /// Plain-text rendering, for history persistence and evaluation.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Json(v) => v.to_string(),
        }
    }
}

pub struct GenerationDriver {
    backend: Arc<dyn LanguageBackend>,
}

impl GenerationDriver {
    pub fn new(backend: Arc<dyn LanguageBackend>) -> Self {
        Self { backend }
    }

    pub async fn generate(&self, prompt: &str, format: OutputFormat) -> Result<AnswerBody> {
        let answer = with_retry(|| self.backend.generate(prompt, Some(SYSTEM_PROMPT))).await?;
        Ok(match format {
            OutputFormat::Text => AnswerBody::Text(answer),
            OutputFormat::Json => match serde_json::from_str(&answer) {
                Ok(value) => AnswerBody::Json(value),
                Err(e) => {
                    debug!("json output mode fell back to raw text: {}", e);
                    AnswerBody::Text(answer)
                }
            },
        })
    }

    /// Wrap the backend stream: chunks pass through while the full
    /// answer accumulates; completion fires `on_generation_end`, errors
    /// fire `on_error` and surface to the consumer. Dropping the
    /// returned stream cancels the backend stream with it.
    pub fn stream(&self, prompt: &str, events: Arc<dyn PipelineEvents>) -> GenerationStream {
        let mut inner = self.backend.generate_stream(prompt, Some(SYSTEM_PROMPT));
        Box::pin(async_stream::stream! {
            let mut full_answer = String::new();
            while let Some(item) = inner.next().await {
                match item {
                    Ok(chunk) => {
                        full_answer.push_str(&chunk.delta);
                        yield Ok(chunk);
                    }
                    Err(e) => {
                        emit(|| events.on_error(&e));
                        yield Err(e);
                        return;
                    }
                }
            }
            emit(|| events.on_generation_end(&full_answer));
        })
    }
}

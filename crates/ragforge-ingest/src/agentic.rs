//! LLM-proposition chunking.
//!
//! Each recursive window is handed to a language backend that rewrites
//! it as self-contained propositions. The window itself is the fallback
//! for any backend or parse failure, so agentic chunking degrades to
//! recursive chunking rather than failing ingestion.

use std::collections::HashSet;
use std::sync::Arc;

use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use tracing::debug;

use crate::chunking::RecursiveChunker;

pub struct AgenticChunker {
    backend: Arc<dyn LanguageBackend>,
    inner: RecursiveChunker,
}

fn proposition_prompt(window: &str) -> String {
    format!(
        "Decompose the text below into standalone propositions, each understandable \
         without the others. Return ONLY a JSON array of strings.\n\nText:\n{}",
        window
    )
}

impl AgenticChunker {
    pub fn new(backend: Arc<dyn LanguageBackend>, inner: RecursiveChunker) -> Self {
        Self { backend, inner }
    }

    pub async fn chunk(&self, text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        for window in self.inner.chunk(text) {
            let prompt = proposition_prompt(&window);
            match with_retry(|| self.backend.generate(&prompt, None)).await {
                Ok(raw) => match parse_propositions(&raw) {
                    Some(props) if !props.is_empty() => chunks.extend(props),
                    _ => {
                        debug!("proposition response unparseable, keeping window");
                        chunks.push(window);
                    }
                },
                Err(e) => {
                    debug!("proposition generation failed, keeping window: {}", e);
                    chunks.push(window);
                }
            }
        }
        chunks
    }
}

/// Parse a JSON string array, then trim, collapse whitespace, dedupe,
/// and drop entries shorter than two characters.
fn parse_propositions(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    };
    let items: Vec<String> = serde_json::from_str(body).ok()?;

    let mut seen = HashSet::new();
    let cleaned: Vec<String> = items
        .into_iter()
        .map(|p| p.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|p| p.chars().count() >= 2)
        .filter(|p| seen.insert(p.clone()))
        .collect();
    Some(cleaned)
}

//! LLM relevance reranking over the retrieval window.

use std::sync::Arc;

use futures::future::join_all;
use once_cell::sync::Lazy;
use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use ragforge_core::RetrievedDoc;
use regex::Regex;
use tracing::debug;

static FIRST_INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

pub struct Reranker {
    backend: Arc<dyn LanguageBackend>,
    top_n: usize,
    window_size: usize,
}

impl Reranker {
    pub fn new(backend: Arc<dyn LanguageBackend>, top_n: usize, window_size: usize) -> Self {
        Self {
            backend,
            top_n,
            window_size,
        }
    }

    /// Score the top-`window_size` candidates with the backend, sort
    /// descending, and keep `top_n`. A candidate whose score cannot be
    /// obtained or parsed scores 0 rather than failing the query.
    pub async fn rerank(&self, query: &str, docs: Vec<RetrievedDoc>) -> Vec<RetrievedDoc> {
        let window: Vec<RetrievedDoc> = docs.into_iter().take(self.window_size).collect();

        let scores = join_all(
            window
                .iter()
                .map(|doc| self.score_one(query, &doc.content)),
        )
        .await;

        let mut scored: Vec<(u32, RetrievedDoc)> = scores.into_iter().zip(window).collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(self.top_n);
        scored
            .into_iter()
            .map(|(score, mut doc)| {
                doc.score = score as f64;
                doc
            })
            .collect()
    }

    async fn score_one(&self, query: &str, content: &str) -> u32 {
        let prompt = format!(
            "Analyze the relevance of the document to the query on a scale of 0-10. \
             Return ONLY the integer.\n\nQuery: {}\n\nDocument:\n{}",
            query, content
        );
        match with_retry(|| self.backend.generate(&prompt, None)).await {
            Ok(raw) => parse_score(&raw),
            Err(e) => {
                debug!("rerank scoring failed, defaulting to 0: {}", e);
                0
            }
        }
    }
}

/// First integer in the response; 0 when there is none.
fn parse_score(raw: &str) -> u32 {
    FIRST_INTEGER
        .find(raw)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

//! Query rewriting through a language backend.

use std::sync::Arc;

use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use ragforge_core::Result;
use tracing::debug;

/// Alternates taken from the rewrite response.
const MAX_ALTERNATES: usize = 3;
/// Hypothetical questions appended per query.
const MAX_HYPOTHETICAL: usize = 3;

pub struct QueryRewriter {
    backend: Arc<dyn LanguageBackend>,
}

impl QueryRewriter {
    pub fn new(backend: Arc<dyn LanguageBackend>) -> Self {
        Self { backend }
    }

    /// HyDE: a speculative passage answering the question; embedding it
    /// stands in for embedding the question itself.
    pub async fn hyde_passage(&self, query: &str) -> Result<String> {
        let prompt = format!(
            "Write a short, plausible passage that directly answers the question. \
             Write only the passage.\n\nQuestion: {}",
            query
        );
        with_retry(|| self.backend.generate(&prompt, None)).await
    }

    /// Multi-query expansion: up to three newline-separated alternates,
    /// plus hypothetical questions (fail-soft), plus the original query
    /// last.
    pub async fn multi_query(&self, query: &str) -> Result<Vec<String>> {
        let prompt = format!(
            "Rewrite the question below in three different ways that could surface \
             different relevant documents. One rewrite per line, nothing else.\n\n\
             Question: {}",
            query
        );
        let response = with_retry(|| self.backend.generate(&prompt, None)).await?;

        let mut queries: Vec<String> = response
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(MAX_ALTERNATES)
            .map(str::to_string)
            .collect();

        queries.extend(self.hypothetical_questions(query).await);
        queries.push(query.to_string());
        Ok(queries)
    }

    /// Questions the corpus might answer, from a separate prompt.
    /// Fail-soft: any backend or parse failure yields an empty list.
    async fn hypothetical_questions(&self, query: &str) -> Vec<String> {
        let prompt = format!(
            "List up to three questions related to the one below that a document \
             collection might answer. Return ONLY a JSON array of strings.\n\n\
             Question: {}",
            query
        );
        let raw = match with_retry(|| self.backend.generate(&prompt, None)).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("hypothetical question generation failed: {}", e);
                return Vec::new();
            }
        };
        parse_string_array(&raw)
            .unwrap_or_default()
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .take(MAX_HYPOTHETICAL)
            .collect()
    }
}

fn parse_string_array(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    let body = match (trimmed.find('['), trimmed.rfind(']')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    };
    serde_json::from_str(body).ok()
}

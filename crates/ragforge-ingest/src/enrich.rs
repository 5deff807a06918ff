//! Per-chunk metadata enrichment via the language backend.
//!
//! The model is asked for a summary, keywords, and hypothetical
//! questions as one JSON object. Any backend or parse failure degrades
//! to a synthesized fallback so enrichment can never fail ingestion.

use std::collections::HashMap;

use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use ragforge_core::text;
use ragforge_core::Enrichment;
use tracing::debug;

const SUMMARY_FALLBACK_CHARS: usize = 300;
const KEYWORD_FALLBACK_COUNT: usize = 10;

fn enrichment_prompt(content: &str) -> String {
    format!(
        "Annotate the passage below. Return ONLY a JSON object of the form \
         {{\"summary\": \"...\", \"keywords\": [\"...\"], \"hypotheticalQuestions\": [\"...\"]}} \
         with a one-sentence summary, up to 10 keywords, and up to 3 questions the passage \
         answers.\n\nPassage:\n{}",
        content
    )
}

/// Enrich one chunk, falling back to [`fallback_enrichment`] on any
/// backend or parse failure.
pub async fn enrich_chunk(backend: &dyn LanguageBackend, content: &str) -> Enrichment {
    let prompt = enrichment_prompt(content);
    match with_retry(|| backend.generate(&prompt, None)).await {
        Ok(raw) => parse_enrichment(&raw).unwrap_or_else(|| {
            debug!("enrichment response unparseable, synthesizing fallback");
            fallback_enrichment(content)
        }),
        Err(e) => {
            debug!("enrichment generation failed, synthesizing fallback: {}", e);
            fallback_enrichment(content)
        }
    }
}

fn parse_enrichment(raw: &str) -> Option<Enrichment> {
    let trimmed = raw.trim();
    // Models occasionally wrap the object in prose or code fences.
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(open), Some(close)) if open < close => &trimmed[open..=close],
        _ => trimmed,
    };
    let enrichment: Enrichment = serde_json::from_str(body).ok()?;
    (!enrichment.summary.is_empty() || !enrichment.keywords.is_empty()).then_some(enrichment)
}

/// Synthesized enrichment: leading characters as the summary, the most
/// frequent tokens longer than three characters as keywords.
pub fn fallback_enrichment(content: &str) -> Enrichment {
    Enrichment {
        summary: content.chars().take(SUMMARY_FALLBACK_CHARS).collect(),
        keywords: top_keywords(content, KEYWORD_FALLBACK_COUNT),
        hypothetical_questions: Vec::new(),
    }
}

fn top_keywords(content: &str, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for token in text::tokenize(content) {
        if token.chars().count() <= 3 {
            continue;
        }
        match counts.get_mut(&token) {
            Some(n) => *n += 1,
            None => {
                counts.insert(token.clone(), 1);
                order.push(token);
            }
        }
    }
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(limit);
    order
}

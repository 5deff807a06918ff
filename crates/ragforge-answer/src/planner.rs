//! Token-budgeted context assembly.
//!
//! Retrieved docs are taken in order; each contributes its enrichment
//! summary when that is small enough, otherwise its leading content.
//! Assembly stops at the first part that would overflow the budget;
//! later, smaller parts are not backfilled.

use ragforge_core::config::QueryPlanningConfig;
use ragforge_core::{ContextPart, RetrievedDoc};

/// Content cutoff when a summary is unavailable or too large.
const CONTENT_SLICE_CHARS: usize = 1200;

/// Fixed heuristic: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Header line for a doc: `"{docTitle} {section} [pages F-T]"`, with
/// absent parts omitted.
pub fn header_for(doc: &RetrievedDoc) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = doc.meta_str("docTitle") {
        if !title.is_empty() {
            parts.push(title.to_string());
        }
    }
    if let Some(section) = doc.meta_str("section") {
        if !section.is_empty() {
            parts.push(section.to_string());
        }
    }
    let pages = (
        doc.metadata.get("pageFrom").and_then(|v| v.as_u64()),
        doc.metadata.get("pageTo").and_then(|v| v.as_u64()),
    );
    if let (Some(from), Some(to)) = pages {
        parts.push(format!("[pages {}-{}]", from, to));
    }
    parts.join(" ")
}

fn body_for(doc: &RetrievedDoc, prefer_summaries_below: usize) -> String {
    if let Some(summary) = doc.meta_str("summary") {
        if !summary.is_empty() && estimate_tokens(summary) <= prefer_summaries_below {
            return summary.to_string();
        }
    }
    doc.content.chars().take(CONTENT_SLICE_CHARS).collect()
}

/// Select context parts within the token budget. The budget counts the
/// part bodies; headers ride along with their part.
pub fn plan_context(docs: &[RetrievedDoc], config: &QueryPlanningConfig) -> Vec<ContextPart> {
    let mut parts = Vec::new();
    let mut used = 0usize;

    for doc in docs {
        let body = body_for(doc, config.prefer_summaries_below);
        let cost = estimate_tokens(&body);
        if used + cost > config.token_budget {
            break;
        }
        used += cost;
        parts.push(ContextPart {
            header: header_for(doc),
            body,
        });
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str, metadata: serde_json::Value) -> RetrievedDoc {
        RetrievedDoc {
            content: content.into(),
            metadata,
            score: 1.0,
        }
    }

    fn config(token_budget: usize) -> QueryPlanningConfig {
        QueryPlanningConfig {
            token_budget,
            prefer_summaries_below: 120,
            include_citations: true,
        }
    }

    #[test]
    fn test_token_estimate_is_ceiling() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_token_estimate_counts_chars_not_bytes() {
        // Eight two-byte chars estimate as two tokens, not four.
        assert_eq!(estimate_tokens(&"é".repeat(8)), 2);
    }

    #[test]
    fn test_budget_stops_on_first_overflow() {
        // Parts of 4, 5, and 7 tokens against a budget of 10: the first
        // two fit (9), the third overflows and selection stops.
        let docs = vec![
            doc(&"a".repeat(16), serde_json::json!({})),
            doc(&"b".repeat(20), serde_json::json!({})),
            doc(&"c".repeat(28), serde_json::json!({})),
        ];
        let parts = plan_context(&docs, &config(10));
        assert_eq!(parts.len(), 2);
        let total: usize = parts.iter().map(|p| estimate_tokens(&p.body)).sum();
        assert!(total <= 10);
        assert_eq!(total, 9);
    }

    #[test]
    fn test_no_backfill_after_overflow() {
        // The third doc would fit the remaining budget, but selection
        // already stopped at the second.
        let docs = vec![
            doc(&"a".repeat(16), serde_json::json!({})),  // 4 tokens
            doc(&"b".repeat(40), serde_json::json!({})),  // 10 tokens, overflows
            doc(&"c".repeat(4), serde_json::json!({})),   // 1 token
        ];
        let parts = plan_context(&docs, &config(10));
        assert_eq!(parts.len(), 1);
    }

    #[test]
    fn test_prefers_small_summary() {
        let docs = vec![doc(
            &"x".repeat(2000),
            serde_json::json!({"summary": "Short summary."}),
        )];
        let parts = plan_context(&docs, &config(1000));
        assert_eq!(parts[0].body, "Short summary.");
    }

    #[test]
    fn test_oversized_summary_falls_back_to_content() {
        let long_summary = "s".repeat(1000); // 250 tokens > 120
        let docs = vec![doc(
            "actual content here",
            serde_json::json!({"summary": long_summary}),
        )];
        let parts = plan_context(&docs, &config(1000));
        assert_eq!(parts[0].body, "actual content here");
    }

    #[test]
    fn test_content_sliced_to_1200_chars() {
        let docs = vec![doc(&"y".repeat(5000), serde_json::json!({}))];
        let parts = plan_context(&docs, &config(10_000));
        assert_eq!(parts[0].body.chars().count(), 1200);
    }

    #[test]
    fn test_header_formatting() {
        let full = doc(
            "c",
            serde_json::json!({
                "docTitle": "handbook.md",
                "section": "Leave",
                "pageFrom": 3,
                "pageTo": 4,
            }),
        );
        assert_eq!(header_for(&full), "handbook.md Leave [pages 3-4]");

        let bare = doc("c", serde_json::json!({"docTitle": "notes.txt"}));
        assert_eq!(header_for(&bare), "notes.txt");

        let empty = doc("c", serde_json::json!({}));
        assert_eq!(header_for(&empty), "");
    }

    #[test]
    fn test_empty_docs_empty_context() {
        assert!(plan_context(&[], &config(100)).is_empty());
    }
}

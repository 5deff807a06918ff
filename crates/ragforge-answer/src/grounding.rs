//! Extractive grounding: constrain context to sentences that share
//! terms with the query.

use ragforge_core::config::GroundingConfig;
use ragforge_core::text::{split_sentences, token_set, tokenize};
use ragforge_core::{ContextPart, RetrievedDoc};

use crate::planner::header_for;

/// Extract query-overlapping sentences from the retrieved docs and
/// combine them with the planned context: strict mode replaces the
/// context with the snippets, otherwise snippets append after it.
pub fn apply_grounding(
    query: &str,
    docs: &[RetrievedDoc],
    config: &GroundingConfig,
    parts: Vec<ContextPart>,
) -> Vec<ContextPart> {
    if !config.enabled {
        return parts;
    }

    let snippets = extract_snippets(query, docs, config.max_snippets);
    if config.strict {
        snippets
    } else {
        let mut combined = parts;
        combined.extend(snippets);
        combined
    }
}

/// Per doc: the first `max_snippets` sentences sharing at least one
/// query term, each as its own context part under the doc's header.
pub fn extract_snippets(
    query: &str,
    docs: &[RetrievedDoc],
    max_snippets: usize,
) -> Vec<ContextPart> {
    let query_tokens = tokenize(query);
    if query_tokens.is_empty() {
        return Vec::new();
    }

    let mut snippets = Vec::new();
    for doc in docs {
        let header = header_for(doc);
        let mut taken = 0;
        for sentence in split_sentences(&doc.content) {
            if taken >= max_snippets {
                break;
            }
            let sentence_tokens = token_set(sentence);
            let overlap = query_tokens
                .iter()
                .filter(|t| sentence_tokens.contains(*t))
                .count();
            if overlap > 0 {
                snippets.push(ContextPart {
                    header: header.clone(),
                    body: sentence.to_string(),
                });
                taken += 1;
            }
        }
    }
    snippets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> RetrievedDoc {
        RetrievedDoc {
            content: content.into(),
            metadata: serde_json::json!({"docTitle": "handbook.md"}),
            score: 1.0,
        }
    }

    fn config(strict: bool, max_snippets: usize) -> GroundingConfig {
        GroundingConfig {
            enabled: true,
            strict,
            max_snippets,
        }
    }

    fn planned() -> Vec<ContextPart> {
        vec![ContextPart {
            header: "handbook.md".into(),
            body: "planned body".into(),
        }]
    }

    #[test]
    fn test_strict_replaces_context_with_overlapping_sentences() {
        let docs = vec![doc(
            "Employees may work remotely. Vacations accrue monthly.",
        )];
        let parts = apply_grounding("remote work policy", &docs, &config(true, 2), planned());
        // Only the sentence sharing a query term survives.
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].body, "Employees may work remotely.");
        assert_eq!(parts[0].header, "handbook.md");
    }

    #[test]
    fn test_augment_appends_snippets() {
        let docs = vec![doc("Remote work needs approval. Lunch is at noon.")];
        let parts = apply_grounding("remote approval", &docs, &config(false, 2), planned());
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].body, "planned body");
        assert_eq!(parts[1].body, "Remote work needs approval.");
    }

    #[test]
    fn test_max_snippets_per_doc() {
        let docs = vec![doc(
            "Remote rule one applies. Remote rule two applies. Remote rule three applies.",
        )];
        let parts = apply_grounding("remote", &docs, &config(true, 2), Vec::new());
        assert_eq!(parts.len(), 2);
    }

    #[test]
    fn test_disabled_passes_context_through() {
        let config = GroundingConfig {
            enabled: false,
            strict: true,
            max_snippets: 2,
        };
        let parts = apply_grounding("remote", &[doc("Remote text.")], &config, planned());
        assert_eq!(parts, planned());
    }

    #[test]
    fn test_no_overlap_yields_empty_strict_context() {
        let docs = vec![doc("Lunch is served at noon. The kitchen closes early.")];
        let parts = apply_grounding("remote work policy", &docs, &config(true, 3), planned());
        assert!(parts.is_empty());
    }

    #[test]
    fn test_short_query_tokens_ignored() {
        // Query terms of length <= 2 never match anything.
        let docs = vec![doc("An ox sat on it.")];
        let parts = apply_grounding("ox it", &docs, &config(true, 3), Vec::new());
        assert!(parts.is_empty());
    }
}

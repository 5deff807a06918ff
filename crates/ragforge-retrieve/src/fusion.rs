//! Reciprocal Rank Fusion over retrieval result lists.

use std::collections::HashMap;

use ragforge_core::RetrievedDoc;

/// RRF constant for the multi-query path. Deliberately aggressive:
/// c = 1 weighs top ranks far more heavily than the conventional 60.
pub const MULTI_QUERY_RRF_C: f64 = 1.0;

/// Fuse ranked lists by reciprocal rank:
///
/// ```text
/// score(d) = Σᵢ 1 / (c + rankᵢ(d) + 1)
/// ```
///
/// Documents are keyed by content; the first-discovered instance of a
/// document supplies its metadata, and ties break by discovery order.
pub fn reciprocal_rank_fusion(lists: &[Vec<RetrievedDoc>], c: f64) -> Vec<RetrievedDoc> {
    struct Entry {
        doc: RetrievedDoc,
        score: f64,
        discovered: usize,
    }

    let mut entries: HashMap<String, Entry> = HashMap::new();
    let mut discovery = 0usize;

    for list in lists {
        for (rank, doc) in list.iter().enumerate() {
            let contribution = 1.0 / (c + rank as f64 + 1.0);
            match entries.get_mut(doc.content.as_str()) {
                Some(entry) => entry.score += contribution,
                None => {
                    entries.insert(
                        doc.content.clone(),
                        Entry {
                            doc: doc.clone(),
                            score: contribution,
                            discovered: discovery,
                        },
                    );
                    discovery += 1;
                }
            }
        }
    }

    let mut fused: Vec<Entry> = entries.into_values().collect();
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.discovered.cmp(&b.discovered))
    });
    fused
        .into_iter()
        .map(|e| RetrievedDoc {
            score: e.score,
            ..e.doc
        })
        .collect()
}

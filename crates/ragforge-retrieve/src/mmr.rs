//! Maximal Marginal Relevance selection.

use std::collections::HashSet;

use ragforge_core::text::{jaccard, token_set};
use ragforge_core::RetrievedDoc;

/// Greedily select `k` documents trading relevance against redundancy:
///
/// ```text
/// argmax over pool: λ·relevance(d) − (1−λ)·max_{s∈S} Jaccard(tokens(d), tokens(s))
/// ```
///
/// Candidates are expected ranked by similarity; selection starts with
/// the top candidate. Redundancy is Jaccard over lowercased
/// alphanumeric tokens of length > 2. λ is clamped to [0, 1].
pub fn mmr_select(candidates: Vec<RetrievedDoc>, k: usize, lambda: f64) -> Vec<RetrievedDoc> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }
    let lambda = lambda.clamp(0.0, 1.0);

    let mut pool: Vec<(RetrievedDoc, HashSet<String>)> = candidates
        .into_iter()
        .map(|d| {
            let tokens = token_set(&d.content);
            (d, tokens)
        })
        .collect();

    let mut selected: Vec<(RetrievedDoc, HashSet<String>)> = vec![pool.remove(0)];

    while selected.len() < k && !pool.is_empty() {
        let mut best_idx = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (i, (doc, tokens)) in pool.iter().enumerate() {
            let redundancy = selected
                .iter()
                .map(|(_, s_tokens)| jaccard(tokens, s_tokens))
                .fold(0.0f64, f64::max);
            let score = lambda * doc.score - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }
        selected.push(pool.remove(best_idx));
    }

    selected.into_iter().map(|(doc, _)| doc).collect()
}

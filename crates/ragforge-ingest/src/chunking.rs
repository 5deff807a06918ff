//! Sentence-window chunker with adaptive overlap.
//!
//! Text is split at the configured separators, then into sentences, and
//! sentences accumulate into windows of at least `chunk_size`
//! characters. The overlap carried into the next window grows with the
//! Shannon entropy of the window just emitted:
//!
//! ```text
//! overlap = min(base_overlap + ⌊H · 50⌋, chunk_size / 3)
//! ```
//!
//! so information-dense text gets more context bridged across the cut.

use ragforge_core::config::ChunkingConfig;
use ragforge_core::text::{shannon_entropy, split_sentences};

pub struct RecursiveChunker {
    chunk_size: usize,
    base_overlap: usize,
    separators: Vec<String>,
}

impl RecursiveChunker {
    pub fn new(chunk_size: usize, base_overlap: usize, separators: Vec<String>) -> Self {
        Self {
            chunk_size,
            base_overlap,
            separators,
        }
    }

    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(
            config.chunk_size,
            config.chunk_overlap,
            config.separators.clone(),
        )
    }

    /// Overlap to carry out of an emitted window, in characters.
    fn overlap_for(&self, window: &str) -> usize {
        let entropy_bonus = (shannon_entropy(window) * 50.0).floor() as usize;
        (self.base_overlap + entropy_bonus).min(self.chunk_size / 3)
    }

    /// Split `text` into chunk contents. Positions are assigned later
    /// by the metadata pass.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut window = String::new();

        for block in split_blocks(text, &self.separators) {
            for sentence in split_sentences(block) {
                let sentence = sentence.trim();
                if sentence.is_empty() {
                    continue;
                }
                if !window.is_empty() {
                    window.push(' ');
                }
                window.push_str(sentence);

                if window.chars().count() >= self.chunk_size {
                    let overlap = self.overlap_for(&window);
                    let tail = char_tail(&window, overlap);
                    chunks.push(std::mem::replace(&mut window, tail));
                }
            }
        }

        // A trailing window that is pure overlap was already emitted.
        let trailing = window.trim();
        if !trailing.is_empty() && !chunks.last().is_some_and(|c| c.ends_with(trailing)) {
            chunks.push(window);
        }
        chunks
    }
}

/// Split `text` at each separator in turn, keeping non-empty pieces.
fn split_blocks<'a>(text: &'a str, separators: &[String]) -> Vec<&'a str> {
    let mut blocks = vec![text];
    for sep in separators {
        if sep.is_empty() {
            continue;
        }
        blocks = blocks
            .into_iter()
            .flat_map(|b| b.split(sep.as_str()))
            .filter(|b| !b.trim().is_empty())
            .collect();
    }
    blocks
}

/// Last `n` characters of `s`, on a char boundary.
fn char_tail(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

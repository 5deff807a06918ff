//! Process-local embedding cache keyed by chunk content hash.
//!
//! Monotone: entries accumulate and never change. A second writer for
//! the same hash carries the same vector, so the first write wins. The
//! cache is owned by the engine instance and may be discarded at any
//! time without correctness loss.

use std::collections::HashMap;

use parking_lot::RwLock;

#[derive(Default)]
pub struct EmbeddingCache {
    inner: RwLock<HashMap<String, Vec<f32>>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sha256: &str) -> Option<Vec<f32>> {
        self.inner.read().get(sha256).cloned()
    }

    pub fn contains(&self, sha256: &str) -> bool {
        self.inner.read().contains_key(sha256)
    }

    pub fn insert(&self, sha256: String, embedding: Vec<f32>) {
        self.inner.write().entry(sha256).or_insert(embedding);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

//! The vector-store capability.
//!
//! Required operations are `add_documents` and `similarity_search`;
//! everything else is optional and degrades gracefully: `hybrid_search`
//! falls back to similarity search, `file_exists` reports false (so
//! skip-mode ingestion re-embeds rather than missing data), and
//! `upsert_documents` falls back to plain adds.

use std::collections::HashMap;

use async_trait::async_trait;
use ragforge_core::{Error, Result, RetrievedDoc, StoredDocument};
use uuid::Uuid;

/// Conjunctive equality filter over metadata keys.
#[derive(Debug, Clone, Default)]
pub struct Filter(pub HashMap<String, serde_json::Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-clause filter.
    pub fn equals(key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        let mut map = HashMap::new();
        map.insert(key.into(), value.into());
        Self(map)
    }

    pub fn and(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Whether every clause matches the given metadata object.
    pub fn matches(&self, metadata: &serde_json::Value) -> bool {
        self.0
            .iter()
            .all(|(key, expected)| metadata.get(key) == Some(expected))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Pagination options for [`VectorStore::list_documents`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub filter: Option<Filter>,
    pub limit: usize,
    pub offset: usize,
}

/// Target of a delete: explicit ids, a metadata filter, or both.
#[derive(Debug, Clone, Default)]
pub struct DeleteSelector {
    pub ids: Vec<Uuid>,
    pub filter: Option<Filter>,
}

impl DeleteSelector {
    pub fn by_filter(filter: Filter) -> Self {
        Self {
            ids: Vec::new(),
            filter: Some(filter),
        }
    }

    pub fn by_ids(ids: Vec<Uuid>) -> Self {
        Self { ids, filter: None }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Append records. Fails with [`Error::DimensionMismatch`] when a
    /// vector's dimension differs from the store's.
    async fn add_documents(&self, docs: &[StoredDocument]) -> Result<()>;

    /// Top-`k` records by similarity to `vector`, filtered first.
    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievedDoc>>;

    /// Insert-or-replace by id. Backends without native upsert add.
    async fn upsert_documents(&self, docs: &[StoredDocument]) -> Result<()> {
        self.add_documents(docs).await
    }

    /// Combined lexical + semantic search. Backends without native
    /// hybrid retrieval fall back to similarity search.
    async fn hybrid_search(
        &self,
        _query: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievedDoc>> {
        self.similarity_search(vector, k, filter).await
    }

    /// Best-effort index creation; ingestion swallows failures.
    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }

    /// Whether a file with this exact fingerprint was ingested before.
    async fn file_exists(&self, _sha256: &str, _size: u64, _mtime: i64) -> Result<bool> {
        Ok(false)
    }

    async fn list_documents(&self, _opts: ListOptions) -> Result<Vec<StoredDocument>> {
        Err(Error::Store("listing not supported by this backend".into()))
    }

    /// Remove records; returns how many were deleted.
    async fn delete_documents(&self, _selector: DeleteSelector) -> Result<u64> {
        Err(Error::Store("deletion not supported by this backend".into()))
    }
}

/// L2 norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Normalize in place; zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v);
    if norm > 1e-9 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_is_conjunctive() {
        let filter = Filter::equals("source", "a.md").and("fileType", "md");
        assert!(filter.matches(&serde_json::json!({
            "source": "a.md", "fileType": "md", "extra": 1
        })));
        assert!(!filter.matches(&serde_json::json!({"source": "a.md"})));
        assert!(!filter.matches(&serde_json::json!({
            "source": "a.md", "fileType": "txt"
        })));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(Filter::new().matches(&serde_json::json!({"anything": true})));
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}

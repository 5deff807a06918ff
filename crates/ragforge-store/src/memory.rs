//! In-memory reference [`VectorStore`].
//!
//! Brute-force dot-product search over normalized vectors, with a
//! lexical term-overlap ranking fused by reciprocal ranks for native
//! hybrid search. Backs the test suite and the CLI; persistent backends
//! plug in behind the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use ndarray::Array1;
use parking_lot::RwLock;
use ragforge_core::{text, Error, Result, RetrievedDoc, StoredDocument};
use tracing::debug;

use crate::vector::{l2_normalize, DeleteSelector, Filter, ListOptions, VectorStore};

/// Constant for store-side reciprocal rank fusion.
const HYBRID_RRF_C: f64 = 60.0;

#[derive(Default)]
struct Inner {
    docs: Vec<StoredDocument>,
    /// Fixed once the first vector is written (or pinned up front).
    dim: Option<usize>,
}

#[derive(Default)]
pub struct MemoryVectorStore {
    inner: RwLock<Inner>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the expected embedding dimension up front.
    pub fn with_dimension(dim: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                docs: Vec::new(),
                dim: Some(dim),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_dim(inner: &mut Inner, actual: usize) -> Result<()> {
        match inner.dim {
            Some(expected) if expected != actual => {
                Err(Error::DimensionMismatch { expected, actual })
            }
            Some(_) => Ok(()),
            None => {
                inner.dim = Some(actual);
                Ok(())
            }
        }
    }

    fn normalized(doc: &StoredDocument) -> StoredDocument {
        let mut doc = doc.clone();
        l2_normalize(&mut doc.embedding);
        doc
    }

    /// Rank stored docs by lexical overlap with the query terms.
    fn lexical_ranking(inner: &Inner, query: &str, k: usize, filter: Option<&Filter>) -> Vec<usize> {
        let terms = text::tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, usize)> = inner
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| filter.is_none_or(|f| f.matches(&d.metadata)))
            .filter_map(|(i, d)| {
                let content = d.content.to_lowercase();
                let hits = terms.iter().filter(|t| content.contains(t.as_str())).count();
                (hits > 0).then_some((i, hits))
            })
            .collect();
        scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        scored.into_iter().map(|(i, _)| i).collect()
    }

    fn vector_ranking(
        inner: &Inner,
        query: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Vec<(usize, f64)> {
        let mut q = query.to_vec();
        l2_normalize(&mut q);
        let q = Array1::from(q);

        let mut scored: Vec<(usize, f64)> = inner
            .docs
            .iter()
            .enumerate()
            .filter(|(_, d)| filter.is_none_or(|f| f.matches(&d.metadata)))
            .filter(|(_, d)| d.embedding.len() == q.len())
            .map(|(i, d)| {
                let v = Array1::from(d.embedding.clone());
                (i, v.dot(&q) as f64)
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    fn to_retrieved(doc: &StoredDocument, score: f64) -> RetrievedDoc {
        RetrievedDoc {
            content: doc.content.clone(),
            metadata: doc.metadata.clone(),
            score,
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn add_documents(&self, docs: &[StoredDocument]) -> Result<()> {
        let mut inner = self.inner.write();
        for doc in docs {
            Self::check_dim(&mut inner, doc.embedding.len())?;
            inner.docs.push(Self::normalized(doc));
        }
        Ok(())
    }

    async fn upsert_documents(&self, docs: &[StoredDocument]) -> Result<()> {
        let mut inner = self.inner.write();
        for doc in docs {
            Self::check_dim(&mut inner, doc.embedding.len())?;
            let replacement = Self::normalized(doc);
            match inner.docs.iter_mut().find(|d| d.id == doc.id) {
                Some(existing) => *existing = replacement,
                None => inner.docs.push(replacement),
            }
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievedDoc>> {
        let inner = self.inner.read();
        Ok(Self::vector_ranking(&inner, vector, k, filter)
            .into_iter()
            .map(|(i, score)| Self::to_retrieved(&inner.docs[i], score))
            .collect())
    }

    async fn hybrid_search(
        &self,
        query: &str,
        vector: &[f32],
        k: usize,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievedDoc>> {
        let inner = self.inner.read();
        let lexical = Self::lexical_ranking(&inner, query, k, filter);
        let semantic = Self::vector_ranking(&inner, vector, k, filter);

        // Reciprocal rank fusion over the two rankings, keyed by row.
        let mut fused: HashMap<usize, f64> = HashMap::new();
        for (rank, &i) in lexical.iter().enumerate() {
            *fused.entry(i).or_insert(0.0) += 1.0 / (HYBRID_RRF_C + rank as f64 + 1.0);
        }
        for (rank, &(i, _)) in semantic.iter().enumerate() {
            *fused.entry(i).or_insert(0.0) += 1.0 / (HYBRID_RRF_C + rank as f64 + 1.0);
        }

        let mut ranked: Vec<(usize, f64)> = fused.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        ranked.truncate(k);

        debug!(
            "hybrid search: {} lexical, {} semantic, {} fused",
            lexical.len(),
            semantic.len(),
            ranked.len()
        );
        Ok(ranked
            .into_iter()
            .map(|(i, score)| Self::to_retrieved(&inner.docs[i], score))
            .collect())
    }

    async fn file_exists(&self, sha256: &str, size: u64, mtime: i64) -> Result<bool> {
        let inner = self.inner.read();
        Ok(inner.docs.iter().any(|d| {
            d.metadata.get("fileSHA256").and_then(|v| v.as_str()) == Some(sha256)
                && d.metadata.get("fileSize").and_then(|v| v.as_u64()) == Some(size)
                && d.metadata.get("lastModified").and_then(|v| v.as_i64()) == Some(mtime)
        }))
    }

    async fn list_documents(&self, opts: ListOptions) -> Result<Vec<StoredDocument>> {
        let inner = self.inner.read();
        let limit = if opts.limit == 0 {
            usize::MAX
        } else {
            opts.limit
        };
        Ok(inner
            .docs
            .iter()
            .filter(|d| {
                opts.filter
                    .as_ref()
                    .is_none_or(|f| f.matches(&d.metadata))
            })
            .skip(opts.offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_documents(&self, selector: DeleteSelector) -> Result<u64> {
        let mut inner = self.inner.write();
        let before = inner.docs.len();
        inner.docs.retain(|d| {
            let by_id = selector.ids.contains(&d.id);
            let by_filter = selector
                .filter
                .as_ref()
                .is_some_and(|f| f.matches(&d.metadata));
            !(by_id || by_filter)
        });
        Ok((before - inner.docs.len()) as u64)
    }
}

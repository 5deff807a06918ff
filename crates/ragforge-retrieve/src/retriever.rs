//! Strategy-dispatching retriever.
//!
//! Fetch depth is the reranking window when reranking is enabled, else
//! the default of five. Multi-query fans out embed-and-search per
//! rewritten query concurrently and fuses deterministically; every
//! strategy finishes with the keyword boost over enrichment keywords.

use std::sync::Arc;

use futures::future::join_all;
use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use ragforge_core::config::RagConfig;
use ragforge_core::{text, Result, RetrievalStrategy, RetrievedDoc};
use ragforge_store::{Filter, VectorStore};
use tracing::debug;

use crate::fusion::{reciprocal_rank_fusion, MULTI_QUERY_RRF_C};
use crate::mmr::mmr_select;
use crate::rewrite::QueryRewriter;

pub struct Retriever {
    config: Arc<RagConfig>,
    backend: Arc<dyn LanguageBackend>,
    rewrite_backend: Arc<dyn LanguageBackend>,
    store: Arc<dyn VectorStore>,
}

impl Retriever {
    pub fn new(
        config: Arc<RagConfig>,
        backend: Arc<dyn LanguageBackend>,
        rewrite_backend: Arc<dyn LanguageBackend>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            config,
            backend,
            rewrite_backend,
            store,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<RetrievedDoc>> {
        let k = self.config.retrieval_k();
        let strategy = self.config.retrieval.strategy;
        debug!("retrieving with strategy {:?}, k={}", strategy, k);

        let docs = match strategy {
            RetrievalStrategy::Naive => {
                let vector = self.embed(query).await?;
                self.store.similarity_search(&vector, k, filter).await?
            }
            RetrievalStrategy::Hyde => {
                let rewriter = QueryRewriter::new(self.rewrite_backend.clone());
                let passage = rewriter.hyde_passage(query).await?;
                let vector = self.embed(&passage).await?;
                self.store.similarity_search(&vector, k, filter).await?
            }
            RetrievalStrategy::MultiQuery => {
                let rewriter = QueryRewriter::new(self.rewrite_backend.clone());
                let queries = rewriter.multi_query(query).await?;
                let searches = queries.iter().map(|q| async move {
                    let vector = self.embed(q).await?;
                    self.store.similarity_search(&vector, k, filter).await
                });
                let lists = join_all(searches)
                    .await
                    .into_iter()
                    .collect::<Result<Vec<_>>>()?;
                let mut fused = reciprocal_rank_fusion(&lists, MULTI_QUERY_RRF_C);
                fused.truncate(k);
                fused
            }
            RetrievalStrategy::Hybrid => {
                let vector = self.embed(query).await?;
                self.store.hybrid_search(query, &vector, k, filter).await?
            }
            RetrievalStrategy::Mmr => {
                let fetch_k = self.config.retrieval.mmr_fetch_k.max(k);
                let vector = self.embed(query).await?;
                let candidates = self
                    .store
                    .similarity_search(&vector, fetch_k, filter)
                    .await?;
                mmr_select(candidates, k, self.config.retrieval.mmr_lambda)
            }
        };

        Ok(keyword_boost(query, docs))
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        with_retry(|| self.backend.embed_query(text)).await
    }
}

/// Stable-sort retrieved docs by how many query terms appear in their
/// enrichment keywords. Docs without keyword hits keep their order.
pub fn keyword_boost(query: &str, mut docs: Vec<RetrievedDoc>) -> Vec<RetrievedDoc> {
    let terms = text::tokenize(query);
    if terms.is_empty() {
        return docs;
    }
    let boost = |doc: &RetrievedDoc| -> usize {
        let keywords: Vec<String> = doc
            .keywords()
            .into_iter()
            .map(str::to_lowercase)
            .collect();
        terms
            .iter()
            .filter(|t| keywords.iter().any(|kw| kw == *t))
            .count()
    };
    docs.sort_by_key(|d| std::cmp::Reverse(boost(d)));
    docs
}

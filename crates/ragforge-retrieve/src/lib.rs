//! ragforge retrieve — query rewriting, strategy dispatch, rank
//! fusion, MMR selection, and LLM reranking.

pub mod fusion;
pub mod mmr;
pub mod rerank;
pub mod retriever;
pub mod rewrite;

pub use fusion::reciprocal_rank_fusion;
pub use mmr::mmr_select;
pub use rerank::Reranker;
pub use retriever::Retriever;
pub use rewrite::QueryRewriter;

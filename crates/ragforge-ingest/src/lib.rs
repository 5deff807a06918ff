//! ragforge ingest — chunking, embedding cache, metadata enrichment,
//! and the ingestion coordinator.

pub mod agentic;
pub mod cache;
pub mod chunking;
pub mod enrich;
pub mod ingest;
pub mod metadata;

pub use agentic::AgenticChunker;
pub use cache::EmbeddingCache;
pub use chunking::RecursiveChunker;
pub use ingest::IngestCoordinator;

//! ragforge core — configuration, error taxonomy, shared data model,
//! pipeline events, and text utilities.

pub mod config;
pub mod error;
pub mod events;
pub mod text;
pub mod types;

pub use config::{
    ChunkingStrategy, IngestMode, MemoryKind, OutputFormat, ProviderKind, RagConfig,
    RetrievalStrategy,
};
pub use error::{Error, Result};
pub use events::{NoopEvents, PipelineEvents};
pub use types::{
    document_id, ChatMessage, Chunk, ChunkMetadata, ContextPart, Enrichment, IngestSummary,
    RetrievedDoc, Role, StoredDocument,
};

//! ragforge runtime — the `RagEngine` orchestrator tying ingestion,
//! retrieval, planning, grounding, and generation together behind the
//! capability traits.

pub mod engine;
pub mod types;

pub use engine::RagEngine;
pub use types::{QueryOptions, QueryOutcome, QueryState, StreamingQuery};

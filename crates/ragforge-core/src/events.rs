//! Pipeline observation callbacks.
//!
//! Stages report progress through [`PipelineEvents`]; every method has a
//! no-op default so implementors subscribe only to what they need.
//! Dispatch is fire-and-forget: a handler can neither fail nor stall a
//! stage, and a panicking handler must not abort the pipeline, so call
//! sites go through [`emit`].

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use crate::error::Error;
use crate::types::IngestSummary;

pub trait PipelineEvents: Send + Sync {
    fn on_ingest_start(&self, _path: &Path) {}
    fn on_ingest_end(&self, _path: &Path, _chunks: usize) {}
    fn on_ingest_skipped(&self, _path: &Path) {}
    fn on_ingest_summary(&self, _summary: &IngestSummary) {}
    fn on_chunking_start(&self, _path: &Path) {}
    fn on_embedding_start(&self, _pending: usize) {}
    fn on_retrieval_start(&self, _query: &str) {}
    fn on_retrieval_end(&self, _retrieved: usize) {}
    fn on_reranking_start(&self, _candidates: usize) {}
    fn on_reranking_end(&self, _kept: usize) {}
    fn on_generation_start(&self) {}
    fn on_generation_end(&self, _answer: &str) {}
    fn on_error(&self, _error: &Error) {}
}

/// Subscriber that ignores everything.
pub struct NoopEvents;

impl PipelineEvents for NoopEvents {}

/// Run one handler invocation, containing any panic it raises.
pub fn emit<F: FnOnce()>(f: F) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("pipeline event handler panicked; continuing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_contains_panics() {
        emit(|| panic!("handler bug"));
        // Reaching here is the assertion.
    }

    #[test]
    fn test_default_handlers_are_noops() {
        let events = NoopEvents;
        events.on_retrieval_start("q");
        events.on_retrieval_end(0);
        events.on_error(&Error::Cancelled);
    }
}

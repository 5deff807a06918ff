//! Engine-level request and response types.

use ragforge_answer::AnswerBody;
use ragforge_backend::GenerationStream;
use ragforge_store::Filter;
use serde::Serialize;

/// Per-query options.
#[derive(Default)]
pub struct QueryOptions {
    /// Conversation session; history is read and written only when
    /// memory is enabled and a session id is present.
    pub session_id: Option<String>,
    /// Metadata filter forwarded to the vector store.
    pub filter: Option<Filter>,
}

impl QueryOptions {
    pub fn with_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            filter: None,
        }
    }
}

/// A completed non-streaming query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub answer: AnswerBody,
    /// Metadata of every retrieved doc, in final ranking order.
    pub sources: Vec<serde_json::Value>,
}

/// A streaming query: the chunk stream plus the sources that were
/// already fixed by retrieval.
pub struct StreamingQuery {
    pub stream: GenerationStream,
    pub sources: Vec<serde_json::Value>,
}

/// Stages of a query. Transitions are irreversible; dropping the query
/// future in any state abandons every later stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Pending,
    Retrieving,
    Rewriting,
    Reranking,
    Planning,
    Grounding,
    Generating,
    Done,
    Failed,
}

impl std::fmt::Display for QueryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Retrieving => "retrieving",
            Self::Rewriting => "rewriting",
            Self::Reranking => "reranking",
            Self::Planning => "planning",
            Self::Grounding => "grounding",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

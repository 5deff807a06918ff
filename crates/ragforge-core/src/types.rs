//! Data model shared across the pipeline: chunks, stored documents,
//! retrieval results, context parts, and chat history.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Namespace for content-addressed document ids. Derived from the
/// literal string `vectra-js` under the DNS namespace; must never
/// change, or ids stop being stable across re-ingests.
static DOC_ID_NAMESPACE: Lazy<Uuid> =
    Lazy::new(|| Uuid::new_v5(&Uuid::NAMESPACE_DNS, b"vectra-js"));

/// Deterministic id for the `chunk_index`-th chunk of a file with the
/// given content hash. A function of its two inputs only.
pub fn document_id(file_sha256: &str, chunk_index: usize) -> Uuid {
    Uuid::new_v5(
        &DOC_ID_NAMESPACE,
        format!("{}:{}", file_sha256, chunk_index).as_bytes(),
    )
}

/// An immutable text segment cut from a single source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    /// Byte offset of the segment start in the source text.
    pub start: usize,
    /// Byte offset one past the segment end.
    pub end: usize,
    /// Dense, zero-based index within the file.
    pub chunk_index: usize,
    /// Lowercase hex SHA-256 of `content`.
    pub sha256: String,
}

/// LLM-derived per-chunk annotations. Serialized flat into the stored
/// metadata so retrieval-side consumers see plain `summary` /
/// `keywords` / `hypotheticalQuestions` keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrichment {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub hypothetical_questions: Vec<String>,
}

/// Per-chunk metadata computed during ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    pub file_type: String,
    pub doc_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_from: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_to: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(flatten)]
    pub enrichment: Option<Enrichment>,
}

/// A record as persisted by a vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub content: String,
    /// L2-normalized, fixed dimension per store.
    pub embedding: Vec<f32>,
    /// Always carries `source`, `absolutePath`, `fileMD5`, `fileSHA256`,
    /// `fileSize`, `lastModified` plus the chunk metadata fields.
    pub metadata: serde_json::Value,
}

/// A search result. Score semantics are strategy-local but always
/// monotone "higher is better" before fusion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedDoc {
    pub content: String,
    pub metadata: serde_json::Value,
    pub score: f64,
}

impl RetrievedDoc {
    /// String-valued metadata field, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// The enrichment keyword list, if the chunk was enriched.
    pub fn keywords(&self) -> Vec<&str> {
        self.metadata
            .get("keywords")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }
}

/// One budgeted slice of the generation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPart {
    /// `"{docTitle} {section} [pages F-T]"`, absent fields omitted.
    pub header: String,
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One turn of conversation memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub session_id: String,
    pub role: Role,
    pub content: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

/// Outcome of a directory ingestion run. Per-file failures are recorded
/// here instead of aborting the traversal.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

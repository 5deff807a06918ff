//! Engine configuration tree with construction-time validation.
//!
//! Every enumerated choice is a typed enum and every cross-field
//! requirement is checked by [`RagConfig::validate`] before the engine
//! is built. Validation failures carry the dotted config path they
//! refer to, so a bad file fails fast with an actionable message.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Language-model provider families the engine can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAi,
    Gemini,
    Anthropic,
    OpenRouter,
    HuggingFace,
    Ollama,
}

impl ProviderKind {
    /// Whether the provider family exposes an embeddings endpoint.
    /// Checked at validation time, not at first call.
    pub fn supports_embeddings(self) -> bool {
        !matches!(self, Self::Anthropic)
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::Anthropic => "anthropic",
            Self::OpenRouter => "openrouter",
            Self::HuggingFace => "huggingface",
            Self::Ollama => "ollama",
        };
        write!(f, "{}", name)
    }
}

/// Embedding model selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub dimensions: Option<usize>,
}

/// Generation model selection and sampling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: ProviderKind,
    pub model: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub default_headers: Option<HashMap<String, String>>,
}

fn default_temperature() -> f64 {
    0.2
}
fn default_max_tokens() -> usize {
    1024
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    #[default]
    Recursive,
    /// LLM-proposition chunking; requires `chunking.agentic_llm`.
    Agentic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub strategy: ChunkingStrategy,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(default = "default_separators")]
    pub separators: Vec<String>,
    #[serde(default)]
    pub agentic_llm: Option<LlmConfig>,
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    100
}
fn default_separators() -> Vec<String> {
    vec!["\n\n".into()]
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::default(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            separators: default_separators(),
            agentic_llm: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetrievalStrategy {
    #[default]
    Naive,
    Hyde,
    MultiQuery,
    Hybrid,
    Mmr,
}

impl RetrievalStrategy {
    /// Strategies that rewrite the query through a language model.
    pub fn needs_rewriter(self) -> bool {
        matches!(self, Self::Hyde | Self::MultiQuery)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub strategy: RetrievalStrategy,
    /// Rewriter model; required for `hyde` and `multi-query`.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    #[serde(default = "default_mmr_lambda")]
    pub mmr_lambda: f64,
    #[serde(default = "default_mmr_fetch_k")]
    pub mmr_fetch_k: usize,
}

fn default_mmr_lambda() -> f64 {
    0.5
}
fn default_mmr_fetch_k() -> usize {
    20
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: RetrievalStrategy::default(),
            llm: None,
            mmr_lambda: default_mmr_lambda(),
            mmr_fetch_k: default_mmr_fetch_k(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankingConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_rerank_top_n")]
    pub top_n: usize,
    /// Initial retrieval fetches this many candidates when reranking.
    #[serde(default = "default_rerank_window")]
    pub window_size: usize,
    /// Scorer model; the primary model is used when absent.
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

fn default_rerank_top_n() -> usize {
    5
}
fn default_rerank_window() -> usize {
    20
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            top_n: default_rerank_top_n(),
            window_size: default_rerank_window(),
            llm: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// Per-chunk summary/keywords/questions via the language backend.
    #[serde(default)]
    pub enrichment: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryPlanningConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Summaries at or under this token estimate are preferred over
    /// truncated content.
    #[serde(default = "default_prefer_summaries_below")]
    pub prefer_summaries_below: usize,
    #[serde(default = "default_true")]
    pub include_citations: bool,
}

fn default_token_budget() -> usize {
    2048
}
fn default_prefer_summaries_below() -> usize {
    120
}
fn default_true() -> bool {
    true
}

impl Default for QueryPlanningConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
            prefer_summaries_below: default_prefer_summaries_below(),
            include_citations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Replace the planned context with extracted sentences instead of
    /// appending them.
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_max_snippets")]
    pub max_snippets: usize,
}

fn default_max_snippets() -> usize {
    3
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strict: false,
            max_snippets: default_max_snippets(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// Query prompt template with `{{context}}` / `{{question}}` slots.
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// Leave files whose fingerprint already exists untouched.
    #[default]
    Skip,
    Append,
    Replace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default)]
    pub mode: IngestMode,
    #[serde(default = "default_true")]
    pub rate_limit_enabled: bool,
    /// Embedding batch size when rate limiting is enabled.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

fn default_concurrency_limit() -> usize {
    8
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            mode: IngestMode::default(),
            rate_limit_enabled: true,
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryKind {
    #[default]
    InMemory,
    Kv,
    Relational,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub kind: MemoryKind,
    /// Trailing window of messages retained per session.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

fn default_max_messages() -> usize {
    20
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            kind: MemoryKind::default(),
            max_messages: default_max_messages(),
        }
    }
}

/// Column names a SQL-backed store maps records onto.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMap {
    #[serde(default = "default_col_id")]
    pub id: String,
    #[serde(default = "default_col_content")]
    pub content: String,
    #[serde(default = "default_col_embedding")]
    pub embedding: String,
    #[serde(default = "default_col_metadata")]
    pub metadata: String,
}

fn default_col_id() -> String {
    "id".into()
}
fn default_col_content() -> String {
    "content".into()
}
fn default_col_embedding() -> String {
    "embedding".into()
}
fn default_col_metadata() -> String {
    "metadata".into()
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            id: default_col_id(),
            content: default_col_content(),
            embedding: default_col_embedding(),
            metadata: default_col_metadata(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_table_name")]
    pub table_name: String,
    #[serde(default)]
    pub column_map: ColumnMap,
}

fn default_table_name() -> String {
    "documents".into()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            column_map: ColumnMap::default(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub reranking: RerankingConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub query_planning: QueryPlanningConfig,
    #[serde(default)]
    pub grounding: GroundingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub prompts: PromptsConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Retrieval depth when reranking is disabled.
pub const DEFAULT_RETRIEVAL_K: usize = 5;

impl RagConfig {
    /// Number of candidates the initial retrieval fetches.
    pub fn retrieval_k(&self) -> usize {
        if self.reranking.enabled {
            self.reranking.window_size
        } else {
            DEFAULT_RETRIEVAL_K
        }
    }

    /// Check the whole tree. Called once at engine construction.
    pub fn validate(&self) -> Result<()> {
        if !self.embedding.provider.supports_embeddings() {
            return Err(Error::invalid_config(
                "embedding.provider",
                format!(
                    "provider `{}` does not expose an embeddings endpoint",
                    self.embedding.provider
                ),
            ));
        }
        if self.embedding.model.is_empty() {
            return Err(Error::invalid_config("embedding.model", "must not be empty"));
        }
        if self.llm.model.is_empty() {
            return Err(Error::invalid_config("llm.model", "must not be empty"));
        }

        if self.chunking.chunk_size == 0 {
            return Err(Error::invalid_config("chunking.chunk_size", "must be > 0"));
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::invalid_config(
                "chunking.chunk_overlap",
                "must be smaller than chunk_size",
            ));
        }
        if self.chunking.strategy == ChunkingStrategy::Agentic
            && self.chunking.agentic_llm.is_none()
        {
            return Err(Error::invalid_config(
                "chunking.agentic_llm",
                "required when chunking.strategy is `agentic`",
            ));
        }

        if self.retrieval.strategy.needs_rewriter() && self.retrieval.llm.is_none() {
            return Err(Error::invalid_config(
                "retrieval.llm",
                format!(
                    "required when retrieval.strategy is `{:?}`",
                    self.retrieval.strategy
                )
                .to_lowercase(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retrieval.mmr_lambda) {
            return Err(Error::invalid_config(
                "retrieval.mmr_lambda",
                "must be within [0, 1]",
            ));
        }
        if self.retrieval.mmr_fetch_k == 0 {
            return Err(Error::invalid_config("retrieval.mmr_fetch_k", "must be > 0"));
        }

        if self.reranking.enabled {
            if self.reranking.top_n == 0 {
                return Err(Error::invalid_config("reranking.top_n", "must be > 0"));
            }
            if self.reranking.window_size < self.reranking.top_n {
                return Err(Error::invalid_config(
                    "reranking.window_size",
                    "must be at least reranking.top_n",
                ));
            }
        }

        if self.query_planning.token_budget == 0 {
            return Err(Error::invalid_config(
                "query_planning.token_budget",
                "must be > 0",
            ));
        }
        if self.grounding.enabled && self.grounding.max_snippets == 0 {
            return Err(Error::invalid_config(
                "grounding.max_snippets",
                "must be > 0 when grounding is enabled",
            ));
        }
        if self.ingestion.rate_limit_enabled && self.ingestion.concurrency_limit == 0 {
            return Err(Error::invalid_config(
                "ingestion.concurrency_limit",
                "must be > 0 when rate limiting is enabled",
            ));
        }
        if self.memory.enabled && self.memory.max_messages == 0 {
            return Err(Error::invalid_config(
                "memory.max_messages",
                "must be > 0 when memory is enabled",
            ));
        }

        validate_identifier("database.table_name", &self.database.table_name)?;
        let cols = &self.database.column_map;
        validate_identifier("database.column_map.id", &cols.id)?;
        validate_identifier("database.column_map.content", &cols.content)?;
        validate_identifier("database.column_map.embedding", &cols.embedding)?;
        validate_identifier("database.column_map.metadata", &cols.metadata)?;

        Ok(())
    }
}

/// SQL identifiers must match `[A-Za-z_][A-Za-z0-9_]*`; anything else is
/// rejected before it can reach a query string.
fn validate_identifier(path: &str, ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if head_ok && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::invalid_config(
            path,
            format!("`{}` is not a valid SQL identifier", ident),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> RagConfig {
        serde_json::from_value(serde_json::json!({
            "embedding": {"provider": "openai", "model": "text-embedding-3-small"},
            "llm": {"provider": "openai", "model": "gpt-4o-mini"},
        }))
        .unwrap()
    }

    #[test]
    fn test_defaults_validate() {
        let config = base_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunking.chunk_size, 1000);
        assert_eq!(config.retrieval_k(), DEFAULT_RETRIEVAL_K);
    }

    #[test]
    fn test_reranking_window_drives_retrieval_k() {
        let mut config = base_config();
        config.reranking.enabled = true;
        config.reranking.window_size = 25;
        assert_eq!(config.retrieval_k(), 25);
    }

    #[test]
    fn test_anthropic_embeddings_rejected_at_validation() {
        let mut config = base_config();
        config.embedding.provider = ProviderKind::Anthropic;
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::InvalidConfig { ref path, .. } if path == "embedding.provider"
        ));
    }

    #[test]
    fn test_hyde_requires_rewriter_llm() {
        let mut config = base_config();
        config.retrieval.strategy = RetrievalStrategy::Hyde;
        assert!(config.validate().is_err());

        config.retrieval.llm = Some(config.llm.clone());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_agentic_requires_llm() {
        let mut config = base_config();
        config.chunking.strategy = ChunkingStrategy::Agentic;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_mmr_lambda_bounds() {
        let mut config = base_config();
        config.retrieval.mmr_lambda = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_identifier_injection_rejected() {
        let mut config = base_config();
        config.database.table_name = "docs; DROP TABLE docs".into();
        assert!(config.validate().is_err());

        config.database.table_name = "docs_v2".into();
        assert!(config.validate().is_ok());

        config.database.column_map.embedding = "vec\"tor".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_strategy_enum_wire_names() {
        let s: RetrievalStrategy = serde_json::from_str("\"multi-query\"").unwrap();
        assert_eq!(s, RetrievalStrategy::MultiQuery);
        let m: MemoryKind = serde_json::from_str("\"in-memory\"").unwrap();
        assert_eq!(m, MemoryKind::InMemory);
    }
}

//! The engine: a long-lived orchestrator assembled from a validated
//! configuration and capability handles.
//!
//! Per query the stages run in a fixed order (retrieve, optionally
//! rerank, plan, optionally ground, generate) and every external call
//! is a suspension point, so dropping the query future (or the
//! returned stream) cancels all later stages. History is written only
//! after generation succeeds, which keeps cancelled queries out of the
//! history store.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use ragforge_answer::{
    apply_grounding, build_prompt, evaluate, merge_history, plan_context, render_context,
    EvalExample, EvalScore, GenerationDriver,
};
use ragforge_backend::LanguageBackend;
use ragforge_core::config::RagConfig;
use ragforge_core::events::{emit, NoopEvents, PipelineEvents};
use ragforge_core::{IngestSummary, Result, RetrievedDoc, Role};
use ragforge_ingest::{EmbeddingCache, IngestCoordinator};
use ragforge_retrieve::{Reranker, Retriever};
use ragforge_store::{DocumentLoader, HistoryStore, VectorStore};

use crate::types::{QueryOptions, QueryOutcome, QueryState, StreamingQuery};

pub struct RagEngine {
    config: Arc<RagConfig>,
    backend: Arc<dyn LanguageBackend>,
    rewrite_backend: Arc<dyn LanguageBackend>,
    rerank_backend: Arc<dyn LanguageBackend>,
    agentic_backend: Option<Arc<dyn LanguageBackend>>,
    store: Arc<dyn VectorStore>,
    loader: Arc<dyn DocumentLoader>,
    history: Option<Arc<dyn HistoryStore>>,
    events: Arc<dyn PipelineEvents>,
    cache: Arc<EmbeddingCache>,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine").finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Validate the configuration and assemble the engine. Auxiliary
    /// backends default to the primary one until overridden.
    pub fn new(
        config: RagConfig,
        backend: Arc<dyn LanguageBackend>,
        store: Arc<dyn VectorStore>,
        loader: Arc<dyn DocumentLoader>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            rewrite_backend: backend.clone(),
            rerank_backend: backend.clone(),
            agentic_backend: None,
            backend,
            store,
            loader,
            history: None,
            events: Arc::new(NoopEvents),
            cache: Arc::new(EmbeddingCache::new()),
        })
    }

    pub fn with_history(mut self, history: Arc<dyn HistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn PipelineEvents>) -> Self {
        self.events = events;
        self
    }

    pub fn with_rewrite_backend(mut self, backend: Arc<dyn LanguageBackend>) -> Self {
        self.rewrite_backend = backend;
        self
    }

    pub fn with_rerank_backend(mut self, backend: Arc<dyn LanguageBackend>) -> Self {
        self.rerank_backend = backend;
        self
    }

    pub fn with_agentic_backend(mut self, backend: Arc<dyn LanguageBackend>) -> Self {
        self.agentic_backend = Some(backend);
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// The process-local embedding cache owned by this engine.
    pub fn embedding_cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    fn coordinator(&self) -> IngestCoordinator {
        IngestCoordinator::new(
            self.config.clone(),
            self.backend.clone(),
            self.agentic_backend.clone(),
            self.store.clone(),
            self.loader.clone(),
            self.cache.clone(),
            self.events.clone(),
        )
    }

    /// Ingest a single file. Returns the number of chunks written.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        self.coordinator().ingest_file(path).await
    }

    /// Ingest every regular file directly under `dir`.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestSummary> {
        self.coordinator().ingest_directory(dir).await
    }

    /// Retrieval through grounding, ending at the assembled prompt.
    async fn prepare(
        &self,
        question: &str,
        opts: &QueryOptions,
    ) -> Result<(String, Vec<RetrievedDoc>)> {
        debug!("query state -> {}", QueryState::Pending);

        if self.config.retrieval.strategy.needs_rewriter() {
            debug!("query state -> {}", QueryState::Rewriting);
        }
        debug!("query state -> {}", QueryState::Retrieving);
        emit(|| self.events.on_retrieval_start(question));
        let retriever = Retriever::new(
            self.config.clone(),
            self.backend.clone(),
            self.rewrite_backend.clone(),
            self.store.clone(),
        );
        let mut docs = retriever.retrieve(question, opts.filter.as_ref()).await?;
        emit(|| self.events.on_retrieval_end(docs.len()));

        if self.config.reranking.enabled {
            debug!("query state -> {}", QueryState::Reranking);
            emit(|| self.events.on_reranking_start(docs.len()));
            let reranker = Reranker::new(
                self.rerank_backend.clone(),
                self.config.reranking.top_n,
                self.config.reranking.window_size,
            );
            docs = reranker.rerank(question, docs).await;
            emit(|| self.events.on_reranking_end(docs.len()));
        }

        debug!("query state -> {}", QueryState::Planning);
        let mut parts = plan_context(&docs, &self.config.query_planning);

        if self.config.grounding.enabled {
            debug!("query state -> {}", QueryState::Grounding);
            parts = apply_grounding(question, &docs, &self.config.grounding, parts);
        }

        let context = render_context(&parts);
        let mut prompt = build_prompt(self.config.prompts.query.as_deref(), &context, question);

        if let (true, Some(session_id), Some(history)) = (
            self.config.memory.enabled,
            opts.session_id.as_deref(),
            self.history.as_ref(),
        ) {
            let recent = history
                .recent(session_id, self.config.memory.max_messages)
                .await?;
            prompt = merge_history(&prompt, &recent);
        }

        Ok((prompt, docs))
    }

    /// Answer a question in one shot.
    pub async fn query(&self, question: &str, opts: QueryOptions) -> Result<QueryOutcome> {
        let (prompt, docs) = self.prepare(question, &opts).await?;

        debug!("query state -> {}", QueryState::Generating);
        emit(|| self.events.on_generation_start());
        let driver = GenerationDriver::new(self.backend.clone());
        let answer = match driver
            .generate(&prompt, self.config.generation.output_format)
            .await
        {
            Ok(answer) => answer,
            Err(e) => {
                debug!("query state -> {}", QueryState::Failed);
                emit(|| self.events.on_error(&e));
                return Err(e);
            }
        };

        // Persist the exchange only after a successful generation; a
        // query cancelled or failed earlier never touches history.
        if let (true, Some(session_id), Some(history)) = (
            self.config.memory.enabled,
            opts.session_id.as_deref(),
            self.history.as_ref(),
        ) {
            history.add_message(session_id, Role::User, question).await?;
            history
                .add_message(session_id, Role::Assistant, &answer.as_text())
                .await?;
        }

        emit(|| self.events.on_generation_end(&answer.as_text()));
        debug!("query state -> {}", QueryState::Done);
        Ok(QueryOutcome {
            answer,
            sources: docs.into_iter().map(|d| d.metadata).collect(),
        })
    }

    /// Answer a question as a chunk stream. Sources are fixed by
    /// retrieval before the stream starts; dropping the stream cancels
    /// the backend request.
    pub async fn query_stream(
        &self,
        question: &str,
        opts: QueryOptions,
    ) -> Result<StreamingQuery> {
        let (prompt, docs) = self.prepare(question, &opts).await?;

        debug!("query state -> {}", QueryState::Generating);
        emit(|| self.events.on_generation_start());
        let driver = GenerationDriver::new(self.backend.clone());
        Ok(StreamingQuery {
            stream: driver.stream(&prompt, self.events.clone()),
            sources: docs.into_iter().map(|d| d.metadata).collect(),
        })
    }

    /// Run the query pipeline per example and judge the answers.
    /// A failed pipeline or judge scores 0 rather than aborting the run.
    pub async fn evaluate(&self, examples: &[EvalExample]) -> Vec<EvalScore> {
        let mut scores = Vec::with_capacity(examples.len());
        for example in examples {
            let outcome = match self.query(&example.question, QueryOptions::default()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    debug!("evaluation query failed, scoring 0: {}", e);
                    scores.push(EvalScore {
                        question: example.question.clone(),
                        expected_ground_truth: example.expected_ground_truth.clone(),
                        faithfulness: 0.0,
                        relevance: 0.0,
                    });
                    continue;
                }
            };

            let answer = outcome.answer.as_text();
            let summaries: Vec<&str> = outcome
                .sources
                .iter()
                .filter_map(|s| s.get("summary").and_then(|v| v.as_str()))
                .collect();
            let faithfulness = evaluate::score_faithfulness(
                self.backend.as_ref(),
                &answer,
                &summaries.join("\n"),
            )
            .await;
            let relevance =
                evaluate::score_relevance(self.backend.as_ref(), &example.question, &answer).await;

            scores.push(EvalScore {
                question: example.question.clone(),
                expected_ground_truth: example.expected_ground_truth.clone(),
                faithfulness,
                relevance,
            });
        }
        scores
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragforge_backend::MockBackend;
    use ragforge_core::Error;
    use ragforge_store::{InMemoryHistory, MemoryVectorStore, TextLoader};
    use tokio_stream::StreamExt;

    fn test_config() -> RagConfig {
        serde_json::from_value(serde_json::json!({
            "embedding": {"provider": "openai", "model": "test-embed"},
            "llm": {"provider": "openai", "model": "test-chat"},
            "chunking": {"chunk_size": 60, "chunk_overlap": 10},
        }))
        .unwrap()
    }

    struct Fixture {
        backend: Arc<MockBackend>,
        engine: RagEngine,
        _dir: tempfile::TempDir,
        dir: std::path::PathBuf,
    }

    fn fixture(mutate: impl FnOnce(&mut RagConfig)) -> Fixture {
        let mut config = test_config();
        mutate(&mut config);
        let backend = Arc::new(MockBackend::new(64));
        let max_messages = config.memory.max_messages;
        let engine = RagEngine::new(
            config,
            backend.clone(),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(TextLoader),
        )
        .unwrap()
        .with_history(Arc::new(InMemoryHistory::new(max_messages)));
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        Fixture {
            backend,
            engine,
            _dir: tmp,
            dir,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const POLICY: &str = "Employees may work remotely two days each week. \
                          Remote days require manager approval in advance.";
    const VACATION: &str = "Vacations accrue monthly at two days per month. \
                            Unused vacation days carry over each year.";

    #[tokio::test]
    async fn test_end_to_end_ingest_then_query() {
        let fx = fixture(|_| {});
        write(&fx.dir, "policy.txt", POLICY);
        write(&fx.dir, "vacation.txt", VACATION);
        let summary = fx.engine.ingest_directory(&fx.dir).await.unwrap();
        assert_eq!(summary.failed, 0);
        assert!(summary.succeeded == 2);

        fx.backend.push_response("You may work remotely twice a week.");
        let outcome = fx
            .engine
            .query("how often can I work remotely?", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.answer.as_text(), "You may work remotely twice a week.");
        assert!(!outcome.sources.is_empty());
        assert!(outcome.sources[0]["source"].as_str().unwrap().ends_with(".txt"));

        // The generation prompt carried retrieved context.
        let prompt = fx.backend.generate_prompts().pop().unwrap();
        assert!(prompt.contains("remotely"));
    }

    #[tokio::test]
    async fn test_zero_retrieved_docs_still_generates() {
        let fx = fixture(|_| {});
        fx.backend.push_response("I have no sources for that.");
        let outcome = fx
            .engine
            .query("anything at all?", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.answer.as_text(), "I have no sources for that.");
        assert!(outcome.sources.is_empty());

        let prompt = fx.backend.generate_prompts().pop().unwrap();
        assert!(prompt.contains("Context:\n\n"));
    }

    #[tokio::test]
    async fn test_memory_merges_and_persists_history() {
        let fx = fixture(|c| c.memory.enabled = true);
        fx.backend.push_response("first answer");
        fx.backend.push_response("second answer");

        let opts = || QueryOptions::with_session("s1");
        fx.engine.query("first question?", opts()).await.unwrap();
        fx.engine.query("second question?", opts()).await.unwrap();

        let prompts = fx.backend.generate_prompts();
        let second_prompt = prompts.last().unwrap();
        assert!(second_prompt.starts_with("Conversation:\nuser: first question?"));
        assert!(second_prompt.contains("assistant: first answer"));
        // The first prompt had no history yet.
        assert!(!prompts[0].contains("Conversation:"));
    }

    #[tokio::test]
    async fn test_memory_disabled_ignores_session() {
        let fx = fixture(|_| {});
        fx.backend.push_response("answer");
        fx.engine
            .query("q?", QueryOptions::with_session("s1"))
            .await
            .unwrap();
        let prompt = fx.backend.generate_prompts().pop().unwrap();
        assert!(!prompt.contains("Conversation:"));
    }

    #[tokio::test]
    async fn test_strict_grounding_keeps_only_overlapping_sentences() {
        let fx = fixture(|c| {
            c.grounding.enabled = true;
            c.grounding.strict = true;
            c.grounding.max_snippets = 2;
            c.chunking.chunk_size = 200;
        });
        write(
            &fx.dir,
            "handbook.txt",
            "Employees may work remotely. Vacations accrue monthly.",
        );
        fx.engine.ingest_directory(&fx.dir).await.unwrap();

        fx.backend.push_response("grounded answer");
        fx.engine
            .query("remote work policy", QueryOptions::default())
            .await
            .unwrap();

        let prompt = fx.backend.generate_prompts().pop().unwrap();
        assert!(prompt.contains("Employees may work remotely."));
        assert!(!prompt.contains("Vacations accrue monthly."));
    }

    #[tokio::test]
    async fn test_reranking_reorders_and_trims() {
        let fx = fixture(|c| {
            c.reranking.enabled = true;
            c.reranking.top_n = 1;
            c.reranking.window_size = 2;
            c.chunking.chunk_size = 200;
        });
        write(&fx.dir, "policy.txt", POLICY);
        write(&fx.dir, "vacation.txt", VACATION);
        fx.engine.ingest_directory(&fx.dir).await.unwrap();

        // Two rerank scores (window), then the final generation.
        fx.backend.push_response("1");
        fx.backend.push_response("9");
        fx.backend.push_response("final answer");

        let outcome = fx
            .engine
            .query("vacation accrual", QueryOptions::default())
            .await
            .unwrap();
        assert_eq!(outcome.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_streaming_query_yields_deltas_and_sources() {
        let fx = fixture(|c| c.chunking.chunk_size = 200);
        write(&fx.dir, "policy.txt", POLICY);
        fx.engine.ingest_directory(&fx.dir).await.unwrap();

        fx.backend.push_response("streamed answer text");
        let mut streaming = fx
            .engine
            .query_stream("remote work?", QueryOptions::default())
            .await
            .unwrap();
        assert!(!streaming.sources.is_empty());

        let mut full = String::new();
        while let Some(chunk) = streaming.stream.next().await {
            full.push_str(&chunk.unwrap().delta);
        }
        assert_eq!(full, "streamed answer text");
    }

    #[tokio::test]
    async fn test_evaluate_returns_clamped_judge_scores() {
        let fx = fixture(|_| {});
        // Pipeline answer, then faithfulness and relevance judgments.
        fx.backend.push_response("the pipeline answer");
        fx.backend.push_response("0.8");
        fx.backend.push_response("not a number");

        let scores = fx
            .engine
            .evaluate(&[EvalExample {
                question: "q?".into(),
                expected_ground_truth: "truth".into(),
            }])
            .await;
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].faithfulness, 0.8);
        assert_eq!(scores[0].relevance, 0.0);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected_at_construction() {
        let mut config = test_config();
        config.retrieval.strategy = ragforge_core::RetrievalStrategy::Hyde;
        let err = RagEngine::new(
            config,
            Arc::new(MockBackend::new(8)),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(TextLoader),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn test_embedding_cache_is_engine_owned() {
        let fx = fixture(|_| {});
        write(&fx.dir, "policy.txt", POLICY);
        fx.engine.ingest_directory(&fx.dir).await.unwrap();
        assert!(!fx.engine.embedding_cache().is_empty());

        // A second engine starts with a cold cache.
        let other = fixture(|_| {});
        assert!(other.engine.embedding_cache().is_empty());
    }
}

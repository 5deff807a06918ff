//! Ingestion coordination: fingerprint → dedup → chunk → embed →
//! enrich → store.
//!
//! Directory runs are sequential with per-file failure isolation: a
//! file that cannot be loaded or embedded lands in the summary's error
//! list and the traversal continues. Embedding batches and the
//! replace-mode upsert retry transient failures with backoff.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use md5::Md5;
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use ragforge_backend::retry::with_retry;
use ragforge_backend::LanguageBackend;
use ragforge_core::config::{ChunkingStrategy, IngestMode, RagConfig};
use ragforge_core::events::{emit, PipelineEvents};
use ragforge_core::{document_id, Chunk, ChunkMetadata, Error, IngestSummary, Result, StoredDocument};
use ragforge_store::vector::l2_normalize;
use ragforge_store::{DeleteSelector, DocumentLoader, Filter, VectorStore};

use crate::agentic::AgenticChunker;
use crate::cache::EmbeddingCache;
use crate::chunking::RecursiveChunker;
use crate::enrich::enrich_chunk;
use crate::metadata;

/// Suffixes of editor/download droppings that are never ingested.
const TEMP_SUFFIXES: &[&str] = &[".tmp", ".temp", ".crdownload", ".part"];

pub struct IngestCoordinator {
    config: Arc<RagConfig>,
    backend: Arc<dyn LanguageBackend>,
    agentic_backend: Option<Arc<dyn LanguageBackend>>,
    store: Arc<dyn VectorStore>,
    loader: Arc<dyn DocumentLoader>,
    cache: Arc<EmbeddingCache>,
    events: Arc<dyn PipelineEvents>,
}

impl IngestCoordinator {
    pub fn new(
        config: Arc<RagConfig>,
        backend: Arc<dyn LanguageBackend>,
        agentic_backend: Option<Arc<dyn LanguageBackend>>,
        store: Arc<dyn VectorStore>,
        loader: Arc<dyn DocumentLoader>,
        cache: Arc<EmbeddingCache>,
        events: Arc<dyn PipelineEvents>,
    ) -> Self {
        Self {
            config,
            backend,
            agentic_backend,
            store,
            loader,
            cache,
            events,
        }
    }

    /// Ingest every regular file directly under `dir`. Hidden files,
    /// temp markers, and nested directories are skipped silently.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestSummary> {
        let started = Instant::now();
        let mut files: Vec<PathBuf> = Vec::new();

        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if is_skippable_name(&name) {
                continue;
            }
            files.push(entry.path());
        }
        files.sort();

        let mut summary = IngestSummary::default();
        for path in files {
            summary.processed += 1;
            match self.ingest_file(&path).await {
                Ok(_) => summary.succeeded += 1,
                Err(e) => {
                    summary.failed += 1;
                    summary.errors.push(format!("{}: {}", path.display(), e));
                    emit(|| self.events.on_error(&e));
                }
            }
        }
        summary.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "ingest of {} complete: {} processed, {} succeeded, {} failed in {}ms",
            dir.display(),
            summary.processed,
            summary.succeeded,
            summary.failed,
            summary.duration_ms
        );
        emit(|| self.events.on_ingest_summary(&summary));
        Ok(summary)
    }

    /// Ingest a single file. Returns the number of chunks written, or
    /// zero when the file was skipped or carried no text.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize> {
        emit(|| self.events.on_ingest_start(path));

        let file_meta = tokio::fs::metadata(path).await?;
        let file_size = file_meta.len();
        let last_modified = file_meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        let (file_md5, file_sha256) = hash_file(path).await?;

        if self.config.ingestion.mode == IngestMode::Skip
            && self
                .store
                .file_exists(&file_sha256, file_size, last_modified)
                .await?
        {
            debug!("{} already ingested, skipping", path.display());
            emit(|| self.events.on_ingest_skipped(path));
            return Ok(0);
        }

        let loaded = self.loader.load(path).await?;
        if loaded.text.trim().is_empty() {
            debug!("{} has no text content", path.display());
            emit(|| self.events.on_ingest_end(path, 0));
            return Ok(0);
        }

        emit(|| self.events.on_chunking_start(path));
        let windows = self.chunk_text(&loaded.text).await;
        let chunks = metadata::assign_positions(&loaded.text, windows);
        if chunks.is_empty() {
            emit(|| self.events.on_ingest_end(path, 0));
            return Ok(0);
        }

        self.embed_uncached(&chunks).await?;

        let mut chunk_metas: Vec<ChunkMetadata> = chunks
            .iter()
            .map(|c| metadata::chunk_metadata(path, &loaded.text, loaded.pages.as_deref(), c))
            .collect();
        if self.config.metadata.enrichment {
            for (chunk, meta) in chunks.iter().zip(chunk_metas.iter_mut()) {
                meta.enrichment = Some(enrich_chunk(self.backend.as_ref(), &chunk.content).await);
            }
        }

        if let Err(e) = self.store.ensure_indexes().await {
            debug!("ensure_indexes failed (ignored): {}", e);
        }

        // Re-check after index creation so skip still holds if another
        // writer ingested the file meanwhile.
        if self.config.ingestion.mode == IngestMode::Skip
            && self
                .store
                .file_exists(&file_sha256, file_size, last_modified)
                .await?
        {
            emit(|| self.events.on_ingest_skipped(path));
            return Ok(0);
        }

        let absolute_path = tokio::fs::canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .to_string();
        let docs = self.build_documents(
            path,
            &absolute_path,
            &file_md5,
            &file_sha256,
            file_size,
            last_modified,
            chunks,
            chunk_metas,
        )?;

        match self.config.ingestion.mode {
            IngestMode::Replace => {
                self.store
                    .delete_documents(DeleteSelector::by_filter(Filter::equals(
                        "absolutePath",
                        absolute_path.clone(),
                    )))
                    .await?;
                with_retry(|| self.store.upsert_documents(&docs)).await?;
            }
            IngestMode::Append | IngestMode::Skip => {
                self.store.add_documents(&docs).await?;
            }
        }

        info!("ingested {} as {} chunks", path.display(), docs.len());
        emit(|| self.events.on_ingest_end(path, docs.len()));
        Ok(docs.len())
    }

    async fn chunk_text(&self, text: &str) -> Vec<String> {
        let recursive = RecursiveChunker::from_config(&self.config.chunking);
        match self.config.chunking.strategy {
            ChunkingStrategy::Recursive => recursive.chunk(text),
            ChunkingStrategy::Agentic => {
                let backend = self
                    .agentic_backend
                    .clone()
                    .unwrap_or_else(|| self.backend.clone());
                AgenticChunker::new(backend, recursive).chunk(text).await
            }
        }
    }

    /// Embed chunks whose content hash is not cached yet, in sequential
    /// batches, and populate the cache with normalized vectors.
    async fn embed_uncached(&self, chunks: &[Chunk]) -> Result<()> {
        let mut seen = HashSet::new();
        let pending: Vec<&Chunk> = chunks
            .iter()
            .filter(|c| !self.cache.contains(&c.sha256))
            .filter(|c| seen.insert(c.sha256.clone()))
            .collect();

        emit(|| self.events.on_embedding_start(pending.len()));
        if pending.is_empty() {
            return Ok(());
        }

        let batch_size = if self.config.ingestion.rate_limit_enabled {
            self.config.ingestion.concurrency_limit
        } else {
            pending.len()
        };

        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = with_retry(|| self.backend.embed_documents(&texts)).await?;
            if vectors.len() != batch.len() {
                return Err(Error::provider_fatal(
                    format!(
                        "embedding count mismatch: sent {}, got {}",
                        batch.len(),
                        vectors.len()
                    ),
                    None,
                ));
            }
            for (chunk, mut vector) in batch.iter().zip(vectors) {
                l2_normalize(&mut vector);
                self.cache.insert(chunk.sha256.clone(), vector);
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn build_documents(
        &self,
        path: &Path,
        absolute_path: &str,
        file_md5: &str,
        file_sha256: &str,
        file_size: u64,
        last_modified: i64,
        chunks: Vec<Chunk>,
        chunk_metas: Vec<ChunkMetadata>,
    ) -> Result<Vec<StoredDocument>> {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let mut docs = Vec::with_capacity(chunks.len());
        for (chunk, chunk_meta) in chunks.into_iter().zip(chunk_metas) {
            let embedding = self
                .cache
                .get(&chunk.sha256)
                .ok_or_else(|| Error::Store("embedding missing from cache".into()))?;

            let mut metadata = serde_json::json!({
                "source": source,
                "absolutePath": absolute_path,
                "fileMD5": file_md5,
                "fileSHA256": file_sha256,
                "fileSize": file_size,
                "lastModified": last_modified,
                "chunkIndex": chunk.chunk_index,
            });
            if let (Some(target), Ok(serde_json::Value::Object(extra))) =
                (metadata.as_object_mut(), serde_json::to_value(&chunk_meta))
            {
                target.extend(extra);
            }

            docs.push(StoredDocument {
                id: document_id(file_sha256, chunk.chunk_index),
                content: chunk.content,
                embedding,
                metadata,
            });
        }
        Ok(docs)
    }
}

/// Hidden files and temp markers are never ingested.
fn is_skippable_name(name: &str) -> bool {
    name.starts_with('.')
        || name.starts_with("~$")
        || TEMP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// MD5 and SHA-256 of the file contents, computed in one streaming pass.
async fn hash_file(path: &Path) -> Result<(String, String)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut md5 = Md5::new();
    let mut sha256 = Sha256::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        md5.update(&buf[..n]);
        sha256.update(&buf[..n]);
    }
    Ok((hex::encode(md5.finalize()), hex::encode(sha256.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use ragforge_backend::MockBackend;
    use ragforge_core::events::NoopEvents;
    use ragforge_store::{ListOptions, MemoryVectorStore, TextLoader};

    #[derive(Default)]
    struct RecordingEvents {
        log: Mutex<Vec<String>>,
    }

    impl PipelineEvents for RecordingEvents {
        fn on_ingest_skipped(&self, path: &Path) {
            self.log.lock().push(format!("skipped:{}", path.display()));
        }
        fn on_embedding_start(&self, pending: usize) {
            self.log.lock().push(format!("embedding:{}", pending));
        }
        fn on_ingest_end(&self, _path: &Path, chunks: usize) {
            self.log.lock().push(format!("end:{}", chunks));
        }
    }

    fn test_config() -> RagConfig {
        serde_json::from_value(serde_json::json!({
            "embedding": {"provider": "openai", "model": "test-embed"},
            "llm": {"provider": "openai", "model": "test-chat"},
            "chunking": {"chunk_size": 40, "chunk_overlap": 8},
        }))
        .unwrap()
    }

    struct Fixture {
        backend: Arc<MockBackend>,
        store: Arc<MemoryVectorStore>,
        events: Arc<RecordingEvents>,
        coordinator: IngestCoordinator,
        _dir: tempfile::TempDir,
        dir: PathBuf,
    }

    fn fixture(mutate: impl FnOnce(&mut RagConfig)) -> Fixture {
        let mut config = test_config();
        mutate(&mut config);
        let backend = Arc::new(MockBackend::new(16));
        let store = Arc::new(MemoryVectorStore::new());
        let events = Arc::new(RecordingEvents::default());
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_path_buf();
        let coordinator = IngestCoordinator::new(
            Arc::new(config),
            backend.clone(),
            None,
            store.clone(),
            Arc::new(TextLoader),
            Arc::new(EmbeddingCache::new()),
            events.clone(),
        );
        Fixture {
            backend,
            store,
            events,
            coordinator,
            _dir: tmp,
            dir,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const DOC: &str = "Employees may work remotely two days a week. \
                       Remote days need manager approval in advance. \
                       Vacations accrue monthly for all staff members.";

    #[tokio::test]
    async fn test_ingest_file_persists_chunks_with_metadata() {
        let fx = fixture(|_| {});
        let path = write(&fx.dir, "policy.md", DOC);

        let written = fx.coordinator.ingest_file(&path).await.unwrap();
        assert!(written > 0);
        assert_eq!(fx.store.len(), written);

        let all = fx.store.list_documents(ListOptions::default()).await.unwrap();
        for doc in &all {
            assert_eq!(doc.metadata["source"], "policy.md");
            assert_eq!(doc.metadata["fileType"], "md");
            assert!(doc.metadata["fileSHA256"].as_str().unwrap().len() == 64);
            assert!(doc.metadata["fileMD5"].as_str().unwrap().len() == 32);
            assert!(doc.metadata["fileSize"].as_u64().unwrap() > 0);
            assert!(doc.metadata["lastModified"].as_i64().unwrap() > 0);
            let norm: f32 = doc.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn test_ids_are_content_addressed() {
        let fx = fixture(|c| c.ingestion.mode = IngestMode::Replace);
        let path = write(&fx.dir, "stable.txt", DOC);

        fx.coordinator.ingest_file(&path).await.unwrap();
        let first: Vec<_> = fx
            .store
            .list_documents(ListOptions::default())
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();

        fx.coordinator.ingest_file(&path).await.unwrap();
        let second: Vec<_> = fx
            .store
            .list_documents(ListOptions::default())
            .await
            .unwrap()
            .iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_skip_mode_is_idempotent_without_embedding() {
        let fx = fixture(|_| {});
        let path = write(&fx.dir, "once.txt", DOC);

        fx.coordinator.ingest_file(&path).await.unwrap();
        let stored = fx.store.len();
        let embed_calls = fx.backend.embed_call_count();
        assert!(embed_calls > 0);

        // Second ingest: fingerprint matches, no embedding traffic.
        fx.coordinator.ingest_file(&path).await.unwrap();
        assert_eq!(fx.store.len(), stored);
        assert_eq!(fx.backend.embed_call_count(), embed_calls);
        assert!(fx
            .events
            .log
            .lock()
            .iter()
            .any(|e| e.starts_with("skipped:")));
    }

    #[tokio::test]
    async fn test_replace_mode_is_idempotent() {
        let fx = fixture(|c| c.ingestion.mode = IngestMode::Replace);
        let path = write(&fx.dir, "doc.txt", DOC);

        fx.coordinator.ingest_file(&path).await.unwrap();
        let first = fx.store.len();
        fx.coordinator.ingest_file(&path).await.unwrap();
        assert_eq!(fx.store.len(), first);
    }

    #[tokio::test]
    async fn test_append_mode_duplicates_rows() {
        let fx = fixture(|c| c.ingestion.mode = IngestMode::Append);
        let path = write(&fx.dir, "doc.txt", DOC);

        fx.coordinator.ingest_file(&path).await.unwrap();
        let first = fx.store.len();
        fx.coordinator.ingest_file(&path).await.unwrap();
        assert_eq!(fx.store.len(), first * 2);
    }

    #[tokio::test]
    async fn test_rate_limited_batches() {
        let fx = fixture(|c| {
            c.ingestion.rate_limit_enabled = true;
            c.ingestion.concurrency_limit = 2;
            c.chunking.chunk_size = 30;
        });
        let path = write(&fx.dir, "doc.txt", DOC);
        fx.coordinator.ingest_file(&path).await.unwrap();

        let sizes = fx.backend.embed_batch_sizes();
        assert!(sizes.len() > 1, "expected multiple batches, got {:?}", sizes);
        assert!(sizes.iter().all(|&s| s <= 2));
    }

    #[tokio::test]
    async fn test_unlimited_batches_when_rate_limit_off() {
        let fx = fixture(|c| {
            c.ingestion.rate_limit_enabled = false;
            c.chunking.chunk_size = 30;
        });
        let path = write(&fx.dir, "doc.txt", DOC);
        fx.coordinator.ingest_file(&path).await.unwrap();
        assert_eq!(fx.backend.embed_call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_embed_failure_is_retried() {
        let fx = fixture(|_| {});
        let path = write(&fx.dir, "doc.txt", DOC);
        fx.backend.fail_next_embeds(1);
        fx.coordinator.ingest_file(&path).await.unwrap();
        assert!(fx.store.len() > 0);
    }

    #[tokio::test]
    async fn test_directory_isolation_and_summary() {
        let fx = fixture(|_| {});
        write(&fx.dir, "good.txt", DOC);
        write(&fx.dir, "other.txt", "Another fine document with sentences. It has two.");
        // Valid UTF-8 but dominated by control chars: loader rejects it.
        write(&fx.dir, "bad.bin", "\u{1}\u{2}\u{3}\u{4}\u{5}\u{6}x");

        let summary = fx.coordinator.ingest_directory(&fx.dir).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("bad.bin"));
    }

    #[tokio::test]
    async fn test_hidden_and_temp_files_skipped() {
        let fx = fixture(|_| {});
        write(&fx.dir, ".hidden.txt", DOC);
        write(&fx.dir, "~$lock.docx", DOC);
        write(&fx.dir, "download.part", DOC);
        write(&fx.dir, "draft.tmp", DOC);
        write(&fx.dir, "real.txt", DOC);

        let summary = fx.coordinator.ingest_directory(&fx.dir).await.unwrap();
        assert_eq!(summary.processed, 1);
        assert_eq!(summary.succeeded, 1);
    }

    #[tokio::test]
    async fn test_enrichment_attaches_flat_keys() {
        let fx = fixture(|c| {
            c.metadata.enrichment = true;
            c.chunking.chunk_size = 500;
        });
        fx.backend.push_response(
            r#"{"summary": "Remote work rules.", "keywords": ["remote"], "hypotheticalQuestions": []}"#,
        );
        let path = write(&fx.dir, "doc.txt", DOC);
        fx.coordinator.ingest_file(&path).await.unwrap();

        let all = fx.store.list_documents(ListOptions::default()).await.unwrap();
        assert_eq!(all[0].metadata["summary"], "Remote work rules.");
        assert_eq!(all[0].metadata["keywords"][0], "remote");
    }

    #[tokio::test]
    async fn test_empty_file_writes_nothing() {
        let fx = fixture(|_| {});
        let path = write(&fx.dir, "empty.txt", "   ");
        let written = fx.coordinator.ingest_file(&path).await.unwrap();
        assert_eq!(written, 0);
        assert!(fx.store.is_empty());
    }

    #[tokio::test]
    async fn test_hash_file_known_digests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, "abc").unwrap();
        let (md5, sha256) = hash_file(&path).await.unwrap();
        assert_eq!(md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(
            sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_skippable_names() {
        assert!(is_skippable_name(".DS_Store"));
        assert!(is_skippable_name("~$report.docx"));
        assert!(is_skippable_name("video.part"));
        assert!(is_skippable_name("save.tmp"));
        assert!(!is_skippable_name("notes.txt"));
    }

    #[tokio::test]
    async fn test_noop_events_accepted() {
        // Coordinator works with the default subscriber too.
        let config = Arc::new(test_config());
        let backend = Arc::new(MockBackend::new(8));
        let coordinator = IngestCoordinator::new(
            config,
            backend,
            None,
            Arc::new(MemoryVectorStore::new()),
            Arc::new(TextLoader),
            Arc::new(EmbeddingCache::new()),
            Arc::new(NoopEvents),
        );
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.txt", "One sentence only.");
        coordinator.ingest_file(&path).await.unwrap();
    }
}

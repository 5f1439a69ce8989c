// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-scoped facade wiring cache, extractor, store, and index together.
//!
//! A [`MemoryPipeline`] is constructed explicitly with [`MemoryPipeline::init`]
//! and torn down with [`MemoryPipeline::close`]. It owns the namespace lock
//! for its lifetime and a cancellation token shared by every operation it
//! starts.

use std::sync::Arc;
use std::time::Duration;

use cairn_config::model::CairnConfig;
use cairn_core::error::CairnError;
use cairn_core::traits::{EmbeddingAdapter, GenerationAdapter};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::adapters::{CommandGenerator, HttpEmbedder};
use crate::cache::FingerprintCache;
use crate::extractor::MemoryExtractor;
use crate::index::SemanticIndex;
use crate::recording;
use crate::store::{CompactionReport, LogIo, MemoryStore, StdLogIo};
use crate::types::{ConversationMessage, Memory, ScoredMemory};

/// Cache stage name under which extraction output is memoized.
pub const EXTRACTION_STAGE: &str = "extraction";

/// Outcome of one [`MemoryPipeline::ingest`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Conversation entries that made it into the transcript.
    pub window_messages: usize,
    /// Memories produced by extraction (or replayed from cache).
    pub extracted: usize,
    /// Memories newly appended to the store.
    pub appended: usize,
    /// Memories already present in the store.
    pub skipped_existing: usize,
    /// Memories removed earlier by retention and not brought back.
    pub skipped_retired: usize,
    /// Memories indexed without a vector.
    pub degraded: usize,
}

/// The memory pipeline for one session.
pub struct MemoryPipeline {
    config: CairnConfig,
    generator: Arc<dyn GenerationAdapter>,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    cache: FingerprintCache,
    store: Arc<MemoryStore>,
    extractor: MemoryExtractor,
    index: SemanticIndex,
    /// Serializes the check-then-append step of concurrent ingests.
    persist_lock: Mutex<()>,
    cancel: CancellationToken,
}

impl MemoryPipeline {
    /// Open the store, rebuild the index from it, and wire the capabilities in.
    pub async fn init(
        config: CairnConfig,
        generator: Arc<dyn GenerationAdapter>,
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
    ) -> Result<Self, CairnError> {
        Self::init_with_io(config, generator, embedder, Arc::new(StdLogIo)).await
    }

    /// Like [`init`](Self::init), with a custom log I/O layer for the store.
    pub async fn init_with_io(
        config: CairnConfig,
        generator: Arc<dyn GenerationAdapter>,
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
        io: Arc<dyn LogIo>,
    ) -> Result<Self, CairnError> {
        recording::register_metrics();
        let cancel = CancellationToken::new();
        let store = Arc::new(MemoryStore::open_with_io(&config.store, io).await?);
        let cache = FingerprintCache::from_config(&config.cache);
        let extractor = MemoryExtractor::new(Arc::clone(&generator), config.extraction.clone());
        let index = SemanticIndex::new(Arc::clone(&store), embedder.clone(), config.index.clone());
        let report = index.rebuild(&cancel).await?;

        info!(
            namespace = %config.store.namespace,
            memories = report.indexed,
            degraded = report.degraded,
            cache = cache.backend().name(),
            embeddings = embedder.is_some(),
            "memory pipeline initialized"
        );

        Ok(Self {
            config,
            generator,
            embedder,
            cache,
            store,
            extractor,
            index,
            persist_lock: Mutex::new(()),
            cancel,
        })
    }

    /// Build the configured command generator and HTTP embedder, then [`init`](Self::init).
    ///
    /// Without `embedding.endpoint` the pipeline runs in keyword mode.
    pub async fn from_config(config: CairnConfig) -> Result<Self, CairnError> {
        let generator: Arc<dyn GenerationAdapter> =
            Arc::new(CommandGenerator::from_config(&config.generation)?);
        let embedder = HttpEmbedder::from_config(&config.embedding)?
            .map(|e| Arc::new(e) as Arc<dyn EmbeddingAdapter>);
        Self::init(config, generator, embedder).await
    }

    /// Override the backoff applied between failed generation attempts.
    pub fn with_generation_backoff(mut self, base: Duration) -> Self {
        self.extractor = MemoryExtractor::new(Arc::clone(&self.generator), self.config.extraction.clone())
            .with_retry_backoff(base);
        self
    }

    pub fn config(&self) -> &CairnConfig {
        &self.config
    }

    pub fn cache(&self) -> &FingerprintCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub fn index(&self) -> &SemanticIndex {
        &self.index
    }

    pub fn extractor(&self) -> &MemoryExtractor {
        &self.extractor
    }

    /// Stop in-flight and future operations of this session with `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Extract memories from the trailing window of `history`, persist the new
    /// ones, and index them.
    ///
    /// Extraction is memoized on the formatted transcript, so an unchanged
    /// window replays the same memories (same ids) and nothing is appended twice.
    /// Memories dropped by [`apply_retention`](Self::apply_retention) stay dropped.
    pub async fn ingest(&self, history: &[ConversationMessage]) -> Result<IngestReport, CairnError> {
        if self.cancel.is_cancelled() {
            return Err(CairnError::cancelled("ingest"));
        }

        let transcript = self.extractor.prepare(history);
        let mut report = IngestReport {
            window_messages: transcript.lines().count(),
            ..IngestReport::default()
        };
        if transcript.is_empty() {
            debug!("no user or assistant messages in window, nothing to ingest");
            return Ok(report);
        }

        let memories: Vec<Memory> = self
            .cache
            .get_or_compute_json(EXTRACTION_STAGE, transcript.as_bytes(), || {
                self.extractor.extract_transcript(&transcript, &self.cancel)
            })
            .await?;
        report.extracted = memories.len();

        let _persist = self.persist_lock.lock().await;
        for memory in &memories {
            if self.store.is_retired(&memory.id).await {
                report.skipped_retired += 1;
                continue;
            }
            if self.store.contains(&memory.id).await {
                report.skipped_existing += 1;
                if self.index.entry(&memory.id).await.is_some() {
                    continue;
                }
            } else {
                self.store.append(memory, &self.cancel).await?;
                report.appended += 1;
            }

            let entry = self.index.index_one(memory, &self.cancel).await?;
            if entry.vector.is_none() {
                report.degraded += 1;
            }
        }

        info!(
            extracted = report.extracted,
            appended = report.appended,
            skipped = report.skipped_existing,
            retired = report.skipped_retired,
            degraded = report.degraded,
            "ingested conversation window"
        );
        Ok(report)
    }

    /// Ranked search over indexed memories. See [`SemanticIndex::search`].
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<ScoredMemory>, CairnError> {
        self.index.search(query, limit, &self.cancel).await
    }

    /// Search with `index.default_limit`.
    pub async fn search_default(&self, query: &str) -> Result<Vec<ScoredMemory>, CairnError> {
        self.index.search_default(query, &self.cancel).await
    }

    /// Apply an external retention decision: rewrite the log keeping only
    /// memories for which `retain` returns true, then drop their index entries.
    pub async fn apply_retention<F>(&self, retain: F) -> Result<CompactionReport, CairnError>
    where
        F: Fn(&Memory) -> bool,
    {
        let report = self.store.compact(retain, &self.cancel).await?;
        self.index.prune().await;
        Ok(report)
    }

    /// Cancel outstanding work, shut the capabilities down, and release the
    /// namespace lock.
    pub async fn close(self) -> Result<(), CairnError> {
        self.cancel.cancel();

        if let Err(e) = self.generator.shutdown().await {
            warn!(error = %e, adapter = self.generator.name(), "generator shutdown failed");
        }
        if let Some(embedder) = &self.embedder
            && let Err(e) = embedder.shutdown().await
        {
            warn!(error = %e, adapter = embedder.name(), "embedder shutdown failed");
        }

        info!(namespace = %self.config.store.namespace, "memory pipeline closed");
        Ok(())
    }
}

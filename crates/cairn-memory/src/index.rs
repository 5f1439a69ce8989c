// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Semantic index over stored memories.
//!
//! Holds one [`IndexEntry`] per persisted memory and answers ranked queries.
//! Entries reference memories by id only; the [`MemoryStore`] stays the
//! owner, and memories that vanish from it are skipped at query time.
//! When the embedding capability is unavailable the index keeps accepting
//! memories without vectors and scores them by keyword overlap.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use cairn_config::model::IndexConfig;
use cairn_core::error::CairnError;
use cairn_core::traits::EmbeddingAdapter;
use cairn_core::types::EmbeddingInput;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recording;
use crate::store::MemoryStore;
use crate::types::{Memory, ScoreMethod, ScoredMemory, cosine_similarity};

/// Index record for one memory. `vector` is `None` in degraded mode.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub memory_id: Uuid,
    pub vector: Option<Vec<f32>>,
}

/// Result of [`SemanticIndex::rebuild`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildReport {
    pub indexed: usize,
    /// Entries stored without a vector.
    pub degraded: usize,
}

#[derive(Default)]
struct IndexState {
    entries: HashMap<Uuid, IndexEntry>,
    dimension: Option<usize>,
}

/// Bounded FIFO cache of query embeddings.
struct QueryCache {
    capacity: usize,
    vectors: HashMap<String, Vec<f32>>,
    order: VecDeque<String>,
}

impl QueryCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            vectors: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, query: &str) -> Option<Vec<f32>> {
        self.vectors.get(query).cloned()
    }

    fn insert(&mut self, query: String, vector: Vec<f32>) {
        if self.capacity == 0 || self.vectors.contains_key(&query) {
            return;
        }
        while self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.vectors.remove(&oldest);
            }
        }
        self.order.push_back(query.clone());
        self.vectors.insert(query, vector);
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Vector index with keyword fallback.
pub struct SemanticIndex {
    store: Arc<MemoryStore>,
    embedder: Option<Arc<dyn EmbeddingAdapter>>,
    config: IndexConfig,
    state: RwLock<IndexState>,
    query_cache: Mutex<QueryCache>,
}

impl SemanticIndex {
    /// Create an empty index. With no embedder every entry is keyword-only.
    pub fn new(
        store: Arc<MemoryStore>,
        embedder: Option<Arc<dyn EmbeddingAdapter>>,
        config: IndexConfig,
    ) -> Self {
        let query_cache = Mutex::new(QueryCache::new(config.query_cache_capacity));
        Self {
            store,
            embedder,
            config,
            state: RwLock::new(IndexState::default()),
            query_cache,
        }
    }

    pub fn store(&self) -> &Arc<MemoryStore> {
        &self.store
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Vector dimensionality, fixed by the first embedded memory.
    pub async fn dimension(&self) -> Option<usize> {
        self.state.read().await.dimension
    }

    pub async fn entry(&self, memory_id: &Uuid) -> Option<IndexEntry> {
        self.state.read().await.entries.get(memory_id).cloned()
    }

    /// Number of cached query embeddings.
    pub async fn cached_queries(&self) -> usize {
        self.query_cache.lock().await.len()
    }

    /// Embed and index one persisted memory.
    ///
    /// An unavailable embedding capability yields a vector-less entry rather
    /// than an error. Indexing never changes `accessed_count`.
    pub async fn index_one(
        &self,
        memory: &Memory,
        cancel: &CancellationToken,
    ) -> Result<IndexEntry, CairnError> {
        if !self.store.contains(&memory.id).await {
            return Err(CairnError::InvalidArgument(format!(
                "memory {} must be persisted before it is indexed",
                memory.id
            )));
        }

        let vector = match self.embed(&memory.content, cancel).await {
            Ok(vector) => Some(vector),
            Err(CairnError::EmbeddingUnavailable { message }) => {
                warn!(memory_id = %memory.id, reason = %message, "embedding unavailable, indexing without vector");
                None
            }
            Err(e) => return Err(e),
        };

        let entry = IndexEntry {
            memory_id: memory.id,
            vector,
        };

        let mut state = self.state.write().await;
        if let Some(vector) = &entry.vector {
            match state.dimension {
                None => state.dimension = Some(vector.len()),
                Some(dim) if dim != vector.len() => {
                    return Err(CairnError::InvalidArgument(format!(
                        "embedding for memory {} has {} dimensions, index expects {dim}",
                        memory.id,
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
        }
        state.entries.insert(memory.id, entry.clone());
        debug!(memory_id = %memory.id, vector = entry.vector.is_some(), "memory indexed");
        Ok(entry)
    }

    /// Drop every entry and re-index all memories currently in the store.
    pub async fn rebuild(&self, cancel: &CancellationToken) -> Result<RebuildReport, CairnError> {
        {
            let mut state = self.state.write().await;
            state.entries.clear();
            state.dimension = None;
        }

        let mut report = RebuildReport::default();
        for memory in self.store.memories().await {
            let entry = self.index_one(&memory, cancel).await?;
            report.indexed += 1;
            if entry.vector.is_none() {
                report.degraded += 1;
            }
        }
        info!(indexed = report.indexed, degraded = report.degraded, "semantic index rebuilt");
        Ok(report)
    }

    /// Remove the entry for `memory_id`. Returns whether one existed.
    pub async fn remove(&self, memory_id: &Uuid) -> bool {
        self.state.write().await.entries.remove(memory_id).is_some()
    }

    /// Remove entries whose memory no longer exists in the store.
    pub async fn prune(&self) -> usize {
        let ids: Vec<Uuid> = self.state.read().await.entries.keys().copied().collect();
        let mut orphaned = Vec::new();
        for id in ids {
            if !self.store.contains(&id).await {
                orphaned.push(id);
            }
        }

        let mut state = self.state.write().await;
        for id in &orphaned {
            state.entries.remove(id);
        }
        if !orphaned.is_empty() {
            info!(removed = orphaned.len(), "pruned orphaned index entries");
        }
        orphaned.len()
    }

    /// Search with the configured default limit.
    pub async fn search_default(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredMemory>, CairnError> {
        self.search(query, self.config.default_limit, cancel).await
    }

    /// Rank memories against `query` and return at most `limit` results.
    ///
    /// Vector-scored results come first, ordered by cosine similarity, then
    /// keyword-scored results ordered by overlap. Ties go to the newer memory.
    /// Keyword-scored memories sharing no token with the query are left out,
    /// so fewer than `limit` results can come back.
    /// Every returned memory has its `accessed_count` incremented by one, and
    /// the returned copy reflects that increment.
    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<ScoredMemory>, CairnError> {
        if limit == 0 {
            return Err(CairnError::InvalidArgument(
                "search limit must be at least 1".to_string(),
            ));
        }
        let started = Instant::now();

        let entries: Vec<IndexEntry> = self.state.read().await.entries.values().cloned().collect();
        let needs_vector = entries.iter().any(|e| e.vector.is_some());
        let query_vector = if needs_vector {
            self.query_vector(query, cancel).await?
        } else {
            None
        };
        let query_terms = tokenize(query);
        let min_similarity = self.config.min_similarity.map(|v| v as f32);

        let mut ranked = Vec::with_capacity(entries.len());
        for entry in entries {
            let Some(memory) = self.store.get(&entry.memory_id).await else {
                debug!(memory_id = %entry.memory_id, "indexed memory missing from store, skipping");
                continue;
            };

            match (&query_vector, &entry.vector) {
                (Some(q), Some(v)) => {
                    let score = cosine_similarity(q, v);
                    if min_similarity.is_some_and(|min| score < min) {
                        continue;
                    }
                    ranked.push(ScoredMemory {
                        memory,
                        score,
                        method: ScoreMethod::Vector,
                    });
                }
                _ => {
                    let score = keyword_score(&query_terms, &memory);
                    if score > 0.0 {
                        ranked.push(ScoredMemory {
                            memory,
                            score,
                            method: ScoreMethod::Keyword,
                        });
                    }
                }
            }
        }

        ranked.sort_by(compare_ranked);
        ranked.truncate(limit);

        let ids: Vec<Uuid> = ranked.iter().map(|r| r.memory.id).collect();
        let updated: HashMap<Uuid, Memory> = self
            .store
            .record_access(&ids, cancel)
            .await?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();

        let mut results = Vec::with_capacity(ranked.len());
        for mut result in ranked {
            // The memory may have been removed between ranking and access recording.
            let Some(memory) = updated.get(&result.memory.id) else {
                continue;
            };
            result.memory = memory.clone();
            results.push(result);
        }

        let vector_hits = results.iter().filter(|r| r.method == ScoreMethod::Vector).count();
        recording::record_search_results("vector", vector_hits);
        recording::record_search_results("keyword", results.len() - vector_hits);
        recording::record_search_latency(started.elapsed().as_secs_f64());
        debug!(
            results = results.len(),
            vector = vector_hits,
            degraded = query_vector.is_none(),
            "search complete"
        );
        Ok(results)
    }

    /// Query embedding, from cache when possible. `None` means degraded mode.
    async fn query_vector(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<f32>>, CairnError> {
        if let Some(vector) = self.query_cache.lock().await.get(query) {
            return Ok(Some(vector));
        }

        match self.embed(query, cancel).await {
            Ok(vector) => {
                self.query_cache
                    .lock()
                    .await
                    .insert(query.to_string(), vector.clone());
                Ok(Some(vector))
            }
            Err(CairnError::EmbeddingUnavailable { message }) => {
                warn!(reason = %message, "query embedding unavailable, falling back to keyword scoring");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, CairnError> {
        let Some(embedder) = &self.embedder else {
            return Err(CairnError::EmbeddingUnavailable {
                message: "no embedding capability configured".to_string(),
            });
        };

        let input = EmbeddingInput {
            texts: vec![text.to_string()],
        };
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(CairnError::cancelled("embedding")),
            output = embedder.embed(input) => output?,
        };

        match output.embeddings.into_iter().next() {
            Some(vector) if !vector.is_empty() => Ok(vector),
            _ => Err(CairnError::EmbeddingUnavailable {
                message: format!("{} returned no vector", embedder.name()),
            }),
        }
    }
}

/// Vector tier first, then score descending, then newer timestamp first.
fn compare_ranked(a: &ScoredMemory, b: &ScoredMemory) -> Ordering {
    let tier = |m: ScoreMethod| match m {
        ScoreMethod::Vector => 0,
        ScoreMethod::Keyword => 1,
    };
    tier(a.method)
        .cmp(&tier(b.method))
        .then_with(|| b.score.total_cmp(&a.score))
        .then_with(|| b.memory.timestamp.cmp(&a.memory.timestamp))
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Fraction of query terms present in the memory's content or tags, in [0, 1].
fn keyword_score(query_terms: &HashSet<String>, memory: &Memory) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let mut doc_terms = tokenize(&memory.content);
    for tag in &memory.metadata.tags {
        doc_terms.extend(tokenize(tag));
    }
    let overlap = query_terms.iter().filter(|t| doc_terms.contains(*t)).count();
    overlap as f32 / query_terms.len() as f32
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use async_trait::async_trait;
    use cairn_config::model::StoreConfig;
    use cairn_core::traits::PluginAdapter;
    use cairn_core::types::{AdapterType, EmbeddingOutput, HealthStatus};
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::types::{MemoryCategory, MemoryMetadata};

    /// Looks vectors up by exact text; unknown text is unavailable.
    struct TableEmbedder {
        table: HashMap<String, Vec<f32>>,
        calls: AtomicUsize,
    }

    impl TableEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                table: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl PluginAdapter for TableEmbedder {
        fn name(&self) -> &str {
            "table"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Embedding
        }
        async fn health_check(&self) -> Result<HealthStatus, CairnError> {
            Ok(HealthStatus::Healthy)
        }
        async fn shutdown(&self) -> Result<(), CairnError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EmbeddingAdapter for TableEmbedder {
        async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, CairnError> {
            self.calls.fetch_add(1, AtomicOrdering::SeqCst);
            let mut embeddings = Vec::new();
            for text in &input.texts {
                let vector = self.table.get(text).cloned().ok_or_else(|| {
                    CairnError::EmbeddingUnavailable {
                        message: format!("no vector for {text:?}"),
                    }
                })?;
                embeddings.push(vector);
            }
            let dimensions = embeddings.first().map_or(0, Vec::len);
            Ok(EmbeddingOutput {
                embeddings,
                dimensions,
            })
        }
    }

    async fn open_store(dir: &Path) -> Arc<MemoryStore> {
        let config = StoreConfig {
            directory: dir.display().to_string(),
            namespace: "index-test".to_string(),
            max_attempts: 3,
            base_delay_ms: 1,
        };
        Arc::new(MemoryStore::open(&config).await.unwrap())
    }

    async fn persist(store: &MemoryStore, content: &str, category: MemoryCategory) -> Memory {
        let memory = Memory::new(content, category, MemoryMetadata::from_source("test"));
        store.append(&memory, &CancellationToken::new()).await.unwrap();
        memory
    }

    fn index_with(store: Arc<MemoryStore>, embedder: Option<Arc<TableEmbedder>>) -> SemanticIndex {
        SemanticIndex::new(
            store,
            embedder.map(|e| e as Arc<dyn EmbeddingAdapter>),
            IndexConfig::default(),
        )
    }

    #[tokio::test]
    async fn ranks_by_cosine_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let embedder = Arc::new(TableEmbedder::new(&[
            ("east", vec![1.0, 0.0]),
            ("north", vec![0.0, 1.0]),
            ("mostly east", vec![0.9, 0.1]),
            ("query", vec![1.0, 0.0]),
        ]));
        let index = index_with(Arc::clone(&store), Some(embedder));
        let cancel = CancellationToken::new();

        for content in ["east", "north", "mostly east"] {
            let m = persist(&store, content, MemoryCategory::Pattern).await;
            index.index_one(&m, &cancel).await.unwrap();
        }

        let results = index.search("query", 10, &cancel).await.unwrap();
        let order: Vec<&str> = results.iter().map(|r| r.memory.content.as_str()).collect();
        assert_eq!(order, vec!["east", "mostly east", "north"]);
        assert!(results.iter().all(|r| r.method == ScoreMethod::Vector));
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(index.dimension().await, Some(2));
    }

    #[tokio::test]
    async fn zero_limit_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_with(open_store(dir.path()).await, None);
        let err = index
            .search("anything", 0, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CairnError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn search_increments_access_count_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let index = index_with(Arc::clone(&store), None);
        let cancel = CancellationToken::new();

        let m = persist(&store, "cache embeddings by content hash", MemoryCategory::Decision).await;
        index.index_one(&m, &cancel).await.unwrap();
        assert_eq!(store.get(&m.id).await.unwrap().accessed_count, 0);

        let results = index.search("content hash", 5, &cancel).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.accessed_count, 1);
        assert_eq!(store.get(&m.id).await.unwrap().accessed_count, 1);
    }

    #[tokio::test]
    async fn degraded_entries_use_keyword_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let index = index_with(Arc::clone(&store), None);
        let cancel = CancellationToken::new();

        let hit = persist(&store, "Prefer async file IO in tokio", MemoryCategory::Preference).await;
        let miss = persist(&store, "Use tabs", MemoryCategory::Preference).await;
        let half = persist(&store, "File layout follows crates", MemoryCategory::Pattern).await;
        for m in [&hit, &miss, &half] {
            let entry = index.index_one(m, &cancel).await.unwrap();
            assert!(entry.vector.is_none());
        }

        let results = index.search("async file", 5, &cancel).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].memory.id, hit.id);
        assert_eq!(results[0].method, ScoreMethod::Keyword);
        assert!((results[0].score - 1.0).abs() < f32::EPSILON);
        assert_eq!(results[1].memory.id, half.id);
        assert!((results[1].score - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn vector_tier_ranks_ahead_of_keyword_tier() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let embedder = Arc::new(TableEmbedder::new(&[
            ("vector memory", vec![0.0, 1.0]),
            ("search", vec![1.0, 0.0]),
        ]));
        let index = index_with(Arc::clone(&store), Some(embedder));
        let cancel = CancellationToken::new();

        let vectored = persist(&store, "vector memory", MemoryCategory::Learning).await;
        let keyword_only = persist(&store, "search keywords only", MemoryCategory::Learning).await;
        index.index_one(&vectored, &cancel).await.unwrap();
        index.index_one(&keyword_only, &cancel).await.unwrap();

        let results = index.search("search", 5, &cancel).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].method, ScoreMethod::Vector);
        assert_eq!(results[1].method, ScoreMethod::Keyword);
        assert_eq!(results[1].memory.id, keyword_only.id);
    }

    #[tokio::test]
    async fn ties_prefer_newer_memory() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let index = index_with(Arc::clone(&store), None);
        let cancel = CancellationToken::new();

        let mut older = Memory::new("retry on busy", MemoryCategory::Pattern, MemoryMetadata::from_source("t"));
        older.timestamp -= ChronoDuration::hours(1);
        let newer = Memory::new("retry on timeout", MemoryCategory::Pattern, MemoryMetadata::from_source("t"));
        for m in [&older, &newer] {
            store.append(m, &cancel).await.unwrap();
            index.index_one(m, &cancel).await.unwrap();
        }

        let results = index.search("retry", 5, &cancel).await.unwrap();
        assert_eq!(results[0].memory.id, newer.id);
        assert_eq!(results[1].memory.id, older.id);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let embedder = Arc::new(TableEmbedder::new(&[
            ("two", vec![1.0, 0.0]),
            ("three", vec![1.0, 0.0, 0.0]),
        ]));
        let index = index_with(Arc::clone(&store), Some(embedder));
        let cancel = CancellationToken::new();

        let two = persist(&store, "two", MemoryCategory::Learning).await;
        let three = persist(&store, "three", MemoryCategory::Learning).await;
        index.index_one(&two, &cancel).await.unwrap();
        let err = index.index_one(&three, &cancel).await.unwrap_err();
        assert!(matches!(err, CairnError::InvalidArgument(_)));
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn unpersisted_memory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let index = index_with(open_store(dir.path()).await, None);
        let stray = Memory::new("never stored", MemoryCategory::Learning, MemoryMetadata::from_source("t"));
        let err = index
            .index_one(&stray, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CairnError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn missing_memory_is_skipped_and_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let index = index_with(Arc::clone(&store), None);
        let cancel = CancellationToken::new();

        let keep = persist(&store, "keep this note", MemoryCategory::Learning).await;
        let gone = persist(&store, "note to delete", MemoryCategory::Learning).await;
        index.index_one(&keep, &cancel).await.unwrap();
        index.index_one(&gone, &cancel).await.unwrap();

        store.compact(|m| m.id != gone.id, &cancel).await.unwrap();

        let results = index.search("note", 5, &cancel).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].memory.id, keep.id);

        assert_eq!(index.prune().await, 1);
        assert_eq!(index.len().await, 1);
    }

    #[tokio::test]
    async fn query_embeddings_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let embedder = Arc::new(TableEmbedder::new(&[("doc", vec![1.0, 0.0]), ("q", vec![1.0, 0.0])]));
        let index = index_with(Arc::clone(&store), Some(Arc::clone(&embedder)));
        let cancel = CancellationToken::new();

        let m = persist(&store, "doc", MemoryCategory::Learning).await;
        index.index_one(&m, &cancel).await.unwrap();
        index.search("q", 1, &cancel).await.unwrap();
        index.search("q", 1, &cancel).await.unwrap();

        assert_eq!(embedder.calls.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(index.cached_queries().await, 1);
    }

    #[tokio::test]
    async fn rebuild_reindexes_store_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(dir.path()).await;
        let embedder = Arc::new(TableEmbedder::new(&[("a", vec![1.0, 0.0])]));
        let index = index_with(Arc::clone(&store), Some(embedder));

        persist(&store, "a", MemoryCategory::Learning).await;
        persist(&store, "b", MemoryCategory::Learning).await;

        let report = index.rebuild(&CancellationToken::new()).await.unwrap();
        assert_eq!(report, RebuildReport { indexed: 2, degraded: 1 });
        assert_eq!(index.len().await, 2);
    }

    #[test]
    fn query_cache_evicts_oldest() {
        let mut cache = QueryCache::new(2);
        cache.insert("a".into(), vec![1.0]);
        cache.insert("b".into(), vec![2.0]);
        cache.insert("c".into(), vec![3.0]);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c"), Some(vec![3.0]));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn keyword_score_counts_tags() {
        let mut metadata = MemoryMetadata::from_source("t");
        metadata.tags.insert("caching".to_string());
        let memory = Memory::new("Use a strategy per stage", MemoryCategory::Pattern, metadata);
        let terms = tokenize("Caching strategy");
        assert!((keyword_score(&terms, &memory) - 1.0).abs() < f32::EPSILON);
        assert_eq!(keyword_score(&HashSet::new(), &memory), 0.0);
    }
}

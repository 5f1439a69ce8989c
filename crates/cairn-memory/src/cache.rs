// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed memoization of pipeline-stage outputs.
//!
//! A [`FingerprintCache`] keys every payload by a SHA-256 fingerprint over
//! `(stage name, input bytes)`. Concurrent requests for the same fingerprint
//! collapse onto a single computation: the first caller becomes the leader
//! and runs the computation, later callers wait on a `watch` channel and
//! receive the leader's outcome. Failures are never stored.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cairn_config::model::{CacheBackendKind, CacheConfig};
use cairn_core::error::CairnError;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};

use crate::recording;

/// Stable identifier of a (stage, input) pair: lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash the stage name (length-prefixed, so stage/input boundaries are
    /// unambiguous) followed by the input bytes.
    pub fn compute(stage_name: &str, input: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((stage_name.len() as u64).to_le_bytes());
        hasher.update(stage_name.as_bytes());
        hasher.update(input);
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One memoized stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub fingerprint: String,
    pub stage_name: String,
    #[serde(with = "hex_payload")]
    pub payload: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

mod hex_payload {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// Storage for cache entries. Only [`FingerprintCache`] writes to it.
#[async_trait]
pub trait CacheBackend: Send + Sync + 'static {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Fetch the entry for a fingerprint, if present.
    async fn load(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CairnError>;

    /// Insert or overwrite the entry for `entry.fingerprint`.
    async fn store(&self, entry: CacheEntry) -> Result<(), CairnError>;

    /// Number of stored entries.
    async fn len(&self) -> Result<usize, CairnError>;
}

/// Process-local cache storage.
#[derive(Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn load(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CairnError> {
        Ok(self.entries.read().await.get(fingerprint.as_str()).cloned())
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CairnError> {
        self.entries
            .write()
            .await
            .insert(entry.fingerprint.clone(), entry);
        Ok(())
    }

    async fn len(&self) -> Result<usize, CairnError> {
        Ok(self.entries.read().await.len())
    }
}

/// On-disk cache storage: `<root>/<fp[..2]>/<fp>.json`, one JSON blob per entry.
///
/// Blobs are written to a temporary sibling and renamed into place, so a
/// reader never observes a partial entry. Blobs that fail to decode are
/// treated as misses and get overwritten by the next computation.
pub struct DiskCacheBackend {
    root: PathBuf,
}

impl DiskCacheBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        let shard = fingerprint.get(..2).unwrap_or("00");
        self.root.join(shard).join(format!("{fingerprint}.json"))
    }
}

fn storage_err(path: &Path, source: std::io::Error) -> CairnError {
    CairnError::Storage {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CacheBackend for DiskCacheBackend {
    fn name(&self) -> &str {
        "disk"
    }

    async fn load(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, CairnError> {
        let path = self.path_for(fingerprint.as_str());
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(&path, e)),
        };

        match serde_json::from_slice::<CacheEntry>(&bytes) {
            Ok(entry) if entry.fingerprint == fingerprint.as_str() => Ok(Some(entry)),
            Ok(_) => {
                warn!(path = %path.display(), "cache blob fingerprint mismatch, treating as miss");
                Ok(None)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache blob, treating as miss");
                Ok(None)
            }
        }
    }

    async fn store(&self, entry: CacheEntry) -> Result<(), CairnError> {
        let path = self.path_for(&entry.fingerprint);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| storage_err(parent, e))?;
        }

        let bytes = serde_json::to_vec(&entry).map_err(|source| CairnError::Serialization {
            context: format!("encoding cache entry {}", entry.fingerprint),
            source,
        })?;

        let tmp = path.with_extension(format!("json.tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_err(&tmp, e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(storage_err(&path, e));
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, CairnError> {
        let mut count = 0;
        let mut shards = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(storage_err(&self.root, e)),
        };
        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| storage_err(&self.root, e))?
        {
            if !shard.path().is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path())
                .await
                .map_err(|e| storage_err(&shard.path(), e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| storage_err(&shard.path(), e))?
            {
                if file.path().extension().is_some_and(|ext| ext == "json") {
                    count += 1;
                }
            }
        }
        Ok(count)
    }
}

/// Outcome broadcast by a leader to the callers waiting on its fingerprint.
#[derive(Debug, Clone)]
enum Outcome {
    Ready(Vec<u8>),
    Failed(Arc<CairnError>),
}

/// Counters exposed by [`FingerprintCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub computations: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

/// Removes the in-flight marker when the leader finishes, fails, or is dropped.
///
/// Dropping the marker also drops the last `watch::Sender`, which wakes any
/// waiter whose leader vanished without an outcome.
struct InFlightGuard<'a> {
    in_flight: &'a DashMap<String, watch::Receiver<Option<Outcome>>>,
    key: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
    }
}

enum Role {
    Leader(watch::Sender<Option<Outcome>>),
    Waiter(watch::Receiver<Option<Outcome>>),
}

/// Content-addressed cache with at-most-one concurrent computation per fingerprint.
pub struct FingerprintCache {
    backend: Arc<dyn CacheBackend>,
    in_flight: DashMap<String, watch::Receiver<Option<Outcome>>>,
    counters: Counters,
}

impl FingerprintCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            in_flight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Cache backed by a process-local map.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCacheBackend::new()))
    }

    /// Build the cache selected by `[cache]` configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        match config.backend {
            CacheBackendKind::Memory => Self::in_memory(),
            CacheBackendKind::Disk => Self::new(Arc::new(DiskCacheBackend::new(&config.directory))),
        }
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            computations: self.counters.computations.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    /// Return the cached payload for `(stage_name, input)`, computing it if absent.
    ///
    /// `compute` runs at most once among all concurrent callers sharing the
    /// fingerprint. Waiters receive the leader's payload, or a replica of the
    /// leader's error (same variant) if its computation failed.
    /// A failed computation leaves no entry behind.
    pub async fn get_or_compute<F, Fut>(
        &self,
        stage_name: &str,
        input: &[u8],
        compute: F,
    ) -> Result<Vec<u8>, CairnError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CairnError>>,
    {
        let fingerprint = Fingerprint::compute(stage_name, input);
        let mut compute = Some(compute);

        loop {
            if let Some(entry) = self.backend.load(&fingerprint).await? {
                self.record_hit(stage_name, &fingerprint);
                return Ok(entry.payload);
            }

            let role = match self.in_flight.entry(fingerprint.as_str().to_string()) {
                Entry::Occupied(occupied) => Role::Waiter(occupied.get().clone()),
                Entry::Vacant(vacant) => {
                    let (tx, rx) = watch::channel(None);
                    vacant.insert(rx);
                    Role::Leader(tx)
                }
            };

            match role {
                Role::Waiter(rx) => {
                    debug!(stage = stage_name, %fingerprint, "waiting on in-flight computation");
                    match wait_for_outcome(rx).await {
                        Some(Outcome::Ready(payload)) => {
                            self.record_hit(stage_name, &fingerprint);
                            return Ok(payload);
                        }
                        Some(Outcome::Failed(err)) => return Err(err.replicate()),
                        // Leader was dropped before finishing; contend again.
                        None => continue,
                    }
                }
                Role::Leader(tx) => {
                    let _guard = InFlightGuard {
                        in_flight: &self.in_flight,
                        key: fingerprint.as_str().to_string(),
                    };

                    // Another leader may have stored the entry between our
                    // lookup and taking the in-flight slot.
                    if let Some(entry) = self.backend.load(&fingerprint).await? {
                        self.record_hit(stage_name, &fingerprint);
                        let _ = tx.send(Some(Outcome::Ready(entry.payload.clone())));
                        return Ok(entry.payload);
                    }

                    let compute = compute.take().ok_or_else(|| {
                        CairnError::Internal("cache computation already consumed".to_string())
                    })?;
                    return self.lead(stage_name, &fingerprint, tx, compute).await;
                }
            }
        }
    }

    /// Typed wrapper over [`get_or_compute`](Self::get_or_compute) using JSON payloads.
    pub async fn get_or_compute_json<T, F, Fut>(
        &self,
        stage_name: &str,
        input: &[u8],
        compute: F,
    ) -> Result<T, CairnError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CairnError>>,
    {
        let payload = self
            .get_or_compute(stage_name, input, || async move {
                let value = compute().await?;
                serde_json::to_vec(&value).map_err(|source| CairnError::Serialization {
                    context: format!("encoding `{stage_name}` payload"),
                    source,
                })
            })
            .await?;

        serde_json::from_slice(&payload).map_err(|source| CairnError::Serialization {
            context: format!("decoding cached `{stage_name}` payload"),
            source,
        })
    }

    async fn lead<F, Fut>(
        &self,
        stage_name: &str,
        fingerprint: &Fingerprint,
        tx: watch::Sender<Option<Outcome>>,
        compute: F,
    ) -> Result<Vec<u8>, CairnError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<u8>, CairnError>>,
    {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        self.counters.computations.fetch_add(1, Ordering::Relaxed);
        recording::record_cache_lookup(stage_name, false);
        debug!(stage = stage_name, %fingerprint, "computing stage output");

        let result = match compute().await {
            Ok(payload) => {
                let entry = CacheEntry {
                    fingerprint: fingerprint.to_string(),
                    stage_name: stage_name.to_string(),
                    payload,
                    created_at: Utc::now(),
                };
                let payload = entry.payload.clone();
                self.backend.store(entry).await.map(|()| payload)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(payload) => {
                let _ = tx.send(Some(Outcome::Ready(payload.clone())));
                Ok(payload)
            }
            Err(e) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                recording::record_cache_failure(stage_name);
                warn!(stage = stage_name, %fingerprint, error = %e, "stage computation failed, nothing cached");
                let _ = tx.send(Some(Outcome::Failed(Arc::new(e.replicate()))));
                Err(e)
            }
        }
    }

    fn record_hit(&self, stage_name: &str, fingerprint: &Fingerprint) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        recording::record_cache_lookup(stage_name, true);
        debug!(stage = stage_name, %fingerprint, "cache hit");
    }
}

/// Wait until the leader publishes an outcome. `None` means the leader was
/// dropped without publishing one.
async fn wait_for_outcome(mut rx: watch::Receiver<Option<Outcome>>) -> Option<Outcome> {
    loop {
        let current = rx.borrow_and_update().clone();
        if current.is_some() {
            return current;
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

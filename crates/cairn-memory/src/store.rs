// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable append-only memory log.
//!
//! Each namespace is one JSON-lines file, `<directory>/<namespace>.jsonl`,
//! owned by exactly one [`MemoryStore`] at a time through an OS lock on
//! `<namespace>.lock`. Updates (access counts) are appended as new versions
//! of a record; readers fold the log by id so the latest version wins while
//! first-append order is preserved.
//!
//! Ids dropped by compaction are recorded in `<namespace>.retired` and never
//! come back, even if a later append carries the same id.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use cairn_config::model::StoreConfig;
use cairn_core::error::CairnError;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::recording;
use crate::types::Memory;

/// Raw byte access to the memory log.
///
/// Calls are blocking and run on the blocking pool. Implementations report
/// transient conditions through the `io::ErrorKind`s listed in
/// [`is_transient_io`]; anything else is treated as permanent.
pub trait LogIo: Send + Sync + 'static {
    /// Append complete newline-terminated records to `path`, creating it if needed.
    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Read the whole log. A missing file reads as empty.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Atomically replace the log contents.
    fn replace(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;
}

/// [`LogIo`] over the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdLogIo;

impl LogIo for StdLogIo {
    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        // A crash can leave a partial record without its newline. Terminate it
        // so the new record starts on its own line.
        if file.metadata()?.len() > 0 {
            file.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        file.write_all(bytes)?;
        file.sync_data()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    fn replace(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = path.with_extension(format!("jsonl.tmp-{}", Uuid::new_v4().simple()));
        let result = (|| {
            let mut file = File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            std::fs::rename(&tmp, path)
        })();
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result
    }
}

/// Error kinds that indicate the filesystem may succeed if asked again,
/// typically a cloud-synced file that is briefly unavailable.
pub fn is_transient_io(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
            | ErrorKind::ResourceBusy
            | ErrorKind::Deadlock
            | ErrorKind::StaleNetworkFileHandle
    )
}

/// Result of [`MemoryStore::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionReport {
    pub kept: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct View {
    order: Vec<Uuid>,
    by_id: HashMap<Uuid, Memory>,
}

impl View {
    fn from_records(records: Vec<Memory>) -> Self {
        let mut view = View::default();
        for memory in records {
            view.upsert(memory);
        }
        view
    }

    fn upsert(&mut self, memory: Memory) {
        if self.by_id.insert(memory.id, memory.clone()).is_none() {
            self.order.push(memory.id);
        }
    }
}

/// Exclusive owner of one namespace's memory log.
pub struct MemoryStore {
    namespace: String,
    log_path: PathBuf,
    lock_path: PathBuf,
    retired_path: PathBuf,
    io: Arc<dyn LogIo>,
    max_attempts: u32,
    base_delay: Duration,
    /// Serializes disk access. Held per attempt, never across backoff.
    write_lock: Mutex<()>,
    /// Serializes read-modify-write sequences (access counts, compaction).
    update_lock: Mutex<()>,
    view: RwLock<View>,
    /// Ids removed by compaction.
    retired: RwLock<HashSet<Uuid>>,
    _lock_file: File,
}

impl MemoryStore {
    /// Open the namespace log on the local filesystem.
    pub async fn open(config: &StoreConfig) -> Result<Self, CairnError> {
        Self::open_with_io(config, Arc::new(StdLogIo)).await
    }

    /// Open the namespace log through a custom [`LogIo`].
    ///
    /// Fails with [`CairnError::NamespaceLocked`] if another store already
    /// owns the namespace.
    pub async fn open_with_io(config: &StoreConfig, io: Arc<dyn LogIo>) -> Result<Self, CairnError> {
        let directory = PathBuf::from(&config.directory);
        tokio::fs::create_dir_all(&directory)
            .await
            .map_err(|source| CairnError::Storage {
                path: directory.clone(),
                source,
            })?;

        let lock_path = directory.join(format!("{}.lock", config.namespace));
        let lock_file = acquire_namespace_lock(&lock_path)?;

        let mut store = Self {
            namespace: config.namespace.clone(),
            log_path: directory.join(format!("{}.jsonl", config.namespace)),
            lock_path,
            retired_path: directory.join(format!("{}.retired", config.namespace)),
            io,
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            write_lock: Mutex::new(()),
            update_lock: Mutex::new(()),
            view: RwLock::new(View::default()),
            retired: RwLock::new(HashSet::new()),
            _lock_file: lock_file,
        };

        let retired = store.read_retired().await?;
        store.retired = RwLock::new(retired);
        let records = store.read_all(&CancellationToken::new()).await?;
        info!(
            namespace = %store.namespace,
            path = %store.log_path.display(),
            records = records.len(),
            retired = store.retired.read().await.len(),
            "memory store opened"
        );
        store.view = RwLock::new(View::from_records(records));
        Ok(store)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn retired_path(&self) -> &Path {
        &self.retired_path
    }

    /// Durably append one memory.
    ///
    /// Transient I/O failures are retried with exponential backoff up to the
    /// configured attempt bound, then surfaced as
    /// [`CairnError::StorageUnavailable`]. Cancelling `cancel` during backoff
    /// stops the retry loop with [`CairnError::Cancelled`].
    ///
    /// Ids retired by [`compact`](Self::compact) are rejected with
    /// [`CairnError::InvalidArgument`].
    pub async fn append(&self, memory: &Memory, cancel: &CancellationToken) -> Result<(), CairnError> {
        if self.is_retired(&memory.id).await {
            return Err(CairnError::InvalidArgument(format!(
                "memory {} was removed by compaction",
                memory.id
            )));
        }
        let line = encode_line(memory)?;
        self.append_bytes(line, "append", cancel).await?;
        self.view.write().await.upsert(memory.clone());
        recording::record_store_append(&self.namespace);
        debug!(memory_id = %memory.id, namespace = %self.namespace, "memory appended");
        Ok(())
    }

    /// Read every record from the log in first-append order, latest version of each.
    ///
    /// Malformed lines (for example a partial record left by a crash) are
    /// skipped with a warning. Retired ids are left out.
    pub async fn read_all(&self, cancel: &CancellationToken) -> Result<Vec<Memory>, CairnError> {
        let io = Arc::clone(&self.io);
        let path = self.log_path.clone();
        let bytes = self
            .with_retry("read", &self.log_path, cancel, move || io.read(&path))
            .await?;
        let retired = self.retired.read().await;
        let mut records = fold_records(&bytes, &self.log_path);
        records.retain(|m| !retired.contains(&m.id));
        Ok(records)
    }

    /// Whether compaction has removed this id for good.
    pub async fn is_retired(&self, id: &Uuid) -> bool {
        self.retired.read().await.contains(id)
    }

    async fn read_retired(&self) -> Result<HashSet<Uuid>, CairnError> {
        let io = Arc::clone(&self.io);
        let path = self.retired_path.clone();
        let bytes = self
            .with_retry("read retired ids", &self.retired_path, &CancellationToken::new(), move || {
                io.read(&path)
            })
            .await?;

        let mut retired = HashSet::new();
        for (index, line) in bytes.split(|b| *b == b'\n').enumerate() {
            let parsed = std::str::from_utf8(line)
                .ok()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(Uuid::parse_str);
            match parsed {
                None if line.iter().all(u8::is_ascii_whitespace) => {}
                Some(Ok(id)) => {
                    retired.insert(id);
                }
                _ => warn!(
                    path = %self.retired_path.display(),
                    line = index + 1,
                    "skipping malformed retired id"
                ),
            }
        }
        Ok(retired)
    }

    /// Latest known version of a memory.
    pub async fn get(&self, id: &Uuid) -> Option<Memory> {
        self.view.read().await.by_id.get(id).cloned()
    }

    pub async fn contains(&self, id: &Uuid) -> bool {
        self.view.read().await.by_id.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.view.read().await.order.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of all memories in first-append order.
    pub async fn memories(&self) -> Vec<Memory> {
        let view = self.view.read().await;
        view.order
            .iter()
            .filter_map(|id| view.by_id.get(id).cloned())
            .collect()
    }

    /// Increment `accessed_count` of each known id by one and persist the new versions.
    ///
    /// Unknown ids are ignored. Returns the updated memories in the order of `ids`.
    pub async fn record_access(
        &self,
        ids: &[Uuid],
        cancel: &CancellationToken,
    ) -> Result<Vec<Memory>, CairnError> {
        let _update = self.update_lock.lock().await;

        let updated: Vec<Memory> = {
            let view = self.view.read().await;
            ids.iter()
                .filter_map(|id| view.by_id.get(id))
                .map(|memory| {
                    let mut memory = memory.clone();
                    memory.accessed_count += 1;
                    memory
                })
                .collect()
        };
        if updated.is_empty() {
            return Ok(updated);
        }

        let mut bytes = Vec::new();
        for memory in &updated {
            bytes.extend(encode_line(memory)?);
        }
        self.append_bytes(bytes, "record access", cancel).await?;

        let mut view = self.view.write().await;
        for memory in &updated {
            view.upsert(memory.clone());
        }
        Ok(updated)
    }

    /// Rewrite the log keeping only the latest version of records for which
    /// `retain` returns true.
    pub async fn compact<F>(&self, retain: F, cancel: &CancellationToken) -> Result<CompactionReport, CairnError>
    where
        F: Fn(&Memory) -> bool,
    {
        let _update = self.update_lock.lock().await;

        let records = self.read_all(cancel).await?;
        let (kept, dropped): (Vec<Memory>, Vec<Memory>) = records.into_iter().partition(|m| retain(m));

        // Retire before rewriting so a crash in between never resurrects an id.
        if !dropped.is_empty() {
            let mut ids = Vec::new();
            for memory in &dropped {
                ids.extend(format!("{}\n", memory.id).into_bytes());
            }
            let io = Arc::clone(&self.io);
            let path = self.retired_path.clone();
            let ids = Arc::new(ids);
            self.with_retry("retire", &self.retired_path, cancel, move || io.append(&path, &ids))
                .await?;
            self.retired
                .write()
                .await
                .extend(dropped.iter().map(|m| m.id));
        }

        let mut bytes = Vec::new();
        for memory in &kept {
            bytes.extend(encode_line(memory)?);
        }

        let io = Arc::clone(&self.io);
        let path = self.log_path.clone();
        self.with_retry("compact", &self.log_path, cancel, move || io.replace(&path, &bytes))
            .await?;

        let report = CompactionReport {
            kept: kept.len(),
            dropped: dropped.len(),
        };
        *self.view.write().await = View::from_records(kept);
        info!(
            namespace = %self.namespace,
            kept = report.kept,
            dropped = report.dropped,
            "memory log compacted"
        );
        Ok(report)
    }

    async fn append_bytes(
        &self,
        bytes: Vec<u8>,
        operation: &'static str,
        cancel: &CancellationToken,
    ) -> Result<(), CairnError> {
        let io = Arc::clone(&self.io);
        let path = self.log_path.clone();
        let bytes = Arc::new(bytes);
        self.with_retry(operation, &self.log_path, cancel, move || io.append(&path, &bytes))
            .await
    }

    /// Run a blocking operation on `path` under the write lock, retrying transient failures.
    async fn with_retry<T, F>(
        &self,
        operation: &'static str,
        path: &Path,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, CairnError>
    where
        T: Send + 'static,
        F: Fn() -> io::Result<T> + Clone + Send + 'static,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(CairnError::cancelled(format!("memory log {operation}")));
            }

            let result = {
                let _guard = self.write_lock.lock().await;
                let op = op.clone();
                tokio::task::spawn_blocking(op)
                    .await
                    .map_err(|e| CairnError::Internal(format!("log {operation} task failed: {e}")))?
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_transient_io(err.kind()) {
                return Err(CairnError::Storage {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
            if attempt >= self.max_attempts {
                warn!(
                    path = %path.display(),
                    attempts = attempt,
                    error = %err,
                    "memory log {operation} retries exhausted"
                );
                return Err(CairnError::StorageUnavailable {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.base_delay.saturating_mul(1u32 << (attempt - 1).min(16));
            if attempt == 1 {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "memory log {operation} hit a transient error; the directory may be on a slow cloud-synced mount, retrying"
                );
            } else {
                debug!(path = %path.display(), attempt, error = %err, "retrying memory log {operation}");
            }
            recording::record_store_retry(&self.namespace);

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(CairnError::cancelled(format!("memory log {operation}")));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

fn acquire_namespace_lock(path: &Path) -> Result<File, CairnError> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|source| CairnError::Storage {
            path: path.to_path_buf(),
            source,
        })?;

    match file.try_lock() {
        Ok(()) => Ok(file),
        Err(TryLockError::WouldBlock) => Err(CairnError::NamespaceLocked {
            path: path.to_path_buf(),
        }),
        Err(TryLockError::Error(source)) => Err(CairnError::Storage {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn encode_line(memory: &Memory) -> Result<Vec<u8>, CairnError> {
    let mut line = serde_json::to_vec(memory).map_err(|source| CairnError::Serialization {
        context: format!("encoding memory {}", memory.id),
        source,
    })?;
    line.push(b'\n');
    Ok(line)
}

fn fold_records(bytes: &[u8], path: &Path) -> Vec<Memory> {
    let mut view = View::default();
    for (index, raw) in bytes.split(|b| *b == b'\n').enumerate() {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    line = index + 1,
                    error = %e,
                    "skipping memory record that is not valid UTF-8"
                );
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Memory>(line) {
            Ok(memory) => view.upsert(memory),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "skipping malformed memory record"
            ),
        }
    }

    let View { order, mut by_id } = view;
    order.into_iter().filter_map(|id| by_id.remove(&id)).collect()
}

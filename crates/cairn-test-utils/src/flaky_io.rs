// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Log I/O layer that fails a scripted number of appends before succeeding.

use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use cairn_memory::store::{LogIo, StdLogIo};

/// Fails the first `failures` appends with `kind`, then delegates to [`StdLogIo`].
///
/// Reads and replaces always delegate.
pub struct FlakyLogIo {
    kind: ErrorKind,
    remaining: AtomicUsize,
    append_calls: AtomicUsize,
    inner: StdLogIo,
}

impl FlakyLogIo {
    /// Fail the first `failures` appends with a transient `WouldBlock`.
    pub fn transient(failures: usize) -> Self {
        Self::failing(failures, ErrorKind::WouldBlock)
    }

    /// Fail the first `failures` appends with `kind`.
    pub fn failing(failures: usize, kind: ErrorKind) -> Self {
        Self {
            kind,
            remaining: AtomicUsize::new(failures),
            append_calls: AtomicUsize::new(0),
            inner: StdLogIo,
        }
    }

    /// Appends attempted so far, failed ones included.
    pub fn append_calls(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }
}

impl LogIo for FlakyLogIo {
    fn append(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(io::Error::new(self.kind, "scripted append failure"));
        }
        self.inner.append(path, bytes)
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn replace(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.inner.replace(path, bytes)
    }
}

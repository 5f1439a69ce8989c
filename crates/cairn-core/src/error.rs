// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Cairn memory pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// The error type shared by every Cairn adapter trait and pipeline stage.
#[derive(Debug, Error)]
pub enum CairnError {
    /// Configuration errors (invalid TOML, out-of-range values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The text-generation capability did not answer within its ceiling.
    #[error("generation timed out after {timeout:?} (attempt {attempt})")]
    GenerationTimeout { timeout: Duration, attempt: u32 },

    /// The text-generation capability failed outright.
    #[error("generation failed on attempt {attempt}: {message}")]
    GenerationError { message: String, attempt: u32 },

    /// Structured parsing of the generation output failed on every attempt.
    #[error("extraction failed after {attempts} attempt(s): {reason}")]
    ExtractionFailed { attempts: u32, reason: String },

    /// A transient storage failure persisted through every retry.
    #[error("storage unavailable at {} after {attempts} attempt(s): {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    /// A non-transient storage failure.
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another store instance holds the lock for this memory namespace.
    #[error("memory namespace is locked by another store: {}", path.display())]
    NamespaceLocked { path: PathBuf },

    /// The embedding capability is unreachable. Callers degrade to keyword search.
    #[error("embedding unavailable: {message}")]
    EmbeddingUnavailable { message: String },

    /// A caller supplied an argument outside the accepted domain.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation observed a cancellation signal and stopped.
    #[error("{operation} cancelled")]
    Cancelled { operation: String },

    /// JSON encoding or decoding failed.
    #[error("serialization error ({context}): {source}")]
    Serialization {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Shorthand for a cancellation error naming the interrupted operation.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        CairnError::Cancelled {
            operation: operation.into(),
        }
    }

    /// Whether this error class is retried locally before being surfaced.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CairnError::GenerationTimeout { .. }
                | CairnError::GenerationError { .. }
                | CairnError::EmbeddingUnavailable { .. }
        )
    }

    /// A copy of this error with the same variant and fields.
    ///
    /// `io::Error` and `serde_json::Error` are not `Clone`, so their sources
    /// are rebuilt from kind and message.
    pub fn replicate(&self) -> Self {
        match self {
            CairnError::Config(msg) => CairnError::Config(msg.clone()),
            CairnError::GenerationTimeout { timeout, attempt } => CairnError::GenerationTimeout {
                timeout: *timeout,
                attempt: *attempt,
            },
            CairnError::GenerationError { message, attempt } => CairnError::GenerationError {
                message: message.clone(),
                attempt: *attempt,
            },
            CairnError::ExtractionFailed { attempts, reason } => CairnError::ExtractionFailed {
                attempts: *attempts,
                reason: reason.clone(),
            },
            CairnError::StorageUnavailable {
                path,
                attempts,
                source,
            } => CairnError::StorageUnavailable {
                path: path.clone(),
                attempts: *attempts,
                source: replicate_io(source),
            },
            CairnError::Storage { path, source } => CairnError::Storage {
                path: path.clone(),
                source: replicate_io(source),
            },
            CairnError::NamespaceLocked { path } => CairnError::NamespaceLocked { path: path.clone() },
            CairnError::EmbeddingUnavailable { message } => CairnError::EmbeddingUnavailable {
                message: message.clone(),
            },
            CairnError::InvalidArgument(msg) => CairnError::InvalidArgument(msg.clone()),
            CairnError::Cancelled { operation } => CairnError::Cancelled {
                operation: operation.clone(),
            },
            CairnError::Serialization { context, source } => CairnError::Serialization {
                context: context.clone(),
                source: serde_json::Error::io(std::io::Error::other(source.to_string())),
            },
            CairnError::Internal(msg) => CairnError::Internal(msg.clone()),
        }
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CairnError::Cancelled { .. })
    }
}

fn replicate_io(source: &std::io::Error) -> std::io::Error {
    std::io::Error::new(source.kind(), source.to_string())
}

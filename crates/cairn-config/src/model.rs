// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Cairn memory pipeline.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Cairn configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CairnConfig {
    /// Process-wide settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Fingerprint cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Durable append store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Bounded extraction pipeline settings.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Semantic index and search settings.
    #[serde(default)]
    pub index: IndexConfig,

    /// Embedding capability settings.
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Text-generation capability settings.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GeneralConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which storage the fingerprint cache keeps its entries in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Process-local map, lost on exit.
    #[default]
    Memory,
    /// One file per fingerprint under `cache.directory`.
    Disk,
}

/// Fingerprint cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Storage backend for cache entries.
    #[serde(default)]
    pub backend: CacheBackendKind,

    /// Directory for the disk backend.
    #[serde(default = "default_cache_directory")]
    pub directory: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::default(),
            directory: default_cache_directory(),
        }
    }
}

fn default_cache_directory() -> String {
    dirs::cache_dir()
        .map(|p| p.join("cairn").join("cache"))
        .unwrap_or_else(|| std::path::PathBuf::from(".cairn/cache"))
        .display()
        .to_string()
}

/// Durable append store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Directory holding one `<namespace>.jsonl` log per namespace.
    #[serde(default = "default_store_directory")]
    pub directory: String,

    /// Logical memory namespace. Exactly one store instance may own it.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Total write attempts per append when the filesystem reports a transient error.
    #[serde(default = "default_store_max_attempts")]
    pub max_attempts: u32,

    /// Backoff before the first retry in milliseconds; doubles on every retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: default_store_directory(),
            namespace: default_namespace(),
            max_attempts: default_store_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_store_directory() -> String {
    dirs::data_dir()
        .map(|p| p.join("cairn").join("memories"))
        .unwrap_or_else(|| std::path::PathBuf::from(".cairn/memories"))
        .display()
        .to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_store_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    250
}

/// Bounded extraction pipeline configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionConfig {
    /// Number of trailing conversation entries considered per extraction.
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,

    /// Per-entry content ceiling in characters, truncation marker included.
    #[serde(default = "default_max_content_length_chars")]
    pub max_content_length_chars: usize,

    /// Generation attempts before extraction gives up.
    #[serde(default = "default_extraction_max_attempts")]
    pub max_attempts: u32,

    /// Ceiling enforced on every generation call, in seconds.
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,

    /// Value recorded in `metadata.source` of every extracted memory.
    #[serde(default = "default_source")]
    pub source: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_messages: default_max_messages(),
            max_content_length_chars: default_max_content_length_chars(),
            max_attempts: default_extraction_max_attempts(),
            generation_timeout_secs: default_generation_timeout_secs(),
            source: default_source(),
        }
    }
}

fn default_max_messages() -> usize {
    20
}

fn default_max_content_length_chars() -> usize {
    500
}

fn default_extraction_max_attempts() -> u32 {
    3
}

fn default_generation_timeout_secs() -> u64 {
    120
}

fn default_source() -> String {
    "conversation".to_string()
}

/// Semantic index and search configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IndexConfig {
    /// Result count used when a caller does not pass an explicit limit.
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Number of query embeddings kept for reuse.
    #[serde(default = "default_query_cache_capacity")]
    pub query_cache_capacity: usize,

    /// Cosine scores below this value are dropped. `None` keeps everything.
    #[serde(default)]
    pub min_similarity: Option<f64>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            query_cache_capacity: default_query_cache_capacity(),
            min_similarity: None,
        }
    }
}

fn default_limit() -> usize {
    5
}

fn default_query_cache_capacity() -> usize {
    256
}

/// Embedding capability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible embeddings API. `None` runs in keyword mode.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Embedding model name sent with every request.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Bearer token for the embeddings API.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedding_timeout_secs() -> u64 {
    30
}

/// Text-generation capability configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// External assistant executable that reads a prompt on stdin.
    #[serde(default)]
    pub command: Option<String>,

    /// Arguments passed to `command`.
    #[serde(default)]
    pub args: Vec<String>,
}

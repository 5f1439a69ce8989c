// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end pipeline testing.
//!
//! `TestHarness` assembles a [`MemoryPipeline`] over a temp directory with
//! mock capabilities and millisecond backoffs, so retry paths run fast.

use std::sync::{Arc, Once};
use std::time::Duration;

use cairn_config::model::{CacheBackendKind, CairnConfig};
use cairn_core::CairnError;
use cairn_core::traits::{EmbeddingAdapter, GenerationAdapter};
use cairn_memory::pipeline::MemoryPipeline;
use cairn_memory::store::{LogIo, StdLogIo};
use cairn_memory::types::ConversationMessage;
use tracing_subscriber::EnvFilter;

use crate::mock_embedder::MockEmbedder;
use crate::mock_generator::MockGenerator;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    responses: Vec<String>,
    embedder: Option<Arc<MockEmbedder>>,
    keyword_only: bool,
    io: Option<Arc<dyn LogIo>>,
    max_attempts: Option<u32>,
    max_messages: Option<usize>,
    disk_cache: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            responses: Vec::new(),
            embedder: None,
            keyword_only: false,
            io: None,
            max_attempts: None,
            max_messages: None,
            disk_cache: false,
        }
    }

    /// Queue replies on the mock generator.
    pub fn with_mock_responses(mut self, responses: Vec<String>) -> Self {
        self.responses = responses;
        self
    }

    /// Use this embedder instead of a fresh hashing [`MockEmbedder`].
    pub fn with_embedder(mut self, embedder: Arc<MockEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Run without any embedding capability.
    pub fn keyword_only(mut self) -> Self {
        self.keyword_only = true;
        self
    }

    /// Put a custom log I/O layer under the store.
    pub fn with_log_io(mut self, io: Arc<dyn LogIo>) -> Self {
        self.io = Some(io);
        self
    }

    /// Override `extraction.max_attempts`.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Override `extraction.max_messages`.
    pub fn with_max_messages(mut self, messages: usize) -> Self {
        self.max_messages = Some(messages);
        self
    }

    /// Keep cache entries on disk under the temp directory.
    pub fn with_disk_cache(mut self) -> Self {
        self.disk_cache = true;
        self
    }

    /// Build the test harness, creating the temp directory and pipeline.
    pub async fn build(self) -> Result<TestHarness, CairnError> {
        let temp_dir = tempfile::TempDir::new()
            .map_err(|e| CairnError::Internal(format!("failed to create temp dir: {e}")))?;

        let mut config = CairnConfig::default();
        config.store.directory = temp_dir.path().join("store").display().to_string();
        config.store.namespace = "test".to_string();
        config.store.base_delay_ms = 1;
        config.cache.directory = temp_dir.path().join("cache").display().to_string();
        config.cache.backend = if self.disk_cache {
            CacheBackendKind::Disk
        } else {
            CacheBackendKind::Memory
        };
        if let Some(attempts) = self.max_attempts {
            config.extraction.max_attempts = attempts;
        }
        if let Some(messages) = self.max_messages {
            config.extraction.max_messages = messages;
        }

        let generator = Arc::new(MockGenerator::with_responses(self.responses));
        let embedder = if self.keyword_only {
            None
        } else {
            Some(self.embedder.unwrap_or_else(|| Arc::new(MockEmbedder::new())))
        };
        let io = self.io.unwrap_or_else(|| Arc::new(StdLogIo));

        let pipeline = MemoryPipeline::init_with_io(
            config.clone(),
            Arc::clone(&generator) as Arc<dyn GenerationAdapter>,
            embedder
                .clone()
                .map(|e| e as Arc<dyn EmbeddingAdapter>),
            io,
        )
        .await?
        .with_generation_backoff(Duration::from_millis(1));

        Ok(TestHarness {
            pipeline,
            generator,
            embedder,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock capabilities and temp storage.
pub struct TestHarness {
    /// The pipeline under test.
    pub pipeline: MemoryPipeline,
    /// The mock generator wired into the pipeline.
    pub generator: Arc<MockGenerator>,
    /// The mock embedder, absent in keyword-only mode.
    pub embedder: Option<Arc<MockEmbedder>>,
    /// Configuration the pipeline was built from.
    pub config: CairnConfig,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Ingest a plain user/assistant exchange.
    pub async fn ingest_exchange(&self, user: &str, assistant: &str) -> Result<usize, CairnError> {
        let history = vec![
            ConversationMessage::user(user),
            ConversationMessage::assistant(assistant),
        ];
        Ok(self.pipeline.ingest(&history).await?.appended)
    }

    /// Add a reply to the mock generator's queue.
    pub async fn add_generator_response(&self, text: impl Into<String>) {
        self.generator.add_response(text).await;
    }
}

/// Install a test-writer subscriber once per process, filtered by `RUST_LOG`.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Cairn integration tests.
//!
//! Provides mock capabilities and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without external services.
//!
//! # Components
//!
//! - [`MockGenerator`] - Mock text generation with scripted replies
//! - [`MockEmbedder`] - Mock embeddings from a table or hashed bag of words
//! - [`FlakyLogIo`] - Log I/O that fails a scripted number of appends
//! - [`TestHarness`] - Pipeline over a temp directory with the mocks wired in

pub mod flaky_io;
pub mod harness;
pub mod mock_embedder;
pub mod mock_generator;

pub use flaky_io::FlakyLogIo;
pub use harness::{TestHarness, init_test_tracing};
pub use mock_embedder::MockEmbedder;
pub use mock_generator::{MockGenerator, MockReply};

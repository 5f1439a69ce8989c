// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Knowledge pipeline for Cairn: conversation history in, ranked memories out.
//!
//! ## Architecture
//!
//! - **FingerprintCache**: content-addressed stage memoization, one computation per fingerprint
//! - **MemoryStore**: append-only JSON-lines log with transient-I/O retry and namespace locking
//! - **MemoryExtractor**: bounded transcript window, generation call, defensive parsing
//! - **RetryMachine**: retry-with-feedback state machine driving the extractor
//! - **SemanticIndex**: cosine-ranked search with keyword fallback
//! - **MemoryPipeline**: session lifecycle facade over all of the above
//! - **CommandGenerator** / **HttpEmbedder**: concrete capabilities
//! - **Types**: Memory, MemoryCategory, ConversationMessage, ScoredMemory

pub mod adapters;
pub mod cache;
pub mod extractor;
pub mod index;
pub mod pipeline;
pub mod recording;
pub mod retry;
pub mod store;
pub mod types;

pub use adapters::{CommandGenerator, HttpEmbedder};
pub use cache::{CacheBackend, CacheStats, DiskCacheBackend, FingerprintCache, InMemoryCacheBackend};
pub use extractor::{MemoryExtractor, ParseOutcome};
pub use index::SemanticIndex;
pub use pipeline::{IngestReport, MemoryPipeline};
pub use retry::{RetryMachine, RetryState};
pub use store::{LogIo, MemoryStore, StdLogIo};
pub use types::*;

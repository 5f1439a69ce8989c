// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock embedding adapter for deterministic testing.
//!
//! Texts registered with [`MockEmbedder::set_vector`] get exactly that vector.
//! Everything else is embedded with a hashed bag of words, so texts sharing
//! words land close together.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use cairn_core::CairnError;
use cairn_core::traits::{EmbeddingAdapter, PluginAdapter};
use cairn_core::types::{AdapterType, EmbeddingInput, EmbeddingOutput, HealthStatus};

/// Dimension of hashed fallback vectors.
pub const HASHED_DIMENSIONS: usize = 32;

/// A mock embedder with a fixed lookup table and a hashing fallback.
pub struct MockEmbedder {
    table: Mutex<HashMap<String, Vec<f32>>>,
    dimensions: usize,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    /// Hashing-only embedder with [`HASHED_DIMENSIONS`] dimensions.
    pub fn new() -> Self {
        Self::with_dimensions(HASHED_DIMENSIONS)
    }

    /// Hashing-only embedder producing vectors of `dimensions`.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            dimensions: dimensions.max(1),
            unavailable: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        }
    }

    /// Embedder answering only from `pairs`. Unknown texts hash into the
    /// same dimension as the first pair.
    pub fn with_table(pairs: &[(&str, Vec<f32>)]) -> Self {
        let dimensions = pairs.first().map_or(HASHED_DIMENSIONS, |(_, v)| v.len());
        let embedder = Self::with_dimensions(dimensions);
        for (text, vector) in pairs {
            embedder.set_vector(text, vector.clone());
        }
        embedder
    }

    /// Pin the vector returned for `text`.
    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        if let Ok(mut table) = self.table.lock() {
            table.insert(text.to_string(), vector);
        }
    }

    /// Make every subsequent call fail with `EmbeddingUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `embed` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        if let Ok(table) = self.table.lock()
            && let Some(vector) = table.get(text)
        {
            return vector.clone();
        }
        hashed_bag_of_words(text, self.dimensions)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

/// Each lowercase word adds 1.0 to the bucket picked by its SHA-256 digest.
fn hashed_bag_of_words(text: &str, dimensions: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimensions];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let digest = Sha256::digest(word.to_lowercase().as_bytes());
        let bucket = u64::from_le_bytes([
            digest[0], digest[1], digest[2], digest[3], digest[4], digest[5], digest[6], digest[7],
        ]) as usize
            % dimensions;
        vector[bucket] += 1.0;
    }
    // Keep empty input from producing a zero vector.
    if vector.iter().all(|v| *v == 0.0) {
        vector[0] = 1.0;
    }
    vector
}

#[async_trait]
impl PluginAdapter for MockEmbedder {
    fn name(&self) -> &str {
        "mock-embedder"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, CairnError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Ok(HealthStatus::Degraded("mock embedder marked unavailable".to_string()))
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    async fn shutdown(&self) -> Result<(), CairnError> {
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for MockEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, CairnError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CairnError::EmbeddingUnavailable {
                message: "mock embedder marked unavailable".to_string(),
            });
        }

        let embeddings: Vec<Vec<f32>> = input.texts.iter().map(|t| self.vector_for(t)).collect();
        let dimensions = embeddings.first().map_or(self.dimensions, Vec::len);
        Ok(EmbeddingOutput {
            embeddings,
            dimensions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(texts: &[&str]) -> EmbeddingInput {
        EmbeddingInput {
            texts: texts.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn table_wins_over_hashing() {
        let embedder = MockEmbedder::with_table(&[("alpha", vec![1.0, 0.0])]);
        let output = embedder.embed(input(&["alpha", "beta"])).await.unwrap();
        assert_eq!(output.embeddings[0], vec![1.0, 0.0]);
        assert_eq!(output.embeddings[1].len(), 2);
        assert_eq!(embedder.calls(), 1);
    }

    #[tokio::test]
    async fn hashing_is_deterministic_and_case_insensitive() {
        let embedder = MockEmbedder::new();
        let output = embedder
            .embed(input(&["Prefers Rust", "prefers rust", ""]))
            .await
            .unwrap();
        assert_eq!(output.embeddings[0], output.embeddings[1]);
        assert_eq!(output.dimensions, HASHED_DIMENSIONS);
        assert!(output.embeddings[2].iter().any(|v| *v != 0.0));
    }

    #[tokio::test]
    async fn unavailable_toggle() {
        let embedder = MockEmbedder::new();
        embedder.set_unavailable(true);
        assert!(matches!(
            embedder.embed(input(&["x"])).await,
            Err(CairnError::EmbeddingUnavailable { .. })
        ));
        assert!(matches!(
            embedder.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
        embedder.set_unavailable(false);
        assert!(embedder.embed(input(&["x"])).await.is_ok());
    }
}

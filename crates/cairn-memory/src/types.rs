// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Memory domain types shared by the extraction, store, and index stages.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single extracted, persisted unit of knowledge.
///
/// Serialized as one self-describing JSON object per log line. Field names
/// are camelCase so the log stays readable outside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    /// Unique identifier for this memory.
    pub id: Uuid,
    /// The knowledge itself, as a standalone statement.
    pub content: String,
    /// What kind of knowledge this is.
    pub category: MemoryCategory,
    /// Extraction time.
    pub timestamp: DateTime<Utc>,
    /// Number of times this memory was returned from a search.
    #[serde(default)]
    pub accessed_count: u64,
    /// Importance, tags, and provenance.
    pub metadata: MemoryMetadata,
}

impl Memory {
    /// Create a fresh memory with a new id, the current timestamp, and no accesses.
    pub fn new(content: impl Into<String>, category: MemoryCategory, metadata: MemoryMetadata) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            category,
            timestamp: Utc::now(),
            accessed_count: 0,
            metadata,
        }
    }
}

/// Importance, tags, and provenance of a memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Importance in [0, 1].
    pub importance: f64,
    /// Free-form labels.
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Where the memory came from (session, tool, ...).
    pub source: String,
}

impl MemoryMetadata {
    /// Importance assumed when the extractor does not provide one.
    pub const DEFAULT_IMPORTANCE: f64 = 0.5;

    /// Metadata with default importance and no tags.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            importance: Self::DEFAULT_IMPORTANCE,
            tags: BTreeSet::new(),
            source: source.into(),
        }
    }
}

/// The fixed set of memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Learning,
    Decision,
    IssueSolved,
    Pattern,
    Preference,
}

impl MemoryCategory {
    /// All categories, in prompt order.
    pub const ALL: [MemoryCategory; 5] = [
        MemoryCategory::Learning,
        MemoryCategory::Decision,
        MemoryCategory::IssueSolved,
        MemoryCategory::Pattern,
        MemoryCategory::Preference,
    ];

    /// Wire label of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Learning => "learning",
            MemoryCategory::Decision => "decision",
            MemoryCategory::IssueSolved => "issue_solved",
            MemoryCategory::Pattern => "pattern",
            MemoryCategory::Preference => "preference",
        }
    }

    /// Parse a label produced by the generation capability.
    ///
    /// Matching ignores case and surrounding whitespace, and accepts `-` or a
    /// space in place of `_`. Unrecognized labels fall back to `Learning`.
    pub fn from_str_value(s: &str) -> Self {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        MemoryCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(MemoryCategory::Learning)
    }
}

/// Speaker of one conversation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// System prompts, tool output, coordination chatter.
    #[serde(other)]
    Other,
}

/// One entry of a raw conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// How a search result was scored. The two scales are not comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScoreMethod {
    /// Cosine similarity in [-1, 1].
    Vector,
    /// Keyword overlap in [0, 1], used when no vector is available.
    Keyword,
}

/// A memory returned from search, with its score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The memory, with `accessed_count` already incremented for this search.
    pub memory: Memory,
    pub score: f32,
    pub method: ScoreMethod,
}

/// Compute cosine similarity `(a·b)/(|a||b|)`, clamped to [-1, 1].
///
/// Returns 0.0 for vectors of different lengths or with zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f32::EPSILON {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_serializes_with_camel_case_fields() {
        let mut tags = BTreeSet::new();
        tags.insert("rust".to_string());
        let memory = Memory::new(
            "Prefer tokio::fs over std::fs in async code",
            MemoryCategory::Preference,
            MemoryMetadata {
                importance: 0.8,
                tags,
                source: "session-1".to_string(),
            },
        );

        let json: serde_json::Value = serde_json::to_value(&memory).unwrap();
        assert_eq!(json["category"], "preference");
        assert_eq!(json["accessedCount"], 0);
        assert_eq!(json["metadata"]["importance"], 0.8);
        assert_eq!(json["metadata"]["tags"][0], "rust");
        assert_eq!(json["metadata"]["source"], "session-1");
        assert!(json["timestamp"].is_string());
        assert!(json["id"].is_string());
    }

    #[test]
    fn category_labels() {
        assert_eq!(MemoryCategory::IssueSolved.as_str(), "issue_solved");
        assert_eq!(
            MemoryCategory::from_str_value("issue_solved"),
            MemoryCategory::IssueSolved
        );
        assert_eq!(
            MemoryCategory::from_str_value(" Issue-Solved "),
            MemoryCategory::IssueSolved
        );
        assert_eq!(
            MemoryCategory::from_str_value("DECISION"),
            MemoryCategory::Decision
        );
    }

    #[test]
    fn unknown_category_falls_back_to_learning() {
        assert_eq!(
            MemoryCategory::from_str_value("personal"),
            MemoryCategory::Learning
        );
        assert_eq!(MemoryCategory::from_str_value(""), MemoryCategory::Learning);
    }

    #[test]
    fn unknown_role_deserializes_as_other() {
        let msg: ConversationMessage = serde_json::from_str(
            r#"{"role":"system","content":"coordinator ping","timestamp":"2026-03-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(msg.role, Role::Other);
    }

    #[test]
    fn cosine_similarity_identical() {
        let v = vec![0.3, 0.4, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_is_scale_invariant() {
        let a = vec![1.0, 2.0];
        let b = vec![10.0, 20.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_and_opposite() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < f32::EPSILON);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_similarity_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}

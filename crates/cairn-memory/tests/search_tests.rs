// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ranked search through the pipeline: ordering, access counts, and degraded mode.

use std::sync::Arc;

use cairn_core::CairnError;
use cairn_memory::types::{ConversationMessage, ScoreMethod};
use cairn_test_utils::{MockEmbedder, TestHarness};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// Build a generator reply; an empty tag means no tags.
fn reply(items: &[(&str, &str, &str)]) -> String {
    let memories: Vec<_> = items
        .iter()
        .map(|(content, category, tag)| {
            let tags: Vec<&str> = Some(*tag).filter(|t| !t.is_empty()).into_iter().collect();
            json!({"content": content, "category": category, "tags": tags})
        })
        .collect();
    json!({ "memories": memories }).to_string()
}

fn history() -> Vec<ConversationMessage> {
    vec![
        ConversationMessage::user("Let's talk about how the project caches things."),
        ConversationMessage::assistant("Sure, here is the current approach."),
    ]
}

/// Results are ordered by cosine similarity to the query.
#[tokio::test]
async fn results_rank_by_cosine_similarity() {
    let embedder = Arc::new(MockEmbedder::with_table(&[
        ("exact match", vec![1.0, 0.0]),
        ("close match", vec![0.9, 0.1]),
        ("orthogonal", vec![0.0, 1.0]),
        ("the query", vec![1.0, 0.0]),
    ]));
    let harness = TestHarness::builder()
        .with_embedder(embedder)
        .with_mock_responses(vec![reply(&[
            ("orthogonal", "learning", ""),
            ("close match", "learning", ""),
            ("exact match", "learning", ""),
        ])])
        .build()
        .await
        .unwrap();
    harness.pipeline.ingest(&history()).await.unwrap();

    let results = harness.pipeline.search("the query", 3).await.unwrap();
    let contents: Vec<&str> = results.iter().map(|r| r.memory.content.as_str()).collect();
    assert_eq!(contents, vec!["exact match", "close match", "orthogonal"]);
    assert!(results.iter().all(|r| r.method == ScoreMethod::Vector));
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!(results[1].score > results[2].score);
}

/// Asking for two out of three related memories returns the best two, best first.
#[tokio::test]
async fn limit_keeps_the_best_results() {
    let embedder = Arc::new(MockEmbedder::with_table(&[
        ("caching strategy", vec![1.0, 0.0, 0.0]),
        ("Prefers a content addressed caching strategy", vec![0.9, 0.1, 0.0]),
        ("Prefers small focused commits", vec![0.0, 0.0, 1.0]),
        ("Caching strategy keys on the input hash", vec![0.8, 0.3, 0.0]),
    ]));
    let harness = TestHarness::builder()
        .with_embedder(embedder)
        .with_mock_responses(vec![reply(&[
            ("Prefers a content addressed caching strategy", "preference", "caching"),
            ("Prefers small focused commits", "preference", "git"),
            ("Caching strategy keys on the input hash", "pattern", "caching"),
        ])])
        .build()
        .await
        .unwrap();
    harness.pipeline.ingest(&history()).await.unwrap();

    let results = harness.pipeline.search("caching strategy", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].score > results[1].score);
    assert!(results[0].memory.content.starts_with("Prefers a content"));
    assert!(
        results
            .iter()
            .all(|r| r.memory.content.to_lowercase().contains("caching strategy"))
    );
}

/// Search bumps `accessed_count` on returned memories; indexing does not.
#[tokio::test]
async fn search_records_access() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![reply(&[("Deploys run on Fridays", "decision", "")])])
        .build()
        .await
        .unwrap();
    harness.pipeline.ingest(&history()).await.unwrap();

    let store = harness.pipeline.store();
    let id = store.memories().await[0].id;
    assert_eq!(store.get(&id).await.unwrap().accessed_count, 0);

    let first = harness.pipeline.search("deploys", 1).await.unwrap();
    assert_eq!(first[0].memory.accessed_count, 1);
    let second = harness.pipeline.search("deploys", 1).await.unwrap();
    assert_eq!(second[0].memory.accessed_count, 2);

    let persisted = store.read_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(persisted.len(), 1);
    assert_eq!(persisted[0].accessed_count, 2);
}

/// Without embeddings every result is keyword-scored.
#[tokio::test]
async fn keyword_mode_tags_results() {
    let harness = TestHarness::builder()
        .keyword_only()
        .with_mock_responses(vec![reply(&[
            ("Release builds strip debug symbols", "learning", "release"),
            ("Unrelated note about lunch", "learning", ""),
        ])])
        .build()
        .await
        .unwrap();
    let report = harness.pipeline.ingest(&history()).await.unwrap();
    assert_eq!(report.degraded, 2);

    let results = harness.pipeline.search("release symbols", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].method, ScoreMethod::Keyword);
    assert!((results[0].score - 1.0).abs() < 1e-6);
}

/// Keyword mode keeps the best-overlapping memories up to the limit and
/// leaves out memories that share no term with the query.
#[tokio::test]
async fn keyword_mode_limits_and_orders_by_overlap() {
    let harness = TestHarness::builder()
        .keyword_only()
        .with_mock_responses(vec![reply(&[
            ("Prefers a content addressed caching strategy keyed by hash", "preference", ""),
            ("Prefers caching build outputs", "preference", ""),
            ("Caching strategy lives in the build crate", "pattern", ""),
        ])])
        .build()
        .await
        .unwrap();
    harness.pipeline.ingest(&history()).await.unwrap();

    let results = harness.pipeline.search("caching strategy hash", 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.method == ScoreMethod::Keyword));
    assert!(results[0].memory.content.starts_with("Prefers a content"));
    assert!(results[1].memory.content.starts_with("Caching strategy"));
    assert!((results[0].score - 1.0).abs() < 1e-6);
    assert!(results[0].score > results[1].score);

    assert_eq!(harness.pipeline.search("caching strategy hash", 5).await.unwrap().len(), 3);
    assert!(harness.pipeline.search("lunch menu", 5).await.unwrap().is_empty());
}

/// An embedder outage at query time falls back to keyword scoring.
#[tokio::test]
async fn query_embedding_outage_falls_back_to_keywords() {
    let embedder = Arc::new(MockEmbedder::new());
    let harness = TestHarness::builder()
        .with_embedder(embedder.clone())
        .with_mock_responses(vec![reply(&[("Benchmarks live in the perf crate", "learning", "")])])
        .build()
        .await
        .unwrap();
    harness.pipeline.ingest(&history()).await.unwrap();

    embedder.set_unavailable(true);
    let results = harness.pipeline.search("benchmarks", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].method, ScoreMethod::Keyword);
}

/// Index entries whose memory left the store are skipped, not errors.
#[tokio::test]
async fn missing_memories_are_skipped() {
    let harness = TestHarness::builder()
        .with_mock_responses(vec![reply(&[
            ("Survivor memory about caching", "learning", ""),
            ("Doomed memory about caching", "learning", ""),
        ])])
        .build()
        .await
        .unwrap();
    harness.pipeline.ingest(&history()).await.unwrap();

    harness
        .pipeline
        .store()
        .compact(|m| m.content.starts_with("Survivor"), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(harness.pipeline.index().len().await, 2);

    let results = harness.pipeline.search("memory about caching", 5).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].memory.content.starts_with("Survivor"));
}

#[tokio::test]
async fn zero_limit_is_rejected() {
    let harness = TestHarness::builder().build().await.unwrap();
    let err = harness.pipeline.search("anything", 0).await.unwrap_err();
    assert!(matches!(err, CairnError::InvalidArgument(_)));
}

#[tokio::test]
async fn empty_index_returns_nothing() {
    let harness = TestHarness::builder().build().await.unwrap();
    let results = harness.pipeline.search_default("anything").await.unwrap();
    assert!(results.is_empty());
}

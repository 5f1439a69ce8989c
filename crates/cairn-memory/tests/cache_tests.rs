// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fingerprint cache behavior under concurrency and across process restarts.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use cairn_core::CairnError;
use cairn_memory::cache::{DiskCacheBackend, FingerprintCache};
use futures::future::join_all;

/// Many concurrent callers with the same input trigger exactly one computation.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_computation() {
    let cache = Arc::new(FingerprintCache::in_memory());
    let computations = Arc::new(AtomicUsize::new(0));

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let computations = Arc::clone(&computations);
            tokio::spawn(async move {
                cache
                    .get_or_compute("embedding", b"same input", || async move {
                        computations.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Ok(b"vector".to_vec())
                    })
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), b"vector");
    }
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert_eq!(cache.stats().computations, 1);
}

/// Concurrent waiters see the failure, and the next caller computes afresh.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failures_reach_waiters_and_are_not_memoized() {
    let cache = Arc::new(FingerprintCache::in_memory());

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_compute("extraction", b"window", || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(CairnError::Internal("generator offline".to_string()))
                    })
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        assert!(result.unwrap().is_err());
    }
    assert!(cache.stats().failures >= 1);

    let value = cache
        .get_or_compute("extraction", b"window", || async { Ok(b"recovered".to_vec()) })
        .await
        .unwrap();
    assert_eq!(value, b"recovered");
}

/// Waiters get the same error variant the computing caller got.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiters_see_the_original_error_variant() {
    let cache = Arc::new(FingerprintCache::in_memory());

    let tasks: Vec<_> = (0..6)
        .map(|_| {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_compute("extraction", b"stubborn window", || async {
                        tokio::time::sleep(Duration::from_millis(30)).await;
                        Err(CairnError::ExtractionFailed {
                            attempts: 3,
                            reason: "no JSON object found".to_string(),
                        })
                    })
                    .await
            })
        })
        .collect();

    for result in join_all(tasks).await {
        let err = result.unwrap().unwrap_err();
        assert!(
            matches!(err, CairnError::ExtractionFailed { attempts: 3, ref reason } if reason == "no JSON object found"),
            "unexpected error: {err:?}"
        );
    }
}

/// Different stages never share entries even for identical input.
#[tokio::test]
async fn stages_are_isolated() {
    let cache = FingerprintCache::in_memory();
    cache
        .get_or_compute("extraction", b"input", || async { Ok(b"a".to_vec()) })
        .await
        .unwrap();
    let other = cache
        .get_or_compute("embedding", b"input", || async { Ok(b"b".to_vec()) })
        .await
        .unwrap();
    assert_eq!(other, b"b");
    assert_eq!(cache.stats().computations, 2);
}

/// Disk entries written by one cache are hits for a later one.
#[tokio::test]
async fn disk_entries_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first = FingerprintCache::new(Arc::new(DiskCacheBackend::new(dir.path())));
    first
        .get_or_compute_json("extraction", b"transcript", || async {
            Ok(vec!["remember this".to_string()])
        })
        .await
        .unwrap();

    let second = FingerprintCache::new(Arc::new(DiskCacheBackend::new(dir.path())));
    let value: Vec<String> = second
        .get_or_compute_json("extraction", b"transcript", || async {
            Err(CairnError::Internal("should not recompute".to_string()))
        })
        .await
        .unwrap();

    assert_eq!(value, vec!["remember this".to_string()]);
    assert_eq!(second.stats().hits, 1);
    assert_eq!(second.stats().computations, 0);
}

// SPDX-FileCopyrightText: 2026 Cairn Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder can collect these metrics.
//! With no recorder installed every call is a no-op.

use metrics::{describe_counter, describe_histogram};

/// Register all Cairn metric descriptions.
///
/// Called by `MemoryPipeline::init`. Install the recorder before that.
pub fn register_metrics() {
    describe_counter!(
        "cairn_cache_lookups_total",
        "Fingerprint cache lookups by stage and outcome"
    );
    describe_counter!(
        "cairn_cache_failures_total",
        "Stage computations that failed and were not cached"
    );
    describe_counter!(
        "cairn_store_retries_total",
        "Append attempts retried after a transient storage error"
    );
    describe_counter!(
        "cairn_store_appends_total",
        "Records durably appended to the memory log"
    );
    describe_counter!(
        "cairn_extraction_attempts_total",
        "Generation attempts made by the extraction pipeline"
    );
    describe_counter!(
        "cairn_memories_extracted_total",
        "Memories produced by extraction"
    );
    describe_counter!(
        "cairn_search_results_total",
        "Search results returned by scoring method"
    );
    describe_histogram!(
        "cairn_generation_latency_seconds",
        "Latency of generation calls in seconds"
    );
    describe_histogram!(
        "cairn_search_latency_seconds",
        "End-to-end search latency in seconds"
    );
}

/// Record a cache lookup.
pub fn record_cache_lookup(stage: &str, hit: bool) {
    let outcome = if hit { "hit" } else { "miss" };
    metrics::counter!("cairn_cache_lookups_total", "stage" => stage.to_string(), "outcome" => outcome)
        .increment(1);
}

/// Record a failed stage computation.
pub fn record_cache_failure(stage: &str) {
    metrics::counter!("cairn_cache_failures_total", "stage" => stage.to_string()).increment(1);
}

/// Record a retried append.
pub fn record_store_retry(namespace: &str) {
    metrics::counter!("cairn_store_retries_total", "namespace" => namespace.to_string())
        .increment(1);
}

/// Record a durable append.
pub fn record_store_append(namespace: &str) {
    metrics::counter!("cairn_store_appends_total", "namespace" => namespace.to_string())
        .increment(1);
}

/// Record one generation attempt and its outcome (`parsed`, `malformed`, `error`, `timeout`).
pub fn record_extraction_attempt(outcome: &'static str) {
    metrics::counter!("cairn_extraction_attempts_total", "outcome" => outcome).increment(1);
}

/// Record extracted memories.
pub fn record_memories_extracted(count: usize) {
    metrics::counter!("cairn_memories_extracted_total").increment(count as u64);
}

/// Record search results for one scoring method.
pub fn record_search_results(method: &'static str, count: usize) {
    metrics::counter!("cairn_search_results_total", "method" => method).increment(count as u64);
}

/// Record generation latency.
pub fn record_generation_latency(seconds: f64) {
    metrics::histogram!("cairn_generation_latency_seconds").record(seconds);
}

/// Record search latency.
pub fn record_search_latency(seconds: f64) {
    metrics::histogram!("cairn_search_latency_seconds").record(seconds);
}

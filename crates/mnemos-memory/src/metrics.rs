// SPDX-FileCopyrightText: 2026 Mnemos Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_histogram};

/// Register all Mnemos metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "mnemos_memories_admitted_total",
        "Memories stored by interactions and manual adds"
    );
    describe_counter!(
        "mnemos_memories_rejected_total",
        "Candidates discarded by threshold, cap or deduplication"
    );
    describe_counter!("mnemos_memories_pruned_total", "Memories removed by pruning");
    describe_counter!(
        "mnemos_embedding_failures_total",
        "Embedding calls that failed after retries"
    );
    describe_histogram!(
        "mnemos_retrieval_latency_seconds",
        "Retrieve latency in seconds"
    );
}

pub fn record_admitted(count: usize) {
    metrics::counter!("mnemos_memories_admitted_total").increment(count as u64);
}

/// `reason` is one of `threshold`, `cap`, `duplicate`, `invalid`.
pub fn record_rejected(reason: &'static str, count: usize) {
    if count > 0 {
        metrics::counter!("mnemos_memories_rejected_total", "reason" => reason)
            .increment(count as u64);
    }
}

pub fn record_pruned(count: usize) {
    metrics::counter!("mnemos_memories_pruned_total").increment(count as u64);
}

pub fn record_embedding_failure(provider: &str) {
    metrics::counter!("mnemos_embedding_failures_total", "provider" => provider.to_string())
        .increment(1);
}

pub fn record_retrieval_latency(seconds: f64) {
    metrics::histogram!("mnemos_retrieval_latency_seconds").record(seconds);
}

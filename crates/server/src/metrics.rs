//! Prometheus metrics for the fieldsync server.
//!
//! Exposes counters for batch ingest outcomes, canonicalization timing and
//! session lifecycle. Labels never carry project names, session ids or file
//! names.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Batch metrics
pub static BATCHES_RECEIVED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_batches_received_total",
        "Total number of upload batches received",
    )
    .expect("metric creation failed")
});

pub static BATCH_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "fieldsync_batch_duration_seconds",
            "Time taken to ingest one batch, including canonicalization",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("metric creation failed")
});

// File metrics
pub static FILES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_files_stored_total",
        "Total number of files written to the project tree",
    )
    .expect("metric creation failed")
});

pub static FILES_DEDUPLICATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_files_deduplicated_total",
        "Total number of files skipped because identical bytes were stored",
    )
    .expect("metric creation failed")
});

pub static FILES_ALREADY_PROCESSED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_files_already_processed_total",
        "Total number of retried files already accepted in their session",
    )
    .expect("metric creation failed")
});

pub static FILES_FAILED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fieldsync_files_failed_total",
            "Total number of rejected files by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static FILES_UNCLASSIFIED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_files_unclassified_total",
        "Total number of files placed at project level because metadata was unusable",
    )
    .expect("metric creation failed")
});

pub static BYTES_STORED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_bytes_stored_total",
        "Total bytes written to type directories (new files only)",
    )
    .expect("metric creation failed")
});

// Canonicalization and completion
pub static CANONICALIZE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "fieldsync_canonicalize_duration_seconds",
            "Time taken by one canonicalization pass",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .expect("metric creation failed")
});

pub static CANONICALIZE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_canonicalize_failures_total",
        "Total number of canonicalization passes that failed",
    )
    .expect("metric creation failed")
});

pub static COMPLETIONS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "fieldsync_completions_total",
            "Total number of completed uploads by result",
        ),
        &["result"],
    )
    .expect("metric creation failed")
});

// Session lifecycle
pub static ACTIVE_SESSIONS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "fieldsync_active_sessions",
        "Current number of upload sessions held in memory",
    )
    .expect("metric creation failed")
});

pub static SESSIONS_EXPIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_sessions_expired_total",
        "Total number of idle sessions evicted",
    )
    .expect("metric creation failed")
});

pub static HASH_ENTRIES_PRUNED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "fieldsync_hash_entries_pruned_total",
        "Total number of hash index entries removed because their file is gone",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// This function is idempotent - subsequent calls after the first are no-ops.
/// This allows safe use in integration tests or when embedding multiple routers.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(BATCHES_RECEIVED.clone()),
            Box::new(BATCH_DURATION.clone()),
            Box::new(FILES_STORED.clone()),
            Box::new(FILES_DEDUPLICATED.clone()),
            Box::new(FILES_ALREADY_PROCESSED.clone()),
            Box::new(FILES_FAILED.clone()),
            Box::new(FILES_UNCLASSIFIED.clone()),
            Box::new(BYTES_STORED.clone()),
            Box::new(CANONICALIZE_DURATION.clone()),
            Box::new(CANONICALIZE_FAILURES.clone()),
            Box::new(COMPLETIONS.clone()),
            Box::new(ACTIVE_SESSIONS.clone()),
            Box::new(SESSIONS_EXPIRED.clone()),
            Box::new(HASH_ENTRIES_PRUNED.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a rejected file by reason.
pub fn record_file_failure(reason: &str) {
    FILES_FAILED.with_label_values(&[reason]).inc();
}

/// Record a completed upload.
pub fn record_completion(fully_successful: bool) {
    let result = if fully_successful { "full" } else { "partial" };
    COMPLETIONS.with_label_values(&[result]).inc();
}

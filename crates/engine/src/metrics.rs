//! Prometheus metrics for the SheetVault engine.
//!
//! Metrics live in a process-wide registry; embedders expose them by serving
//! the output of [`gather_metrics`].

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Version metrics
pub static VERSIONS_CREATED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_versions_created_total",
        "Total number of versions committed",
    )
    .expect("metric creation failed")
});

pub static UPLOADS_UNCHANGED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_uploads_unchanged_total",
        "Total number of uploads identical to the current version",
    )
    .expect("metric creation failed")
});

pub static VERSION_CONFLICTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_version_conflicts_total",
        "Total number of version creations rejected because the head moved",
    )
    .expect("metric creation failed")
});

pub static CELL_CHANGES_RECORDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_cell_changes_recorded_total",
        "Total number of cell change records committed",
    )
    .expect("metric creation failed")
});

// Lock metrics
pub static LOCKS_ACQUIRED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_locks_acquired_total",
        "Total number of successful lock acquisitions, including refreshes",
    )
    .expect("metric creation failed")
});

pub static LOCK_CONTENTION: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_lock_contention_total",
        "Total number of acquisitions rejected because another holder owns the lock",
    )
    .expect("metric creation failed")
});

// Diff metrics
pub static DIFF_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "sheetvault_diff_duration_seconds",
            "Time taken to materialize and diff two snapshots",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
    )
    .expect("metric creation failed")
});

pub static DIFF_TIMEOUTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_diff_timeouts_total",
        "Total number of diffs abandoned after exceeding the configured timeout",
    )
    .expect("metric creation failed")
});

// Background job metrics
pub static JOBS_ACTIVE: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "sheetvault_jobs_active",
        "Current number of running background version jobs",
    )
    .expect("metric creation failed")
});

pub static JOBS_PANICKED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sheetvault_jobs_panicked_total",
        "Total number of background jobs that panicked",
    )
    .expect("metric creation failed")
});

// Error metrics
pub static ENGINE_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("sheetvault_errors_total", "Total engine errors by kind"),
        &["kind"],
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry. Safe to call repeatedly.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(VERSIONS_CREATED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(UPLOADS_UNCHANGED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(VERSION_CONFLICTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CELL_CHANGES_RECORDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCKS_ACQUIRED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(LOCK_CONTENTION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DIFF_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(DIFF_TIMEOUTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOBS_ACTIVE.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(JOBS_PANICKED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(ENGINE_ERRORS.clone()))
            .expect("metric registration failed");
    });
}

/// Render all registered metrics in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record engine errors by kind.
pub fn record_error(kind: crate::ErrorKind) {
    ENGINE_ERRORS.with_label_values(&[kind.as_str()]).inc();
}

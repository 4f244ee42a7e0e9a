//! # Run Metrics
//!
//! Metrics for one deployment run: how long each step took, how it ended,
//! how many poll iterations each waiter spent and which failure aborted
//! the run.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

static STEP_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "cm_deployer_step_duration_seconds",
            "Duration of each deployment step in seconds",
        )
        .buckets(vec![0.5, 1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1200.0]),
        &["step"],
    )
    .expect("Failed to create STEP_DURATION metric - this should never happen")
});

static STEP_OUTCOMES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cm_deployer_step_outcomes_total",
            "Deployment steps by outcome (succeeded, warned, failed, skipped)",
        ),
        &["step", "outcome"],
    )
    .expect("Failed to create STEP_OUTCOMES_TOTAL metric - this should never happen")
});

static POLL_ITERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cm_deployer_poll_iterations_total",
            "Poll iterations spent by each waiter",
        ),
        &["waiter"],
    )
    .expect("Failed to create POLL_ITERATIONS_TOTAL metric - this should never happen")
});

static RUN_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cm_deployer_run_failures_total",
            "Fatal run failures by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RUN_FAILURES_TOTAL metric - this should never happen")
});

pub(crate) fn register_run_metrics() -> Result<()> {
    REGISTRY.register(Box::new(STEP_DURATION.clone()))?;
    REGISTRY.register(Box::new(STEP_OUTCOMES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(POLL_ITERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RUN_FAILURES_TOTAL.clone()))?;
    Ok(())
}

pub fn observe_step_duration(step: &str, duration_secs: f64) {
    STEP_DURATION
        .with_label_values(&[step])
        .observe(duration_secs);
}

pub fn increment_step_outcome(step: &str, outcome: &str) {
    STEP_OUTCOMES_TOTAL
        .with_label_values(&[step, outcome])
        .inc();
}

pub fn increment_poll_iterations(waiter: &str) {
    POLL_ITERATIONS_TOTAL.with_label_values(&[waiter]).inc();
}

pub fn increment_run_failures(kind: &str) {
    RUN_FAILURES_TOTAL.with_label_values(&[kind]).inc();
}

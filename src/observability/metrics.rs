//! # Metrics
//!
//! Prometheus metrics for monitoring the operator.
//!
//! ## Metrics Exposed
//!
//! - `sops_secrets_operator_reconciliations_total` - Total number of reconciliations
//! - `sops_secrets_operator_reconciliation_errors_total` - Total number of failed reconciliations
//! - `sops_secrets_operator_reconciliation_duration_seconds` - Duration of reconciliation passes
//! - `sops_secrets_operator_decryptions_total` - SOPS documents decrypted, by format
//! - `sops_secrets_operator_decryption_errors_total` - SOPS decryption failures, by reason
//! - `sops_secrets_operator_decryption_duration_seconds` - Duration of SOPS decryption
//! - `sops_secrets_operator_child_secrets_created_total` - Child secrets created
//! - `sops_secrets_operator_child_secrets_updated_total` - Child secrets updated
//! - `sops_secrets_operator_child_secrets_unchanged_total` - Child secrets already converged
//! - `sops_secrets_operator_ownership_conflicts_total` - Child secrets skipped as not owned
//! - `sops_secrets_operator_requeues_total` - Requeues, by trigger

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_secrets_operator_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_secrets_operator_reconciliation_errors_total",
        "Total number of reconciliations that ended in a failure status",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sops_secrets_operator_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static DECRYPTIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sops_secrets_operator_decryptions_total",
            "Total number of SOPS documents decrypted by format",
        ),
        &["format"],
    )
    .expect("Failed to create DECRYPTIONS_TOTAL metric - this should never happen")
});

static DECRYPTION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sops_secrets_operator_decryption_errors_total",
            "Total number of SOPS decryption errors by failure reason",
        ),
        &["reason"],
    )
    .expect("Failed to create DECRYPTION_ERRORS_TOTAL metric - this should never happen")
});

static DECRYPTION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "sops_secrets_operator_decryption_duration_seconds",
            "Duration of SOPS decryption in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]),
    )
    .expect("Failed to create DECRYPTION_DURATION metric - this should never happen")
});

static CHILD_SECRETS_CREATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_secrets_operator_child_secrets_created_total",
        "Total number of child secrets created",
    )
    .expect("Failed to create CHILD_SECRETS_CREATED_TOTAL metric - this should never happen")
});

static CHILD_SECRETS_UPDATED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_secrets_operator_child_secrets_updated_total",
        "Total number of child secrets updated to match their template",
    )
    .expect("Failed to create CHILD_SECRETS_UPDATED_TOTAL metric - this should never happen")
});

static CHILD_SECRETS_UNCHANGED_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_secrets_operator_child_secrets_unchanged_total",
        "Total number of child secrets that already matched their template",
    )
    .expect("Failed to create CHILD_SECRETS_UNCHANGED_TOTAL metric - this should never happen")
});

static OWNERSHIP_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "sops_secrets_operator_ownership_conflicts_total",
        "Total number of existing secrets left untouched because they are not owned",
    )
    .expect("Failed to create OWNERSHIP_CONFLICTS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "sops_secrets_operator_requeues_total",
            "Total number of requeues by trigger",
        ),
        &["trigger"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(DECRYPTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECRYPTION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DECRYPTION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CHILD_SECRETS_CREATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILD_SECRETS_UPDATED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHILD_SECRETS_UNCHANGED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(OWNERSHIP_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;

    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_decryptions(format: &str) {
    DECRYPTIONS_TOTAL.with_label_values(&[format]).inc();
}

/// Increment decryption errors counter for a failure reason label
pub fn increment_decryption_errors(reason: &str) {
    DECRYPTION_ERRORS_TOTAL.with_label_values(&[reason]).inc();
}

pub fn observe_decryption_duration(duration: f64) {
    DECRYPTION_DURATION.observe(duration);
}

pub fn increment_child_secrets_created(count: u64) {
    CHILD_SECRETS_CREATED_TOTAL.inc_by(count);
}

pub fn increment_child_secrets_updated(count: u64) {
    CHILD_SECRETS_UPDATED_TOTAL.inc_by(count);
}

pub fn increment_child_secrets_unchanged(count: u64) {
    CHILD_SECRETS_UNCHANGED_TOTAL.inc_by(count);
}

pub fn increment_ownership_conflicts() {
    OWNERSHIP_CONFLICTS_TOTAL.inc();
}

/// Increment requeue counter. `trigger` is e.g. `failure-delay` or `error-backoff`.
pub fn increment_requeues_total(trigger: &str) {
    REQUEUES_TOTAL.with_label_values(&[trigger]).inc();
}

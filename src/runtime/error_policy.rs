//! # Error Policy
//!
//! Backoff for reconciliation errors handed back to the runtime. These are
//! failures to read the `SopsSecret` itself; per-template failures never get
//! here.

use crate::controller::reconciler::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::SopsSecret;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Seconds to wait when the backoff state cannot be reached
const FALLBACK_BACKOFF_SECS: u64 = 60;

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource so one failing object does not
/// slow down retries of the others.
pub fn handle_reconciliation_error(
    obj: Arc<SopsSecret>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");
    let namespace = obj.metadata.namespace.as_deref().unwrap_or("default");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        resource.namespace = namespace,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}/{}: {}", namespace, name, error);

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = ctx.next_error_backoff(&resource_key).unwrap_or_else(|| {
        warn!("Failed to lock backoff states, using default backoff");
        (FALLBACK_BACKOFF_SECS, 0)
    });

    let next_trigger_time = chrono::Utc::now()
        + chrono::Duration::seconds(i64::try_from(backoff_seconds).unwrap_or_default());
    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {}, trigger source: {})",
        backoff_seconds,
        error_count,
        TriggerSource::ErrorBackoff.as_str()
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        backoff_seconds
    );

    observability::metrics::increment_requeues_total(TriggerSource::ErrorBackoff.as_str());
    Action::requeue(Duration::from_secs(backoff_seconds))
}

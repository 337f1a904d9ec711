//! # Reconcile
//!
//! Entry point called by the controller runtime for every `SopsSecret` event.
//!
//! The cached object handed over by the runtime is typed and therefore lacks
//! the root `sops` block, so the resource is fetched again as a dynamic
//! object before decryption.

use super::convergence::{converge, ConvergenceError, PassOutcome};
use super::status::update_status;
use super::store::KubeSecretStore;
use super::types::{Reconciler, ReconcilerError, TriggerSource};
use crate::crd::SopsSecret;
use crate::observability::metrics;
use kube::api::{Api, ApiResource, DynamicObject};
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Reconcile one `SopsSecret`.
///
/// Per-template failures are reported in `status.message` and retried after
/// the configured delay; only errors reading the resource itself are
/// returned to the runtime's error policy.
///
/// # Errors
///
/// [`ReconcilerError`] when the resource cannot be read or serialized.
pub async fn reconcile(obj: Arc<SopsSecret>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = obj
        .metadata
        .name
        .clone()
        .ok_or(ReconcilerError::MissingMetadata("name"))?;
    let namespace = obj
        .metadata
        .namespace
        .clone()
        .ok_or(ReconcilerError::MissingMetadata("namespace"))?;

    let span = info_span!(
        "sopssecret.reconcile",
        sopssecret = %format!("{namespace}/{name}"),
        resource.generation = obj.metadata.generation.unwrap_or(0)
    );

    async move {
        info!("Reconciling");
        metrics::increment_reconciliations();
        let start = Instant::now();

        let result = reconcile_pass(&obj, &ctx, &namespace, &name).await;

        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());
        if is_failed_pass(&result) {
            metrics::increment_reconciliation_errors();
        }
        result
    }
    .instrument(span)
    .await
}

/// Unreadable resources and passes that stopped early both count as one failure.
fn is_failed_pass(result: &Result<Action, ReconcilerError>) -> bool {
    !matches!(result, Ok(action) if *action == Action::await_change())
}

async fn reconcile_pass(
    obj: &SopsSecret,
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
) -> Result<Action, ReconcilerError> {
    let resource = ApiResource::erase::<SopsSecret>(&());
    let api: Api<DynamicObject> = Api::namespaced_with(ctx.client.clone(), namespace, &resource);
    let Some(raw) = api.get_opt(name).await? else {
        info!("Request object not found, could have been deleted after reconcile request");
        return Ok(Action::await_change());
    };
    let raw = serde_json::to_value(&raw)?;
    ctx.reset_backoff(&format!("{namespace}/{name}"));

    let store = KubeSecretStore::new(ctx.client.clone());
    let outcome = converge(&ctx.engine, &store, &raw).await;

    let message = match &outcome {
        Ok(outcome) => outcome.status_message(),
        Err(e) => e.status_message(),
    };
    update_status(&ctx.client, namespace, name, obj.status.as_ref(), message).await;

    match outcome {
        Ok(PassOutcome::Suspended) => Ok(Action::await_change()),
        Ok(PassOutcome::Converged(summary)) => {
            info!(
                created = summary.created,
                updated = summary.updated,
                unchanged = summary.unchanged,
                "✅ SopsSecret is Healthy"
            );
            Ok(Action::await_change())
        }
        Err(e) => {
            let delay = ctx.config.requeue_duration();
            warn!(status = %message, "❌ {}", e);
            if let ConvergenceError::Decryption(decrypt_error) = &e {
                debug!(
                    reason = decrypt_error.reason(),
                    transient = decrypt_error.is_transient(),
                    "{}",
                    decrypt_error.remediation()
                );
            }
            info!(
                "🔄 Requeuing in {}s (trigger source: {})",
                delay.as_secs(),
                TriggerSource::FailureDelay.as_str()
            );
            metrics::increment_requeues_total(TriggerSource::FailureDelay.as_str());
            Ok(Action::requeue(delay))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_each_pass_counts_at_most_one_failure() {
        assert!(!is_failed_pass(&Ok(Action::await_change())));
        assert!(is_failed_pass(&Ok(Action::requeue(Duration::from_secs(300)))));
        assert!(is_failed_pass(&Err(ReconcilerError::MissingMetadata("name"))));
    }
}

//! # Watch Loop
//!
//! Controller watch loop over `SopsSecret` resources. Child `Secret`s are
//! watched as owned objects, so drift in a child triggers a pass of its
//! owner. The runtime keeps at most one pass in flight per object.

use crate::controller::reconciler::{reconcile, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::SopsSecret;
use crate::runtime::error_policy::handle_reconciliation_error;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use kube_runtime::controller::{self, Action};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

type ControllerResult = Result<
    (ObjectRef<SopsSecret>, Action),
    controller::Error<ReconcilerError, watcher::Error>,
>;

/// Run the controller until a shutdown signal is received
pub async fn run_watch_loop(
    sops_secrets: Api<SopsSecret>,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> anyhow::Result<()> {
    info!("Starting controller watch loop...");

    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, initiating graceful shutdown...");
            shutdown_server_state.set_ready(false);
            info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
        }
    });

    let secrets: Api<Secret> = Api::all(reconciler.client.clone());
    let concurrency = reconciler.config.max_concurrent_reconciliations;

    Controller::new(sops_secrets, watcher::Config::default().any_semantic())
        .owns(secrets, watcher::Config::default())
        .with_config(controller::Config::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| {
            log_controller_result(&result);
            futures::future::ready(())
        })
        .await;

    server_state.set_ready(false);
    info!("Controller stopped gracefully");
    Ok(())
}

fn log_controller_result(result: &ControllerResult) {
    match result {
        Ok((object, _)) => debug!(resource = %object, "watch.event.success"),
        Err(controller::Error::ReconcilerFailed(e, object)) => {
            warn!(resource = %object, "Reconciliation failed: {}", e);
        }
        Err(controller::Error::ObjectNotFound(object)) => {
            debug!(resource = %object, "Object not found, it was probably deleted");
        }
        Err(e) => error!("Controller stream error: {}", e),
    }
}

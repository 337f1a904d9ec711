//! # Status
//!
//! Writes the single `status.message` of a `SopsSecret`. Status writes are
//! best-effort: a failure is logged and the pass result stands.

use crate::constants::FIELD_MANAGER;
use crate::crd::{SopsSecret, SopsSecretStatus, StatusMessage};
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::json;
use tracing::{debug, warn};

/// Skip the write when the stored message already matches.
#[must_use]
pub fn status_needs_update(current: Option<&SopsSecretStatus>, message: StatusMessage) -> bool {
    current.is_none_or(|status| status.message != message.as_str())
}

pub async fn update_status(
    client: &Client,
    namespace: &str,
    name: &str,
    current: Option<&SopsSecretStatus>,
    message: StatusMessage,
) {
    if !status_needs_update(current, message) {
        debug!("Status message unchanged, skipping status update");
        return;
    }

    let api: Api<SopsSecret> = Api::namespaced(client.clone(), namespace);
    let patch = json!({
        "status": SopsSecretStatus {
            message: message.as_str().to_string(),
        }
    });

    match api
        .patch_status(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(patch))
        .await
    {
        Ok(_) => debug!(status = %message, "Updated SopsSecret status"),
        Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
            debug!(
                "SopsSecret {}/{} was deleted during reconciliation, skipping status update",
                namespace, name
            );
        }
        Err(e) => warn!(
            "Failed to update status of SopsSecret {}/{} to '{}': {}",
            namespace, name, message, e
        ),
    }
}

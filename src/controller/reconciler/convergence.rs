//! # Convergence
//!
//! One pass over a `SopsSecret`: suspension check, whole-object decryption,
//! then for every template in order render, look up, check ownership, diff
//! and apply. The first failing template ends the pass; templates applied
//! before it stay applied.
//!
//! ```text
//! Start ─▶ Suspended
//!   └────▶ Decrypting ─▶ DecryptFailed
//!            └─────────▶ per template: Render ─▶ Lookup/Create ─▶ Ownership ─▶ Diff ─▶ Update
//! all templates applied or unchanged ─▶ Healthy
//! ```

use super::diff::apply_desired;
use super::ownership::may_manage;
use super::render::{render_secret, RenderError};
use super::store::{SecretStore, StoreError};
use crate::crd::{SopsSecret, StatusMessage};
use crate::observability::metrics;
use crate::sops::{DecryptError, DecryptionEngine, Format};
use kube::Resource;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Counts of what a successful pass did to the child secrets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// `spec.suspend` is set: nothing was decrypted or mutated.
    Suspended,
    /// Every template is applied.
    Converged(PassSummary),
}

impl PassOutcome {
    #[must_use]
    pub fn status_message(&self) -> StatusMessage {
        match self {
            PassOutcome::Suspended => StatusMessage::Suspended,
            PassOutcome::Converged(_) => StatusMessage::Healthy,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("failed to decrypt SopsSecret: {0}")]
    Decryption(#[from] DecryptError),
    #[error("secret template #{index} is invalid: {source}")]
    TemplateInvalid { index: usize, source: RenderError },
    #[error("cannot build a controller reference: SopsSecret has no name or uid")]
    OwnerReference,
    #[error("failed to look up or create secret {name}: {source}")]
    Store { name: String, source: StoreError },
    #[error(
        "secret {name} exists and is neither controlled by this SopsSecret nor annotated as managed"
    )]
    OwnershipConflict { name: String },
    #[error("failed to update secret {name}: {source}")]
    Update { name: String, source: StoreError },
}

impl ConvergenceError {
    #[must_use]
    pub fn status_message(&self) -> StatusMessage {
        match self {
            ConvergenceError::Decryption(_) => StatusMessage::DecryptionError,
            ConvergenceError::TemplateInvalid { .. } => StatusMessage::SecretCreationError,
            ConvergenceError::OwnerReference => StatusMessage::OwnerReferenceError,
            ConvergenceError::Store { .. } => StatusMessage::UnknownError,
            ConvergenceError::OwnershipConflict { .. } => StatusMessage::NotOwnedError,
            ConvergenceError::Update { .. } => StatusMessage::UpdateError,
        }
    }
}

/// `spec.suspend` read from the still-encrypted object.
#[must_use]
pub fn is_suspended(raw: &serde_json::Value) -> bool {
    raw.pointer("/spec/suspend")
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Decrypt the whole object as a JSON document and read it back as a `SopsSecret`.
///
/// # Errors
///
/// [`DecryptError`] from the engine, or `MalformedDocument` when the
/// plaintext is not a valid `SopsSecret`.
pub async fn decrypt_sops_secret(
    engine: &DecryptionEngine,
    raw: &serde_json::Value,
) -> Result<SopsSecret, DecryptError> {
    let document = serde_json::to_vec(raw).map_err(|e| DecryptError::malformed("json", e))?;
    let plain = engine.decrypt(&document, Format::Json).await?;
    serde_json::from_slice(&plain).map_err(|e| DecryptError::malformed("json", e))
}

/// Run one convergence pass over `raw`, the `SopsSecret` as stored
/// (root `sops` block included).
///
/// # Errors
///
/// The first failure of the pass; see [`ConvergenceError::status_message`].
pub async fn converge<S>(
    engine: &DecryptionEngine,
    store: &S,
    raw: &serde_json::Value,
) -> Result<PassOutcome, ConvergenceError>
where
    S: SecretStore + ?Sized,
{
    if is_suspended(raw) {
        info!("Reconciliation is suspended for this object");
        return Ok(PassOutcome::Suspended);
    }

    let instance = decrypt_sops_secret(engine, raw).await?;
    let namespace = instance
        .metadata
        .namespace
        .clone()
        .unwrap_or_else(|| "default".to_string());
    debug!(
        templates = instance.spec.secret_templates.len(),
        "Entering template data loop"
    );

    let mut summary = PassSummary::default();
    for (index, template) in instance.spec.secret_templates.iter().enumerate() {
        let mut desired = render_secret(template, &namespace)
            .map_err(|source| ConvergenceError::TemplateInvalid { index, source })?;
        let owner = instance
            .controller_owner_ref(&())
            .ok_or(ConvergenceError::OwnerReference)?;
        let owner_uid = owner.uid.clone();
        desired.metadata.owner_references = Some(vec![owner]);

        let name = template.name.clone();
        let current = store
            .get(&namespace, &name)
            .await
            .map_err(|source| ConvergenceError::Store {
                name: name.clone(),
                source,
            })?;
        let Some(current) = current else {
            info!(secret = %name, namespace = %namespace, "Creating a new Secret");
            store
                .create(&desired)
                .await
                .map_err(|source| ConvergenceError::Store {
                    name: name.clone(),
                    source,
                })?;
            metrics::increment_child_secrets_created(1);
            summary.created += 1;
            continue;
        };

        if !may_manage(&current, &owner_uid) {
            warn!(
                secret = %name,
                namespace = %namespace,
                "Secret conflicts with this SopsSecret: it pre-existed or is managed by another SopsSecret"
            );
            metrics::increment_ownership_conflicts();
            return Err(ConvergenceError::OwnershipConflict { name });
        }

        match apply_desired(&current, &desired) {
            Some(updated) => {
                info!(secret = %name, namespace = %namespace, "Secret already exists and needs to be refreshed");
                store
                    .update(&updated)
                    .await
                    .map_err(|source| ConvergenceError::Update {
                        name: name.clone(),
                        source,
                    })?;
                metrics::increment_child_secrets_updated(1);
                summary.updated += 1;
                info!(secret = %name, namespace = %namespace, "🔄 Secret successfully refreshed");
            }
            None => {
                debug!(secret = %name, namespace = %namespace, "Secret is up to date");
                metrics::increment_child_secrets_unchanged(1);
                summary.unchanged += 1;
            }
        }
    }

    Ok(PassOutcome::Converged(summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_suspend_is_read_from_raw_spec() {
        assert!(is_suspended(&json!({"spec": {"suspend": true}})));
        assert!(!is_suspended(&json!({"spec": {"suspend": false}})));
        assert!(!is_suspended(&json!({"spec": {}})));
        assert!(!is_suspended(&json!({"spec": {"suspend": "ENC[AES256_GCM,data:x,iv:y,tag:z,type:bool]"}})));
    }

    #[test]
    fn test_error_status_messages() {
        assert_eq!(
            ConvergenceError::OwnershipConflict { name: "db".to_string() }.status_message(),
            StatusMessage::NotOwnedError
        );
        assert_eq!(
            ConvergenceError::Store {
                name: "db".to_string(),
                source: StoreError::Backend("boom".to_string())
            }
            .status_message(),
            StatusMessage::UnknownError
        );
        assert_eq!(
            ConvergenceError::Update {
                name: "db".to_string(),
                source: StoreError::Backend("boom".to_string())
            }
            .status_message(),
            StatusMessage::UpdateError
        );
        assert_eq!(
            ConvergenceError::TemplateInvalid {
                index: 0,
                source: RenderError::MissingName
            }
            .status_message(),
            StatusMessage::SecretCreationError
        );
        assert_eq!(PassOutcome::Suspended.status_message(), StatusMessage::Suspended);
    }
}

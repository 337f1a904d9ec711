//! # Secret Diff
//!
//! Field-by-field comparison between a stored child secret and the desired
//! one. Only the observable shape counts: type, labels, annotations, the
//! effective payload and, for annotated secrets, owner references. Store
//! bookkeeping (resourceVersion, uid, managedFields, timestamps) is ignored.

use super::ownership::is_annotated_to_be_managed;
use super::render::SECRET_TYPE_OPAQUE;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use std::collections::BTreeMap;

/// `data` merged with `stringData`; the API server lets `stringData` win.
#[must_use]
pub fn effective_payload(secret: &Secret) -> BTreeMap<String, Vec<u8>> {
    let mut payload: BTreeMap<String, Vec<u8>> = secret
        .data
        .iter()
        .flatten()
        .map(|(key, value)| (key.clone(), value.0.clone()))
        .collect();
    for (key, value) in secret.string_data.iter().flatten() {
        payload.insert(key.clone(), value.clone().into_bytes());
    }
    payload
}

fn secret_type(secret: &Secret) -> &str {
    secret.type_.as_deref().unwrap_or(SECRET_TYPE_OPAQUE)
}

fn labels(secret: &Secret) -> Option<&BTreeMap<String, String>> {
    secret.metadata.labels.as_ref().filter(|m| !m.is_empty())
}

fn annotations(secret: &Secret) -> Option<&BTreeMap<String, String>> {
    secret.metadata.annotations.as_ref().filter(|m| !m.is_empty())
}

fn owner_references(secret: &Secret) -> &[OwnerReference] {
    secret.metadata.owner_references.as_deref().unwrap_or_default()
}

/// Whether `current` already has the shape `desired` asks for.
#[must_use]
pub fn is_converged(current: &Secret, desired: &Secret) -> bool {
    secret_type(current) == secret_type(desired)
        && labels(current) == labels(desired)
        && annotations(current) == annotations(desired)
        && effective_payload(current) == effective_payload(desired)
        && (!is_annotated_to_be_managed(current)
            || owner_references(current) == owner_references(desired))
}

/// The object to send as an update, or `None` when nothing changed.
///
/// Starts from `current` so bookkeeping fields survive the round trip.
/// Owner references are only replaced on annotated secrets; a controlled
/// secret keeps the references it already has.
#[must_use]
pub fn apply_desired(current: &Secret, desired: &Secret) -> Option<Secret> {
    if is_converged(current, desired) {
        return None;
    }

    let mut updated = current.clone();
    updated.type_.clone_from(&desired.type_);
    updated.metadata.labels.clone_from(&desired.metadata.labels);
    updated.metadata.annotations.clone_from(&desired.metadata.annotations);
    updated.data.clone_from(&desired.data);
    updated.string_data = None;
    if is_annotated_to_be_managed(current) {
        updated
            .metadata
            .owner_references
            .clone_from(&desired.metadata.owner_references);
    }
    Some(updated)
}

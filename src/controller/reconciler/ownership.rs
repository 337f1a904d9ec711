//! # Ownership
//!
//! A child secret may be mutated only when it is controlled by the
//! `SopsSecret` (controller owner reference with a matching uid) or carries
//! the `sopssecret/managed: "true"` annotation.

use k8s_openapi::api::core::v1::Secret;

pub const MANAGED_ANNOTATION: &str = "sopssecret/managed";

/// Case-sensitive: only the exact value `"true"` counts.
#[must_use]
pub fn is_annotated_to_be_managed(secret: &Secret) -> bool {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(MANAGED_ANNOTATION))
        .is_some_and(|value| value == "true")
}

#[must_use]
pub fn is_controlled_by(secret: &Secret, owner_uid: &str) -> bool {
    secret
        .metadata
        .owner_references
        .iter()
        .flatten()
        .any(|owner| owner.controller == Some(true) && owner.uid == owner_uid)
}

#[must_use]
pub fn may_manage(secret: &Secret, owner_uid: &str) -> bool {
    is_controlled_by(secret, owner_uid) || is_annotated_to_be_managed(secret)
}

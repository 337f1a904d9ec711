//! # Custom Resource Definitions
//!
//! CRD types for the SOPS secrets operator.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `SopsSecret` specification and secret templates
//! - `status.rs` - Status message reported after each reconciliation

mod spec;
mod status;

// Re-export all public types
pub use spec::{SecretTemplate, SopsSecret, SopsSecretSpec};
pub use status::{SopsSecretStatus, StatusMessage};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::{
    CustomResourceDefinition, JSONSchemaProps,
};
use kube::core::CustomResourceExt;

/// Root field of a `SopsSecret` holding the SOPS metadata.
pub const SOPS_FIELD: &str = "sops";

/// The `SopsSecret` CRD, including the root-level `sops` metadata block.
///
/// The derived schema only covers `spec` and `status`, so the `sops` field
/// is added by hand with unknown fields preserved; otherwise the API server
/// would prune the metadata on admission.
#[must_use]
pub fn sops_secret_crd() -> CustomResourceDefinition {
    let mut crd = SopsSecret::crd();
    for version in &mut crd.spec.versions {
        let Some(schema) = version
            .schema
            .as_mut()
            .and_then(|s| s.open_api_v3_schema.as_mut())
        else {
            continue;
        };
        schema.properties.get_or_insert_with(Default::default).insert(
            SOPS_FIELD.to_string(),
            JSONSchemaProps {
                description: Some("SOPS metadata".to_string()),
                type_: Some("object".to_string()),
                x_kubernetes_preserve_unknown_fields: Some(true),
                ..JSONSchemaProps::default()
            },
        );
    }
    crd
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crd_identity() {
        let crd = sops_secret_crd();
        assert_eq!(crd.spec.group, "isindir.github.com");
        assert_eq!(crd.spec.names.kind, "SopsSecret");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1alpha3");
    }

    #[test]
    fn test_crd_preserves_sops_block() {
        let crd = sops_secret_crd();
        let schema = crd.spec.versions[0]
            .schema
            .as_ref()
            .and_then(|s| s.open_api_v3_schema.as_ref())
            .unwrap();
        let sops = &schema.properties.as_ref().unwrap()["sops"];
        assert_eq!(sops.x_kubernetes_preserve_unknown_fields, Some(true));
        assert!(schema.properties.as_ref().unwrap().contains_key("spec"));
    }

    #[test]
    fn test_spec_accepts_legacy_alias() {
        let spec: SopsSecretSpec = serde_json::from_value(json!({
            "secretsTemplate": [{"name": "db", "type": "kubernetes.io/tls"}]
        }))
        .unwrap();
        assert_eq!(spec.secret_templates.len(), 1);
        assert_eq!(spec.secret_templates[0].secret_type, "kubernetes.io/tls");
        assert!(!spec.suspend);
    }

    #[test]
    fn test_status_messages() {
        assert_eq!(StatusMessage::Healthy.as_str(), "Healthy");
        assert_eq!(
            StatusMessage::NotOwnedError.to_string(),
            "Child secret is not owned by controller error"
        );
    }
}

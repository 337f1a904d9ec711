//! SopsSecret CRD shape and deserialization.

use serde_json::json;
use sops_secrets_operator::crd::{sops_secret_crd, SopsSecret, StatusMessage};

#[test]
fn test_crd_yaml_contains_sops_block_and_status() {
    let crd = sops_secret_crd();
    let yaml = serde_yaml::to_string(&crd).unwrap();
    assert!(yaml.contains("name: sopssecrets.isindir.github.com"));
    assert!(yaml.contains("x-kubernetes-preserve-unknown-fields: true"));
    assert!(yaml.contains("secretTemplates"));
    assert!(crd.spec.versions[0]
        .subresources
        .as_ref()
        .and_then(|s| s.status.as_ref())
        .is_some());
}

#[test]
fn test_sops_secret_deserializes_from_api_object() {
    let secret: SopsSecret = serde_json::from_value(json!({
        "apiVersion": "isindir.github.com/v1alpha3",
        "kind": "SopsSecret",
        "metadata": {"name": "app", "namespace": "ns", "uid": "u-1"},
        "spec": {
            "suspend": true,
            "secretTemplates": [{
                "name": "db",
                "type": "kubernetes.io/basic-auth",
                "labels": {"team": "payments"},
                "stringData": {"username": "u1"}
            }]
        },
        "status": {"message": "Healthy"}
    }))
    .unwrap();

    assert!(secret.spec.suspend);
    let template = &secret.spec.secret_templates[0];
    assert_eq!(template.name, "db");
    assert_eq!(template.secret_type, "kubernetes.io/basic-auth");
    assert_eq!(template.labels["team"], "payments");
    assert!(template.data.is_empty());
    assert_eq!(
        secret.status.map(|s| s.message),
        Some(StatusMessage::Healthy.to_string())
    );
}

#[test]
fn test_every_status_message_is_distinct() {
    let messages = [
        StatusMessage::Healthy,
        StatusMessage::Suspended,
        StatusMessage::DecryptionError,
        StatusMessage::SecretCreationError,
        StatusMessage::OwnerReferenceError,
        StatusMessage::NotOwnedError,
        StatusMessage::UpdateError,
        StatusMessage::UnknownError,
    ];
    let unique: std::collections::BTreeSet<_> = messages.iter().map(|m| m.as_str()).collect();
    assert_eq!(unique.len(), messages.len());
    assert!(unique.contains("Reconciliation is suspended"));
    assert!(unique.contains("Setting controller ownership of the child secret error"));
}

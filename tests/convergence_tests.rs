//! Convergence passes against an in-memory secret store.

mod common;

use common::*;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use serde_json::json;
use sops_secrets_operator::controller::reconciler::{converge, ConvergenceError, PassOutcome, PassSummary};
use sops_secrets_operator::crd::StatusMessage;
use sops_secrets_operator::sops::{DecryptError, IntegrityMode};
use std::collections::BTreeMap;
use std::sync::Arc;

fn bytes(value: &str) -> ByteString {
    ByteString(value.as_bytes().to_vec())
}

fn unowned_db() -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some("db".to_string()),
            namespace: Some("ns".to_string()),
            resource_version: Some("17".to_string()),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_string()),
        data: Some(BTreeMap::from([("user".to_string(), bytes("someone-else"))])),
        ..Secret::default()
    }
}

#[tokio::test]
async fn test_absent_secret_is_created_and_owned() {
    let unwrapper = Arc::new(StaticUnwrapper::default());
    let engine = engine(unwrapper.clone(), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), age_metadata());

    let outcome = converge(&engine, &store, &raw).await.unwrap();

    assert_eq!(
        outcome,
        PassOutcome::Converged(PassSummary {
            created: 1,
            updated: 0,
            unchanged: 0
        })
    );
    assert_eq!(outcome.status_message(), StatusMessage::Healthy);
    assert_eq!(unwrapper.calls(), 1);

    let secret = store.secret("ns", "db").unwrap();
    assert_eq!(secret.type_.as_deref(), Some("Opaque"));
    let data = secret.data.unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data["user"], bytes("u1"));
    assert_eq!(data["pass"], bytes("p1"));

    let owners = secret.metadata.owner_references.unwrap();
    assert_eq!(owners.len(), 1);
    assert_eq!(owners[0].uid, OWNER_UID);
    assert_eq!(owners[0].name, "app");
    assert_eq!(owners[0].kind, "SopsSecret");
    assert_eq!(owners[0].controller, Some(true));
}

#[tokio::test]
async fn test_converged_secret_is_not_updated_again() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), age_metadata());

    converge(&engine, &store, &raw).await.unwrap();
    let second = converge(&engine, &store, &raw).await.unwrap();

    assert_eq!(
        second,
        PassOutcome::Converged(PassSummary {
            created: 0,
            updated: 0,
            unchanged: 1
        })
    );
    assert_eq!(store.mutations(), vec!["create ns/db".to_string()]);
}

#[tokio::test]
async fn test_unowned_secret_is_never_mutated() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let store = MemorySecretStore::with_secret(unowned_db());
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), age_metadata());

    let error = converge(&engine, &store, &raw).await.unwrap_err();

    assert!(matches!(&error, ConvergenceError::OwnershipConflict { name } if name == "db"));
    assert_eq!(error.status_message(), StatusMessage::NotOwnedError);
    assert!(store.mutations().is_empty());
    assert_eq!(store.secret("ns", "db"), Some(unowned_db()));
}

#[tokio::test]
async fn test_suspended_resource_is_not_decrypted() {
    let unwrapper = Arc::new(StaticUnwrapper::default());
    let engine = engine(unwrapper.clone(), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), true), age_metadata());

    let outcome = converge(&engine, &store, &raw).await.unwrap();

    assert_eq!(outcome, PassOutcome::Suspended);
    assert_eq!(outcome.status_message(), StatusMessage::Suspended);
    assert_eq!(unwrapper.calls(), 0);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_base64_keeps_earlier_templates() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let templates = json!([
        db_template(),
        {"name": "broken", "data": {"key": "%%% not base64 %%%"}},
        {"name": "never", "stringData": {"a": "b"}}
    ]);
    let raw = encrypt_sops_secret(&sops_secret(templates, false), age_metadata());

    let error = converge(&engine, &store, &raw).await.unwrap_err();

    assert!(matches!(error, ConvergenceError::TemplateInvalid { index: 1, .. }));
    assert_eq!(error.status_message(), StatusMessage::SecretCreationError);
    assert!(store.secret("ns", "db").is_some());
    assert!(store.secret("ns", "broken").is_none());
    assert!(store.secret("ns", "never").is_none());
}

#[tokio::test]
async fn test_annotated_secret_is_taken_over() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let mut existing = unowned_db();
    existing.metadata.annotations = Some(BTreeMap::from([(
        "sopssecret/managed".to_string(),
        "true".to_string(),
    )]));
    let store = MemorySecretStore::with_secret(existing);
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), age_metadata());

    let outcome = converge(&engine, &store, &raw).await.unwrap();

    assert_eq!(
        outcome,
        PassOutcome::Converged(PassSummary {
            created: 0,
            updated: 1,
            unchanged: 0
        })
    );
    let secret = store.secret("ns", "db").unwrap();
    assert_eq!(secret.data.unwrap()["user"], bytes("u1"));
    let owners = secret.metadata.owner_references.unwrap();
    assert_eq!(owners[0].uid, OWNER_UID);
    assert_eq!(secret.metadata.resource_version.as_deref(), Some("18"));
}

#[tokio::test]
async fn test_drifted_owned_secret_is_refreshed() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), age_metadata());
    converge(&engine, &store, &raw).await.unwrap();

    let mut drifted = store.secret("ns", "db").unwrap();
    drifted
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert("user".to_string(), bytes("tampered"));
    drifted.metadata.labels = Some(BTreeMap::from([("extra".to_string(), "label".to_string())]));
    store.insert(drifted);

    let outcome = converge(&engine, &store, &raw).await.unwrap();

    assert_eq!(
        outcome,
        PassOutcome::Converged(PassSummary {
            created: 0,
            updated: 1,
            unchanged: 0
        })
    );
    let secret = store.secret("ns", "db").unwrap();
    assert_eq!(secret.data.unwrap()["user"], bytes("u1"));
    assert!(secret.metadata.labels.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn test_undecryptable_resource_reports_decryption_error() {
    let unwrapper = Arc::new(StaticUnwrapper::default());
    let engine = engine(unwrapper.clone(), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), unusable_metadata());

    let error = converge(&engine, &store, &raw).await.unwrap_err();

    assert!(matches!(
        error,
        ConvergenceError::Decryption(DecryptError::KeyUnavailable { .. })
    ));
    assert_eq!(error.status_message(), StatusMessage::DecryptionError);
    assert_eq!(unwrapper.calls(), 1);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_store_failures_map_to_status_messages() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let raw = encrypt_sops_secret(&sops_secret(json!([db_template()]), false), age_metadata());

    let failing_get = MemorySecretStore {
        fail_gets: true,
        ..MemorySecretStore::default()
    };
    let error = converge(&engine, &failing_get, &raw).await.unwrap_err();
    assert_eq!(error.status_message(), StatusMessage::UnknownError);

    let failing_update = MemorySecretStore {
        fail_updates: true,
        ..MemorySecretStore::default()
    };
    let mut stale = unowned_db();
    stale.metadata.annotations = Some(BTreeMap::from([(
        "sopssecret/managed".to_string(),
        "true".to_string(),
    )]));
    failing_update.insert(stale);
    let error = converge(&engine, &failing_update, &raw).await.unwrap_err();
    assert_eq!(error.status_message(), StatusMessage::UpdateError);
}

#[tokio::test]
async fn test_resource_without_uid_cannot_own_secrets() {
    let engine = engine(Arc::new(StaticUnwrapper::default()), IntegrityMode::Relaxed);
    let store = MemorySecretStore::default();
    let mut plain = sops_secret(json!([db_template()]), false);
    plain["metadata"].as_object_mut().unwrap().remove("uid");
    let raw = encrypt_sops_secret(&plain, age_metadata());

    let error = converge(&engine, &store, &raw).await.unwrap_err();

    assert!(matches!(error, ConvergenceError::OwnerReference));
    assert_eq!(error.status_message(), StatusMessage::OwnerReferenceError);
    assert!(store.calls().is_empty());
}

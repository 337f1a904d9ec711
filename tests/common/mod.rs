//! Shared fixtures for the integration tests: an in-memory secret store, a
//! fixed-key unwrapper and builders for encrypted `SopsSecret` objects.

#![allow(dead_code, reason = "each test binary uses a different subset of the fixtures")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use serde_json::{json, Value};
use sops_secrets_operator::controller::reconciler::{SecretStore, StoreError};
use sops_secrets_operator::sops::metadata::{AgeKey, Metadata, PgpKey};
use sops_secrets_operator::sops::{
    encrypt, DataKey, DecryptionEngine, EngineOptions, Format, IntegrityMode, KeyUnwrapper, MasterKey,
    UnwrapError,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use zeroize::Zeroizing;

pub const DATA_KEY: [u8; 32] = [7u8; 32];
pub const OWNER_UID: &str = "5f1c0b6e-uid-app";

/// Unwraps entries whose wrapped blob is `"wrapped-good"`; counts every call.
#[derive(Debug, Default)]
pub struct StaticUnwrapper {
    pub calls: AtomicUsize,
}

impl StaticUnwrapper {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyUnwrapper for StaticUnwrapper {
    async fn unwrap_key(&self, key: &MasterKey) -> Result<DataKey, UnwrapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if key.wrapped == "wrapped-good" {
            Ok(Zeroizing::new(DATA_KEY.to_vec()))
        } else {
            Err(UnwrapError::Failed(format!("cannot unwrap {}", key.identifier)))
        }
    }
}

pub fn engine(unwrapper: Arc<StaticUnwrapper>, integrity: IntegrityMode) -> DecryptionEngine {
    DecryptionEngine::new(
        unwrapper,
        EngineOptions {
            integrity,
            log_unwrap_failures: false,
        },
    )
}

/// Metadata with one age entry the [`StaticUnwrapper`] can open.
pub fn age_metadata() -> Metadata {
    Metadata {
        age: vec![AgeKey {
            recipient: "age1qqqtestrecipient".to_string(),
            enc: "wrapped-good".to_string(),
        }],
        version: "3.8.1".to_string(),
        ..Metadata::default()
    }
}

/// Metadata whose only entry cannot be unwrapped.
pub fn unusable_metadata() -> Metadata {
    Metadata {
        pgp: vec![PgpKey {
            fp: "FBC7B9E2A4F9289AC0C1D4843D16CEE4A27381B4".to_string(),
            enc: "wrapped-bad".to_string(),
            created_at: String::new(),
        }],
        version: "3.8.1".to_string(),
        ..Metadata::default()
    }
}

pub fn b64(value: &str) -> String {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    STANDARD.encode(value)
}

/// Plaintext `SopsSecret` object `ns/app` with the given templates.
pub fn sops_secret(templates: Value, suspend: bool) -> Value {
    json!({
        "apiVersion": "isindir.github.com/v1alpha3",
        "kind": "SopsSecret",
        "metadata": {
            "name": "app",
            "namespace": "ns",
            "uid": OWNER_UID,
            "resourceVersion": "1001"
        },
        "spec": {
            "suspend": suspend,
            "secretTemplates": templates
        }
    })
}

/// Encrypt everything under `spec.secretTemplates`, as `sops --encrypted-suffix Templates` does.
pub fn encrypt_sops_secret(plain: &Value, metadata: Metadata) -> Value {
    let metadata = Metadata {
        encrypted_suffix: Some("Templates".to_string()),
        ..metadata
    };
    let bytes = serde_json::to_vec(plain).unwrap();
    let encrypted = encrypt(&bytes, Format::Json, &DATA_KEY, metadata).unwrap();
    serde_json::from_slice(&encrypted).unwrap()
}

/// The `db` template: type "", stringData user=u1, data pass=b64(p1).
pub fn db_template() -> Value {
    json!({
        "name": "db",
        "type": "",
        "stringData": {"user": "u1"},
        "data": {"pass": b64("p1")}
    })
}

/// In-memory [`SecretStore`] recording every call.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    pub secrets: Mutex<BTreeMap<(String, String), Secret>>,
    pub calls: Mutex<Vec<String>>,
    pub fail_updates: bool,
    pub fail_gets: bool,
}

impl MemorySecretStore {
    pub fn with_secret(secret: Secret) -> Self {
        let store = Self::default();
        store.insert(secret);
        store
    }

    pub fn insert(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(key, secret);
    }

    pub fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Every create and update call, in order.
    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.starts_with("get "))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn bump_version(secret: &mut Secret) {
        let next = secret
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        secret.metadata.resource_version = Some(next.to_string());
    }
}

fn key_of(secret: &Secret) -> String {
    format!(
        "{}/{}",
        secret.metadata.namespace.as_deref().unwrap_or_default(),
        secret.metadata.name.as_deref().unwrap_or_default()
    )
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        self.record(format!("get {namespace}/{name}"));
        if self.fail_gets {
            return Err(StoreError::Backend("connection refused".to_string()));
        }
        Ok(self.secret(namespace, name))
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.record(format!("create {}", key_of(secret)));
        let mut stored = secret.clone();
        stored.metadata.uid = Some(format!("uid-{}", key_of(secret)));
        Self::bump_version(&mut stored);
        self.insert(stored.clone());
        Ok(stored)
    }

    async fn update(&self, secret: &Secret) -> Result<Secret, StoreError> {
        self.record(format!("update {}", key_of(secret)));
        if self.fail_updates {
            return Err(StoreError::Backend("the object has been modified".to_string()));
        }
        let mut stored = secret.clone();
        Self::bump_version(&mut stored);
        self.insert(stored.clone());
        Ok(stored)
    }
}

//! # Secret Store
//!
//! The narrow view of the cluster the convergence pass needs: get, create
//! and update child secrets. The production store talks to the API server;
//! tests plug in an in-memory store.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, PostParams};
use kube::Client;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
    #[error("secret is missing metadata.{0}")]
    MissingMetadata(&'static str),
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Look up a secret; `Ok(None)` when it does not exist.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError>;

    /// Create a secret in its own namespace and return the stored object.
    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError>;

    /// Replace an existing secret and return the stored object.
    async fn update(&self, secret: &Secret) -> Result<Secret, StoreError>;
}

/// [`SecretStore`] backed by `kube::Api<Secret>`.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: Client,
}

impl std::fmt::Debug for KubeSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretStore").finish_non_exhaustive()
    }
}

impl KubeSecretStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn identity(secret: &Secret) -> Result<(&str, &str), StoreError> {
    let namespace = secret
        .metadata
        .namespace
        .as_deref()
        .ok_or(StoreError::MissingMetadata("namespace"))?;
    let name = secret
        .metadata
        .name
        .as_deref()
        .ok_or(StoreError::MissingMetadata("name"))?;
    Ok((namespace, name))
}

#[async_trait]
impl SecretStore for KubeSecretStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, StoreError> {
        Ok(self.api(namespace).get_opt(name).await?)
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let (namespace, name) = identity(secret)?;
        debug!(secret = name, namespace = namespace, "Creating secret");
        Ok(self.api(namespace).create(&PostParams::default(), secret).await?)
    }

    async fn update(&self, secret: &Secret) -> Result<Secret, StoreError> {
        let (namespace, name) = identity(secret)?;
        debug!(secret = name, namespace = namespace, "Replacing secret");
        Ok(self
            .api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::ObjectMeta;

    #[test]
    fn test_identity_requires_namespace() {
        let secret = Secret {
            metadata: ObjectMeta {
                name: Some("db".to_string()),
                ..ObjectMeta::default()
            },
            ..Secret::default()
        };
        assert!(matches!(
            identity(&secret),
            Err(StoreError::MissingMetadata("namespace"))
        ));
    }
}

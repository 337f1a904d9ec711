//! # Key Unwrapping
//!
//! A SOPS document stores its data key once per master key, wrapped by that
//! key's provider. [`KeyUnwrapper`] recovers the raw data key from one such
//! entry; [`Keyring`] dispatches entries to the unwrapper registered for
//! their provider.
//!
//! Built-in unwrappers shell out to `gpg` and `age`. Cloud KMS providers are
//! not handled and report [`UnwrapError::Unsupported`].

pub mod age;
pub mod load;
pub mod pgp;
mod process;

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use zeroize::Zeroizing;

pub use age::AgeUnwrapper;
pub use load::{build_keyring, load_keyring, KeyEnvironment, KeyMaterial};
pub use pgp::GpgUnwrapper;

/// Raw 32-byte data key, wiped on drop.
pub type DataKey = Zeroizing<Vec<u8>>;

/// Provider family of a wrapped-key entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyProvider {
    Kms,
    GcpKms,
    AzureKv,
    HcVault,
    Age,
    Pgp,
}

impl KeyProvider {
    /// Name of the provider list in the `sops` metadata block.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            KeyProvider::Kms => "kms",
            KeyProvider::GcpKms => "gcp_kms",
            KeyProvider::AzureKv => "azure_kv",
            KeyProvider::HcVault => "hc_vault",
            KeyProvider::Age => "age",
            KeyProvider::Pgp => "pgp",
        }
    }
}

impl fmt::Display for KeyProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider-tagged wrapped copy of the data key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterKey {
    pub provider: KeyProvider,
    /// Fingerprint, recipient, ARN or resource id, depending on the provider.
    pub identifier: String,
    /// The wrapped data key exactly as stored in the document.
    pub wrapped: String,
}

impl MasterKey {
    #[must_use]
    pub fn new(provider: KeyProvider, identifier: &str, wrapped: &str) -> Self {
        Self {
            provider,
            identifier: identifier.to_string(),
            wrapped: wrapped.to_string(),
        }
    }
}

impl fmt::Display for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.provider, self.identifier)
    }
}

#[derive(Debug, Error)]
pub enum UnwrapError {
    #[error("no unwrapper configured for {0} keys")]
    Unsupported(KeyProvider),
    #[error("no private key material available for {0}")]
    NoKeyMaterial(KeyProvider),
    #[error("{tool} is not available: {reason}")]
    ToolUnavailable { tool: &'static str, reason: String },
    #[error("{0}")]
    Failed(String),
}

/// Recovers the raw data key from one wrapped-key entry.
#[async_trait]
pub trait KeyUnwrapper: Send + Sync {
    /// Unwrap `key`, returning the raw data key.
    async fn unwrap_key(&self, key: &MasterKey) -> Result<DataKey, UnwrapError>;
}

#[async_trait]
impl<T> KeyUnwrapper for Arc<T>
where
    T: KeyUnwrapper + ?Sized,
{
    async fn unwrap_key(&self, key: &MasterKey) -> Result<DataKey, UnwrapError> {
        (**self).unwrap_key(key).await
    }
}

#[async_trait]
impl<T> KeyUnwrapper for Box<T>
where
    T: KeyUnwrapper + ?Sized,
{
    async fn unwrap_key(&self, key: &MasterKey) -> Result<DataKey, UnwrapError> {
        (**self).unwrap_key(key).await
    }
}

/// Dispatches wrapped-key entries to the unwrapper registered for their
/// provider.
#[derive(Default, Clone)]
pub struct Keyring {
    unwrappers: HashMap<KeyProvider, Arc<dyn KeyUnwrapper>>,
}

impl Keyring {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `unwrapper` for `provider`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, provider: KeyProvider, unwrapper: Arc<dyn KeyUnwrapper>) -> Self {
        self.unwrappers.insert(provider, unwrapper);
        self
    }

    #[must_use]
    pub fn providers(&self) -> Vec<KeyProvider> {
        let mut providers: Vec<_> = self.unwrappers.keys().copied().collect();
        providers.sort_by_key(|p| p.as_str());
        providers
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.unwrappers.is_empty()
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("providers", &self.providers())
            .finish()
    }
}

#[async_trait]
impl KeyUnwrapper for Keyring {
    async fn unwrap_key(&self, key: &MasterKey) -> Result<DataKey, UnwrapError> {
        match self.unwrappers.get(&key.provider) {
            Some(unwrapper) => unwrapper.unwrap_key(key).await,
            None => Err(UnwrapError::Unsupported(key.provider)),
        }
    }
}

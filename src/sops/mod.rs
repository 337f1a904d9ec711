//! # SOPS Decryption Engine
//!
//! Decrypts SOPS documents in-process: the data key is recovered from one of
//! the document's wrapped-key entries through a [`KeyUnwrapper`], then every
//! selected leaf is decrypted with AES-256-GCM using its structural path as
//! additional authenticated data.
//!
//! ```text
//! bytes ──load──▶ EncryptedTree ──unwrap data key──▶ walk leaves ──emit──▶ bytes
//! ```
//!
//! Integrity checking of the aggregate MAC is relaxed by default, since the
//! API server mutates resources after they were encrypted. Per-leaf
//! authentication is always enforced.

pub mod cipher;
pub mod error;
pub mod format;
pub mod keys;
pub mod metadata;
pub mod tree;

pub use error::DecryptError;
pub use format::{EncryptedTree, Format};
pub use keys::{DataKey, KeyProvider, KeyUnwrapper, Keyring, MasterKey, UnwrapError};
pub use metadata::Metadata;

use crate::observability::metrics;
use cipher::DataType;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info_span, warn, Instrument};
use tree::{Decryptor, Encryptor, Value};

/// How the aggregate MAC is treated on decryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IntegrityMode {
    /// Compute the MAC but never fail on a mismatch.
    #[default]
    Relaxed,
    /// Fail with [`DecryptError::IntegrityMismatch`] on a mismatch.
    Strict,
}

impl IntegrityMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            IntegrityMode::Relaxed => "relaxed",
            IntegrityMode::Strict => "strict",
        }
    }
}

impl fmt::Display for IntegrityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relaxed" => Ok(IntegrityMode::Relaxed),
            "strict" => Ok(IntegrityMode::Strict),
            other => Err(format!("unknown integrity mode '{other}' (expected 'relaxed' or 'strict')")),
        }
    }
}

/// Engine behaviour, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    pub integrity: IntegrityMode,
    /// Log every failed unwrap attempt at `warn` instead of `debug`.
    pub log_unwrap_failures: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            integrity: IntegrityMode::Relaxed,
            log_unwrap_failures: true,
        }
    }
}

/// Decrypts SOPS documents using a pluggable [`KeyUnwrapper`].
#[derive(Clone)]
pub struct DecryptionEngine {
    unwrapper: Arc<dyn KeyUnwrapper>,
    options: EngineOptions,
}

impl fmt::Debug for DecryptionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptionEngine")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl DecryptionEngine {
    #[must_use]
    pub fn new(unwrapper: Arc<dyn KeyUnwrapper>, options: EngineOptions) -> Self {
        Self { unwrapper, options }
    }

    #[must_use]
    pub fn options(&self) -> EngineOptions {
        self.options
    }

    /// Decrypt a serialized document and emit it in the same format.
    ///
    /// # Errors
    ///
    /// See [`DecryptError`]; integrity mismatches only surface in strict mode.
    pub async fn decrypt(&self, data: &[u8], format: Format) -> Result<Vec<u8>, DecryptError> {
        let span = info_span!(
            "sops.decrypt",
            format = %format,
            size = data.len(),
            integrity = %self.options.integrity
        );
        let start = std::time::Instant::now();
        metrics::increment_decryptions(format.as_str());

        let result = async {
            let tree = format.load_encrypted(data)?;
            let branch = self.decrypt_tree(tree).await?;
            format.emit_plain(&branch)
        }
        .instrument(span)
        .await;

        metrics::observe_decryption_duration(start.elapsed().as_secs_f64());
        if let Err(e) = &result {
            metrics::increment_decryption_errors(e.reason());
        }
        result
    }

    /// Decrypt an already loaded tree, returning the plaintext branch.
    ///
    /// # Errors
    ///
    /// See [`DecryptError`].
    pub async fn decrypt_tree(&self, tree: EncryptedTree) -> Result<tree::Branch, DecryptError> {
        let EncryptedTree { metadata, mut branch } = tree;
        let rules = metadata
            .encryption_rules()
            .map_err(|e| DecryptError::malformed("sops", format!("invalid selection rule: {e}")))?;
        let key = self.data_key(&metadata).await?;

        let computed = Decryptor::new(&key, &rules, metadata.mac_only_encrypted).run(&mut branch)?;
        match (self.options.integrity, verify_mac(&metadata, &key, &computed)) {
            (_, Ok(())) => {}
            (IntegrityMode::Strict, Err(e)) => return Err(e),
            (IntegrityMode::Relaxed, Err(_)) => {
                debug!("MAC does not match document content, ignored in relaxed integrity mode");
            }
        }
        Ok(branch)
    }

    /// Recover the data key: entries are tried in order, first success wins.
    ///
    /// # Errors
    ///
    /// [`DecryptError::KeyUnavailable`] listing every failed attempt.
    pub async fn data_key(&self, metadata: &Metadata) -> Result<DataKey, DecryptError> {
        let mut attempts = Vec::new();
        for master_key in metadata.master_keys() {
            match self.unwrapper.unwrap_key(&master_key).await {
                Ok(key) => {
                    debug!(provider = %master_key.provider, "Unwrapped data key");
                    return Ok(key);
                }
                Err(e) => {
                    if self.options.log_unwrap_failures {
                        warn!("Failed to unwrap data key with {}: {}", master_key, e);
                    } else {
                        debug!("Failed to unwrap data key with {}: {}", master_key, e);
                    }
                    attempts.push(format!("{master_key}: {e}"));
                }
            }
        }
        Err(DecryptError::KeyUnavailable { attempts })
    }
}

fn verify_mac(metadata: &Metadata, key: &[u8], computed: &str) -> Result<(), DecryptError> {
    let stored = cipher::decrypt(&metadata.mac, key, &metadata.lastmodified)
        .map_err(|_| DecryptError::IntegrityMismatch)?;
    match stored.value {
        Value::String(mac) if mac == computed => Ok(()),
        _ => Err(DecryptError::IntegrityMismatch),
    }
}

/// Encrypt a plaintext document with a caller-supplied data key.
///
/// `metadata` supplies the wrapped-key entries and selection rules; `mac` is
/// recomputed and `lastmodified` is set to now when empty.
///
/// # Errors
///
/// [`DecryptError::MalformedDocument`] when the input does not parse,
/// [`DecryptError::EncryptionFailure`] when a leaf cannot be encrypted.
pub fn encrypt(plain: &[u8], format: Format, data_key: &[u8], mut metadata: Metadata) -> Result<Vec<u8>, DecryptError> {
    let mut branch = format.load_plain(plain)?;
    let rules = metadata
        .encryption_rules()
        .map_err(|e| DecryptError::malformed("sops", format!("invalid selection rule: {e}")))?;

    let mac = Encryptor::new(data_key, &rules, metadata.mac_only_encrypted).run(&mut branch)?;
    if metadata.lastmodified.is_empty() {
        metadata.lastmodified = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    }
    metadata.mac = cipher::encrypt(&Value::String(mac), DataType::Str, data_key, &metadata.lastmodified)
        .map_err(|e| DecryptError::EncryptionFailure {
            path: "sops:mac".to_string(),
            reason: e.to_string(),
        })?;

    format.emit_encrypted(&EncryptedTree { metadata, branch })
}

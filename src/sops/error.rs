//! # SOPS Errors
//!
//! Failure classification for document decryption. Each error carries a
//! stable reason label (used as a metrics label) and a transient/permanent
//! classification so callers can decide whether retrying can help.

use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecryptError {
    /// No wrapped-key entry could be unwrapped.
    #[error("no master key could unwrap the data key ({} attempted): {}", attempts.len(), attempts.join("; "))]
    KeyUnavailable { attempts: Vec<String> },

    /// The document could not be parsed, or lacks SOPS metadata.
    #[error("malformed {format} document: {reason}")]
    MalformedDocument { format: &'static str, reason: String },

    /// A selected leaf failed authenticated decryption.
    #[error("failed to decrypt value at '{path}': {reason}")]
    LeafDecryptionFailure { path: String, reason: String },

    /// The aggregate MAC did not match (strict integrity mode only).
    #[error("MAC mismatch: document was modified after encryption")]
    IntegrityMismatch,

    /// A leaf could not be encrypted.
    #[error("failed to encrypt value at '{path}': {reason}")]
    EncryptionFailure { path: String, reason: String },
}

impl DecryptError {
    pub(crate) fn malformed(format: &'static str, reason: impl Display) -> Self {
        DecryptError::MalformedDocument {
            format,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn leaf(path: &[String], reason: impl Display) -> Self {
        let mut joined = path.join(":");
        joined.push(':');
        DecryptError::LeafDecryptionFailure {
            path: joined,
            reason: reason.to_string(),
        }
    }

    /// Stable label for metrics.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            DecryptError::KeyUnavailable { .. } => "key_unavailable",
            DecryptError::MalformedDocument { .. } => "malformed_document",
            DecryptError::LeafDecryptionFailure { .. } => "leaf_decryption_failure",
            DecryptError::IntegrityMismatch => "integrity_mismatch",
            DecryptError::EncryptionFailure { .. } => "encryption_failure",
        }
    }

    /// Key providers can recover (key secret updated, tool installed), the
    /// document itself cannot.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, DecryptError::KeyUnavailable { .. })
    }

    /// Operator-facing hint for fixing the failure.
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            DecryptError::KeyUnavailable { .. } => {
                "Make sure a private key matching one of the document's master keys is present in the operator key secret"
            }
            DecryptError::MalformedDocument { .. } => {
                "Re-encrypt the document with sops; it must carry a 'sops' metadata block"
            }
            DecryptError::LeafDecryptionFailure { .. } => {
                "An encrypted value was altered or moved to another key; re-encrypt the document"
            }
            DecryptError::IntegrityMismatch => {
                "The document was modified after encryption; re-encrypt it or use relaxed integrity mode"
            }
            DecryptError::EncryptionFailure { .. } => "Check the data key and the value types of the document",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_key_unavailability_is_transient() {
        assert!(DecryptError::KeyUnavailable { attempts: vec![] }.is_transient());
        assert!(!DecryptError::IntegrityMismatch.is_transient());
        assert!(!DecryptError::malformed("json", "eof").is_transient());
    }

    #[test]
    fn test_leaf_error_renders_path() {
        let err = DecryptError::leaf(&["spec".to_string(), "pass".to_string()], "bad tag");
        assert_eq!(err.reason(), "leaf_decryption_failure");
        assert!(err.to_string().contains("spec:pass:"));
    }

    #[test]
    fn test_key_unavailable_lists_attempts() {
        let err = DecryptError::KeyUnavailable {
            attempts: vec!["pgp ABC: no secret key".to_string(), "age age1x: failed".to_string()],
        };
        let message = err.to_string();
        assert!(message.contains("2 attempted"));
        assert!(message.contains("pgp ABC"));
    }
}

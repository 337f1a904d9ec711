//! # SopsSecret Status
//!
//! The single status message written after every reconciliation pass.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SopsSecretStatus {
    /// SopsSecret status message
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Every message the operator reports in `status.message`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMessage {
    Healthy,
    Suspended,
    DecryptionError,
    SecretCreationError,
    OwnerReferenceError,
    NotOwnedError,
    UpdateError,
    UnknownError,
}

impl StatusMessage {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StatusMessage::Healthy => "Healthy",
            StatusMessage::Suspended => "Reconciliation is suspended",
            StatusMessage::DecryptionError => "Decryption error",
            StatusMessage::SecretCreationError => "New child secret creation error",
            StatusMessage::OwnerReferenceError => "Setting controller ownership of the child secret error",
            StatusMessage::NotOwnedError => "Child secret is not owned by controller error",
            StatusMessage::UpdateError => "Child secret update error",
            StatusMessage::UnknownError => "Unknown Error",
        }
    }
}

impl fmt::Display for StatusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

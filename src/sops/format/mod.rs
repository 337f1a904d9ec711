//! # Document Formats
//!
//! Each format loads an encrypted document into a [`Branch`] plus its
//! metadata and emits a tree back out. The format is chosen once at entry
//! and dispatched through [`Format`].

mod binary;
mod dotenv;
mod json;
mod yaml;

use crate::sops::error::DecryptError;
use crate::sops::metadata::Metadata;
use crate::sops::tree::Branch;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Root key holding the SOPS metadata in structured formats.
pub const METADATA_KEY: &str = "sops";

/// Serialization family of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Yaml,
    Dotenv,
    Binary,
}

/// A loaded encrypted document.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedTree {
    pub metadata: Metadata,
    pub branch: Branch,
}

impl Format {
    /// Resolve a format name. Unknown names fall back to [`Format::Binary`].
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "json" => Format::Json,
            "yaml" | "yml" => Format::Yaml,
            "dotenv" | "env" => Format::Dotenv,
            _ => Format::Binary,
        }
    }

    /// Infer the format from a file extension.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(Format::Binary, Format::from_name)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Yaml => "yaml",
            Format::Dotenv => "dotenv",
            Format::Binary => "binary",
        }
    }

    /// Parse an encrypted document, splitting off its metadata.
    ///
    /// # Errors
    ///
    /// [`DecryptError::MalformedDocument`] when the document does not parse
    /// or carries no valid metadata.
    pub fn load_encrypted(self, data: &[u8]) -> Result<EncryptedTree, DecryptError> {
        let (branch, metadata) = match self {
            Format::Json => json::load(data)?,
            Format::Yaml => yaml::load(data)?,
            Format::Dotenv => dotenv::load(data)?,
            Format::Binary => binary::load(data)?,
        };
        let metadata = metadata.ok_or_else(|| {
            DecryptError::malformed(self.as_str(), "sops metadata not found")
        })?;
        let metadata = serde_json::from_value(metadata)
            .map_err(|e| DecryptError::malformed(self.as_str(), format!("invalid sops metadata: {e}")))?;
        Ok(EncryptedTree { metadata, branch })
    }

    /// Parse a plaintext document.
    ///
    /// # Errors
    ///
    /// [`DecryptError::MalformedDocument`] when the document does not parse.
    pub fn load_plain(self, data: &[u8]) -> Result<Branch, DecryptError> {
        match self {
            Format::Json => json::load(data).map(|(branch, _)| branch),
            Format::Yaml => yaml::load(data).map(|(branch, _)| branch),
            Format::Dotenv => dotenv::load(data).map(|(branch, _)| branch),
            Format::Binary => Ok(binary::load_plain(data)),
        }
    }

    /// Serialize a decrypted tree.
    ///
    /// # Errors
    ///
    /// [`DecryptError::MalformedDocument`] when the tree cannot be expressed
    /// in this format.
    pub fn emit_plain(self, branch: &Branch) -> Result<Vec<u8>, DecryptError> {
        match self {
            Format::Json => json::emit(branch, None),
            Format::Yaml => yaml::emit(branch, None),
            Format::Dotenv => dotenv::emit(branch, None),
            Format::Binary => binary::emit_plain(branch),
        }
    }

    /// Serialize an encrypted tree together with its metadata.
    ///
    /// # Errors
    ///
    /// [`DecryptError::MalformedDocument`] when the tree or metadata cannot
    /// be expressed in this format.
    pub fn emit_encrypted(self, tree: &EncryptedTree) -> Result<Vec<u8>, DecryptError> {
        let metadata = serde_json::to_value(&tree.metadata)
            .map_err(|e| DecryptError::malformed(self.as_str(), e))?;
        match self {
            Format::Json | Format::Binary => json::emit(&tree.branch, Some(&metadata)),
            Format::Yaml => yaml::emit(&tree.branch, Some(&metadata)),
            Format::Dotenv => dotenv::emit(&tree.branch, Some(&metadata)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Format::from_name(s))
    }
}

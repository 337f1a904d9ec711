//! # SOPS Tree
//!
//! Format-independent, order-preserving representation of a SOPS document,
//! plus the recursive walks that encrypt and decrypt its leaves.
//!
//! Leaf AAD is the chain of mapping keys leading to the leaf, joined with `:`
//! and terminated by `:` (`spec:secretTemplates:`). Sequence elements share the
//! path of the sequence itself, which keeps documents byte-compatible with the
//! `sops` CLI.

use crate::sops::cipher::{self, CipherError, DataType};
use crate::sops::error::DecryptError;
use crate::sops::metadata::EncryptionRules;
use sha2::{Digest, Sha512};

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Branch(Branch),
    Sequence(Vec<Value>),
}

/// One entry of a branch. Comments only survive in line-oriented formats.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Pair(String, Value),
    Comment(String),
}

/// Ordered mapping of the document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Branch(pub Vec<Item>);

impl Branch {
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<String>, value: Value) {
        self.0.push(Item::Pair(key.into(), value));
    }

    /// Look up the first value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find_map(|item| match item {
            Item::Pair(k, v) if k == key => Some(v),
            _ => None,
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Value {
    /// Bytes fed into the MAC for this value.
    ///
    /// Booleans hash as `True`/`False` to stay compatible with documents
    /// written by the reference tooling.
    #[must_use]
    pub fn mac_bytes(&self) -> Vec<u8> {
        match self {
            Value::Null | Value::Branch(_) | Value::Sequence(_) => Vec::new(),
            Value::Bool(true) => b"True".to_vec(),
            Value::Bool(false) => b"False".to_vec(),
            Value::Int(i) => i.to_string().into_bytes(),
            Value::Float(f) => f.to_string().into_bytes(),
            Value::String(s) => s.as_bytes().to_vec(),
            Value::Bytes(b) => b.clone(),
        }
    }
}

fn aad(path: &[String]) -> String {
    let mut out = path.join(":");
    out.push(':');
    out
}

/// Decrypts every selected leaf in place and feeds the MAC hasher.
pub(crate) struct Decryptor<'a> {
    key: &'a [u8],
    rules: &'a EncryptionRules,
    mac_only_encrypted: bool,
    hasher: Sha512,
}

impl<'a> Decryptor<'a> {
    pub(crate) fn new(key: &'a [u8], rules: &'a EncryptionRules, mac_only_encrypted: bool) -> Self {
        Self {
            key,
            rules,
            mac_only_encrypted,
            hasher: Sha512::new(),
        }
    }

    /// Walk the whole document and return the computed MAC (upper-case hex).
    pub(crate) fn run(mut self, branch: &mut Branch) -> Result<String, DecryptError> {
        let mut path = Vec::new();
        self.branch(branch, &mut path)?;
        Ok(hex_upper(&self.hasher.finalize()))
    }

    fn branch(&mut self, branch: &mut Branch, path: &mut Vec<String>) -> Result<(), DecryptError> {
        for item in &mut branch.0 {
            match item {
                Item::Comment(text) => {
                    if self.rules.should_encrypt(path) {
                        // Comments written by older tooling may be plaintext.
                        if let Ok(plain) = cipher::decrypt(text, self.key, &aad(path)) {
                            *text = match plain.value {
                                Value::String(s) => s,
                                other => String::from_utf8_lossy(&other.mac_bytes()).into_owned(),
                            };
                        }
                    }
                    self.hasher.update(text.as_bytes());
                }
                Item::Pair(key, value) => {
                    path.push(key.clone());
                    let result = self.value(value, path);
                    path.pop();
                    result?;
                }
            }
        }
        Ok(())
    }

    fn value(&mut self, value: &mut Value, path: &mut Vec<String>) -> Result<(), DecryptError> {
        match value {
            Value::Branch(branch) => self.branch(branch, path),
            Value::Sequence(items) => {
                for item in items {
                    self.value(item, path)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            leaf => {
                let encrypted = self.rules.should_encrypt(path);
                if encrypted {
                    let Value::String(ciphertext) = leaf else {
                        return Err(DecryptError::leaf(path, "value is not an encrypted string"));
                    };
                    let plain = cipher::decrypt(ciphertext, self.key, &aad(path))
                        .map_err(|e| DecryptError::leaf(path, e))?;
                    *leaf = plain.value;
                }
                if encrypted || !self.mac_only_encrypted {
                    self.hasher.update(leaf.mac_bytes());
                }
                Ok(())
            }
        }
    }
}

/// Encrypts every selected leaf in place; the inverse of [`Decryptor`].
pub(crate) struct Encryptor<'a> {
    key: &'a [u8],
    rules: &'a EncryptionRules,
    mac_only_encrypted: bool,
    hasher: Sha512,
}

impl<'a> Encryptor<'a> {
    pub(crate) fn new(key: &'a [u8], rules: &'a EncryptionRules, mac_only_encrypted: bool) -> Self {
        Self {
            key,
            rules,
            mac_only_encrypted,
            hasher: Sha512::new(),
        }
    }

    pub(crate) fn run(mut self, branch: &mut Branch) -> Result<String, DecryptError> {
        let mut path = Vec::new();
        self.branch(branch, &mut path)?;
        Ok(hex_upper(&self.hasher.finalize()))
    }

    fn branch(&mut self, branch: &mut Branch, path: &mut Vec<String>) -> Result<(), DecryptError> {
        for item in &mut branch.0 {
            match item {
                Item::Comment(text) => {
                    self.hasher.update(text.as_bytes());
                    if self.rules.should_encrypt(path) {
                        *text = cipher::encrypt(
                            &Value::String(text.clone()),
                            DataType::Comment,
                            self.key,
                            &aad(path),
                        )
                        .map_err(|e| encryption_failure(path, &e))?;
                    }
                }
                Item::Pair(key, value) => {
                    path.push(key.clone());
                    let result = self.value(value, path);
                    path.pop();
                    result?;
                }
            }
        }
        Ok(())
    }

    fn value(&mut self, value: &mut Value, path: &mut Vec<String>) -> Result<(), DecryptError> {
        match value {
            Value::Branch(branch) => self.branch(branch, path),
            Value::Sequence(items) => {
                for item in items {
                    self.value(item, path)?;
                }
                Ok(())
            }
            Value::Null => Ok(()),
            leaf => {
                let encrypted = self.rules.should_encrypt(path);
                if encrypted || !self.mac_only_encrypted {
                    self.hasher.update(leaf.mac_bytes());
                }
                if encrypted {
                    let data_type = DataType::of(leaf);
                    let ciphertext = cipher::encrypt(leaf, data_type, self.key, &aad(path))
                        .map_err(|e| encryption_failure(path, &e))?;
                    *leaf = Value::String(ciphertext);
                }
                Ok(())
            }
        }
    }
}

fn encryption_failure(path: &[String], err: &CipherError) -> DecryptError {
    DecryptError::EncryptionFailure {
        path: aad(path),
        reason: err.to_string(),
    }
}

pub(crate) fn hex_upper(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{b:02X}");
        out
    })
}

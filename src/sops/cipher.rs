//! # Leaf Cipher
//!
//! AES-256-GCM encryption of individual tree values using the SOPS envelope
//! `ENC[AES256_GCM,data:<b64>,iv:<b64>,tag:<b64>,type:<type>]`.
//!
//! SOPS generates 32-byte IVs, which the stock `Aes256Gcm` alias does not
//! accept, so the generic `AesGcm` type is instantiated with a 32-byte nonce.
//! Documents that carry the standard 12-byte IV are also handled.

use crate::sops::tree::Value;
use aes_gcm::aead::consts::U32;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng, Payload};
use aes_gcm::aes::Aes256;
use aes_gcm::{Aes256Gcm, AesGcm};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// AES-256-GCM with the 32-byte nonce SOPS writes.
type Aes256Gcm32 = AesGcm<Aes256, U32>;

const TAG_LEN: usize = 16;

static ENCRYPTED_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ENC\[AES256_GCM,data:(.+),iv:(.+),tag:(.+),type:(.+)\]$")
        .expect("Failed to compile encrypted value pattern - this should never happen")
});

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("value is not a valid ENC[AES256_GCM,...] envelope")]
    Malformed,
    #[error("invalid base64 in {field}")]
    InvalidBase64 { field: &'static str },
    #[error("unsupported value type '{0}'")]
    UnknownType(String),
    #[error("data key must be 32 bytes, got {0}")]
    InvalidKey(usize),
    #[error("unsupported IV length {0}")]
    InvalidIv(usize),
    #[error("authentication failed (wrong key, tampered value or mismatched path)")]
    Authentication,
    #[error("could not interpret plaintext as {data_type}: {reason}")]
    InvalidPlaintext { data_type: DataType, reason: String },
    #[error("encryption failed")]
    Encrypt,
}

/// Type tag carried inside every encrypted envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Comment,
}

impl DataType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            DataType::Str => "str",
            DataType::Int => "int",
            DataType::Float => "float",
            DataType::Bool => "bool",
            DataType::Bytes => "bytes",
            DataType::Comment => "comment",
        }
    }

    /// Type tag to use when encrypting `value`.
    #[must_use]
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Bool(_) => DataType::Bool,
            Value::Int(_) => DataType::Int,
            Value::Float(_) => DataType::Float,
            Value::Bytes(_) => DataType::Bytes,
            _ => DataType::Str,
        }
    }

    fn parse(tag: &str) -> Result<Self, CipherError> {
        Ok(match tag {
            "str" => DataType::Str,
            "int" => DataType::Int,
            "float" => DataType::Float,
            "bool" => DataType::Bool,
            "bytes" => DataType::Bytes,
            "comment" => DataType::Comment,
            other => return Err(CipherError::UnknownType(other.to_string())),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed form of an `ENC[...]` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedValue {
    pub data: Vec<u8>,
    pub iv: Vec<u8>,
    pub tag: Vec<u8>,
    pub data_type: DataType,
}

impl EncryptedValue {
    /// Parse an envelope string.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::Malformed`] when the string is not an envelope,
    /// or a more specific error when a component does not decode.
    pub fn parse(input: &str) -> Result<Self, CipherError> {
        let captures = ENCRYPTED_VALUE.captures(input).ok_or(CipherError::Malformed)?;
        let field = |index: usize, name: &'static str| {
            STANDARD
                .decode(&captures[index])
                .map_err(|_| CipherError::InvalidBase64 { field: name })
        };
        Ok(Self {
            data: field(1, "data")?,
            iv: field(2, "iv")?,
            tag: field(3, "tag")?,
            data_type: DataType::parse(&captures[4])?,
        })
    }
}

impl fmt::Display for EncryptedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ENC[AES256_GCM,data:{},iv:{},tag:{},type:{}]",
            STANDARD.encode(&self.data),
            STANDARD.encode(&self.iv),
            STANDARD.encode(&self.tag),
            self.data_type
        )
    }
}

/// A decrypted leaf together with the type tag it was stored under.
#[derive(Debug, Clone, PartialEq)]
pub struct Decrypted {
    pub data_type: DataType,
    pub value: Value,
}

/// Decrypt one envelope using `key` and the leaf's `aad`.
///
/// The empty string is never encrypted and decrypts to itself.
///
/// # Errors
///
/// Fails when the envelope is malformed, the key has the wrong size, the
/// tag does not authenticate, or the plaintext does not match its type tag.
pub fn decrypt(ciphertext: &str, key: &[u8], aad: &str) -> Result<Decrypted, CipherError> {
    if ciphertext.is_empty() {
        return Ok(Decrypted {
            data_type: DataType::Str,
            value: Value::String(String::new()),
        });
    }
    let envelope = EncryptedValue::parse(ciphertext)?;
    if key.len() != 32 {
        return Err(CipherError::InvalidKey(key.len()));
    }

    let mut sealed = envelope.data.clone();
    sealed.extend_from_slice(&envelope.tag);
    let payload = Payload {
        msg: &sealed,
        aad: aad.as_bytes(),
    };

    let plaintext = match envelope.iv.len() {
        32 => Aes256Gcm32::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKey(key.len()))?
            .decrypt(GenericArray::from_slice(&envelope.iv), payload),
        12 => Aes256Gcm::new_from_slice(key)
            .map_err(|_| CipherError::InvalidKey(key.len()))?
            .decrypt(GenericArray::from_slice(&envelope.iv), payload),
        other => return Err(CipherError::InvalidIv(other)),
    }
    .map_err(|_| CipherError::Authentication)?;

    Ok(Decrypted {
        data_type: envelope.data_type,
        value: interpret(envelope.data_type, plaintext)?,
    })
}

fn interpret(data_type: DataType, plaintext: Vec<u8>) -> Result<Value, CipherError> {
    let invalid = |reason: String| CipherError::InvalidPlaintext { data_type, reason };
    let text = match data_type {
        DataType::Bytes => return Ok(Value::Bytes(plaintext)),
        _ => String::from_utf8(plaintext).map_err(|e| invalid(e.to_string()))?,
    };
    match data_type {
        DataType::Int => text.parse().map(Value::Int).map_err(|e| invalid(format!("{e}"))),
        DataType::Float => text.parse().map(Value::Float).map_err(|e| invalid(format!("{e}"))),
        DataType::Bool => parse_bool(&text)
            .map(Value::Bool)
            .ok_or_else(|| invalid(format!("'{text}' is not a boolean"))),
        DataType::Str | DataType::Comment | DataType::Bytes => Ok(Value::String(text)),
    }
}

/// Boolean spellings accepted by the reference tooling.
fn parse_bool(text: &str) -> Option<bool> {
    match text {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Encrypt `value` under a fresh random 32-byte IV.
///
/// # Errors
///
/// Fails when the key has the wrong size or the value is a branch/sequence.
pub fn encrypt(value: &Value, data_type: DataType, key: &[u8], aad: &str) -> Result<String, CipherError> {
    let plaintext = match value {
        Value::String(s) if s.is_empty() => return Ok(String::new()),
        Value::String(s) => s.as_bytes().to_vec(),
        Value::Int(i) => i.to_string().into_bytes(),
        Value::Float(f) => f.to_string().into_bytes(),
        Value::Bool(b) => b.to_string().into_bytes(),
        Value::Bytes(b) => b.clone(),
        Value::Null | Value::Branch(_) | Value::Sequence(_) => {
            return Err(CipherError::InvalidPlaintext {
                data_type,
                reason: "only scalar values can be encrypted".to_string(),
            })
        }
    };

    let cipher = Aes256Gcm32::new_from_slice(key).map_err(|_| CipherError::InvalidKey(key.len()))?;
    let nonce = Aes256Gcm32::generate_nonce(&mut OsRng);
    let mut sealed = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: &plaintext,
                aad: aad.as_bytes(),
            },
        )
        .map_err(|_| CipherError::Encrypt)?;
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok(EncryptedValue {
        data: sealed,
        iv: nonce.to_vec(),
        tag,
        data_type,
    }
    .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [7u8; 32];

    #[test]
    fn test_string_round_trip() {
        let ciphertext = encrypt(&Value::String("p1".into()), DataType::Str, &KEY, "pass:").unwrap();
        assert!(ciphertext.starts_with("ENC[AES256_GCM,data:"));
        assert!(ciphertext.ends_with(",type:str]"));

        let plain = decrypt(&ciphertext, &KEY, "pass:").unwrap();
        assert_eq!(plain.value, Value::String("p1".into()));
        assert_eq!(plain.data_type, DataType::Str);
    }

    #[test]
    fn test_iv_is_32_bytes() {
        let ciphertext = encrypt(&Value::Int(5), DataType::Int, &KEY, "n:").unwrap();
        let parsed = EncryptedValue::parse(&ciphertext).unwrap();
        assert_eq!(parsed.iv.len(), 32);
        assert_eq!(parsed.tag.len(), TAG_LEN);
    }

    #[test]
    fn test_typed_values_round_trip() {
        for (value, data_type) in [
            (Value::Int(-3), DataType::Int),
            (Value::Float(2.5), DataType::Float),
            (Value::Bool(true), DataType::Bool),
            (Value::Bytes(vec![0, 159, 146, 150]), DataType::Bytes),
        ] {
            let ciphertext = encrypt(&value, data_type, &KEY, "k:").unwrap();
            assert_eq!(decrypt(&ciphertext, &KEY, "k:").unwrap().value, value);
        }
    }

    #[test]
    fn test_empty_string_is_never_encrypted() {
        assert_eq!(encrypt(&Value::String(String::new()), DataType::Str, &KEY, "a:").unwrap(), "");
        assert_eq!(decrypt("", &KEY, "a:").unwrap().value, Value::String(String::new()));
    }

    #[test]
    fn test_wrong_aad_fails_authentication() {
        let ciphertext = encrypt(&Value::String("x".into()), DataType::Str, &KEY, "a:").unwrap();
        assert!(matches!(decrypt(&ciphertext, &KEY, "b:"), Err(CipherError::Authentication)));
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let ciphertext = encrypt(&Value::String("x".into()), DataType::Str, &KEY, "a:").unwrap();
        assert!(matches!(decrypt(&ciphertext, &[8u8; 32], "a:"), Err(CipherError::Authentication)));
    }

    #[test]
    fn test_twelve_byte_iv_is_accepted() {
        let cipher = Aes256Gcm::new_from_slice(&KEY).unwrap();
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let mut sealed = cipher
            .encrypt(&nonce, Payload { msg: b"legacy", aad: b"k:" })
            .unwrap();
        let tag = sealed.split_off(sealed.len() - TAG_LEN);
        let envelope = EncryptedValue {
            data: sealed,
            iv: nonce.to_vec(),
            tag,
            data_type: DataType::Str,
        }
        .to_string();

        assert_eq!(decrypt(&envelope, &KEY, "k:").unwrap().value, Value::String("legacy".into()));
    }

    #[test]
    fn test_bool_accepts_reference_spellings() {
        assert_eq!(parse_bool("True"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("yes"), None);
    }

    #[test]
    fn test_malformed_envelope() {
        assert!(matches!(decrypt("plain", &KEY, "a:"), Err(CipherError::Malformed)));
        assert!(matches!(
            decrypt("ENC[AES256_GCM,data:abc,iv:abc,tag:abc,type:nope]", &KEY, "a:"),
            Err(CipherError::InvalidBase64 { .. } | CipherError::UnknownType(_))
        ));
    }
}

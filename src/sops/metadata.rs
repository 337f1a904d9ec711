//! # SOPS Metadata
//!
//! The `sops` block carried by every encrypted document: wrapped data keys
//! per master key, the encrypted MAC and the rules selecting which leaves
//! are encrypted.
//!
//! Deserialization is lenient about scalar types because dotenv documents
//! flatten every metadata value to a string.

use crate::sops::keys::{KeyProvider, MasterKey};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Suffix applied when a document declares no selection rule at all.
pub const DEFAULT_UNENCRYPTED_SUFFIX: &str = "_unencrypted";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub kms: Vec<KmsKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub gcp_kms: Vec<GcpKmsKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub azure_kv: Vec<AzureKvKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub hc_vault: Vec<VaultKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub age: Vec<AgeKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub pgp: Vec<PgpKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub key_groups: Vec<KeyGroup>,
    #[serde(default, deserialize_with = "lenient_u32", skip_serializing_if = "Option::is_none")]
    pub shamir_threshold: Option<u32>,
    #[serde(default)]
    pub lastmodified: String,
    #[serde(default)]
    pub mac: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unencrypted_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unencrypted_regex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_regex: Option<String>,
    #[serde(default, deserialize_with = "lenient_bool", skip_serializing_if = "is_false")]
    pub mac_only_encrypted: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyGroup {
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub kms: Vec<KmsKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub gcp_kms: Vec<GcpKmsKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub azure_kv: Vec<AzureKvKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub hc_vault: Vec<VaultKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub age: Vec<AgeKey>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub pgp: Vec<PgpKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KmsKey {
    pub arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GcpKmsKey {
    pub resource_id: String,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AzureKvKey {
    pub vault_url: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultKey {
    pub vault_address: String,
    pub engine_path: String,
    pub key_name: String,
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeKey {
    pub recipient: String,
    pub enc: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PgpKey {
    #[serde(default)]
    pub created_at: String,
    pub enc: String,
    pub fp: String,
}

impl KeyGroup {
    fn push_master_keys(&self, out: &mut Vec<MasterKey>) {
        out.extend(self.kms.iter().map(|k| MasterKey::new(KeyProvider::Kms, &k.arn, &k.enc)));
        out.extend(
            self.gcp_kms
                .iter()
                .map(|k| MasterKey::new(KeyProvider::GcpKms, &k.resource_id, &k.enc)),
        );
        out.extend(self.azure_kv.iter().map(|k| {
            let id = format!("{}/keys/{}/{}", k.vault_url.trim_end_matches('/'), k.name, k.version);
            MasterKey::new(KeyProvider::AzureKv, &id, &k.enc)
        }));
        out.extend(self.hc_vault.iter().map(|k| {
            let id = format!(
                "{}/v1/{}/keys/{}",
                k.vault_address.trim_end_matches('/'),
                k.engine_path,
                k.key_name
            );
            MasterKey::new(KeyProvider::HcVault, &id, &k.enc)
        }));
        out.extend(self.age.iter().map(|k| MasterKey::new(KeyProvider::Age, &k.recipient, &k.enc)));
        out.extend(self.pgp.iter().map(|k| MasterKey::new(KeyProvider::Pgp, &k.fp, &k.enc)));
    }
}

impl Metadata {
    /// Every wrapped-key entry in the order unwrapping should be attempted:
    /// key groups first, in document order, then the flat provider lists.
    #[must_use]
    pub fn master_keys(&self) -> Vec<MasterKey> {
        let mut keys = Vec::new();
        for group in &self.key_groups {
            group.push_master_keys(&mut keys);
        }
        KeyGroup {
            kms: self.kms.clone(),
            gcp_kms: self.gcp_kms.clone(),
            azure_kv: self.azure_kv.clone(),
            hc_vault: self.hc_vault.clone(),
            age: self.age.clone(),
            pgp: self.pgp.clone(),
        }
        .push_master_keys(&mut keys);
        keys
    }

    /// Compile the leaf selection rules.
    ///
    /// # Errors
    ///
    /// Returns the regex error when `encrypted_regex`/`unencrypted_regex`
    /// does not compile.
    pub fn encryption_rules(&self) -> Result<EncryptionRules, regex::Error> {
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
        let mut rules = EncryptionRules {
            unencrypted_suffix: non_empty(&self.unencrypted_suffix),
            encrypted_suffix: non_empty(&self.encrypted_suffix),
            unencrypted_regex: non_empty(&self.unencrypted_regex).map(|r| Regex::new(&r)).transpose()?,
            encrypted_regex: non_empty(&self.encrypted_regex).map(|r| Regex::new(&r)).transpose()?,
        };
        if rules.is_unset() {
            rules.unencrypted_suffix = Some(DEFAULT_UNENCRYPTED_SUFFIX.to_string());
        }
        Ok(rules)
    }
}

/// Decides per leaf path whether the value is stored encrypted.
#[derive(Debug, Clone, Default)]
pub struct EncryptionRules {
    pub unencrypted_suffix: Option<String>,
    pub encrypted_suffix: Option<String>,
    pub unencrypted_regex: Option<Regex>,
    pub encrypted_regex: Option<Regex>,
}

impl EncryptionRules {
    fn is_unset(&self) -> bool {
        self.unencrypted_suffix.is_none()
            && self.encrypted_suffix.is_none()
            && self.unencrypted_regex.is_none()
            && self.encrypted_regex.is_none()
    }

    /// Whether the leaf at `path` is encrypted. Every path component is
    /// matched, so a rule hit on a parent key covers the whole subtree.
    #[must_use]
    pub fn should_encrypt(&self, path: &[String]) -> bool {
        let mut encrypted = true;
        if let Some(suffix) = &self.unencrypted_suffix {
            if path.iter().any(|k| k.ends_with(suffix.as_str())) {
                encrypted = false;
            }
        }
        if let Some(suffix) = &self.encrypted_suffix {
            encrypted = path.iter().any(|k| k.ends_with(suffix.as_str()));
        }
        if let Some(re) = &self.unencrypted_regex {
            if path.iter().any(|k| re.is_match(k)) {
                encrypted = false;
            }
        }
        if let Some(re) = &self.encrypted_regex {
            encrypted = path.iter().any(|k| re.is_match(k));
        }
        encrypted
    }
}

#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde skip_serializing_if signature")]
fn is_false(value: &bool) -> bool {
    !*value
}

/// `null` and absent lists both mean "no entries".
fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(u64),
    Float(f64),
    Str(String),
}

fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(false),
        Some(Scalar::Bool(b)) => Ok(b),
        Some(Scalar::Int(i)) => Ok(i != 0),
        Some(Scalar::Float(_)) => Err(serde::de::Error::custom("expected a boolean")),
        Some(Scalar::Str(s)) => match s.as_str() {
            "true" | "True" | "TRUE" | "1" => Ok(true),
            "false" | "False" | "FALSE" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("'{other}' is not a boolean"))),
        },
    }
}

fn lenient_u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Option::<Scalar>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Scalar::Int(i)) => u32::try_from(i).map(Some).map_err(serde::de::Error::custom),
        Some(Scalar::Str(s)) if s.is_empty() => Ok(None),
        Some(Scalar::Str(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(Scalar::Bool(_) | Scalar::Float(_)) => Err(serde::de::Error::custom("expected an integer")),
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => String::new(),
        Some(Scalar::Str(s)) => s,
        Some(Scalar::Int(i)) => i.to_string(),
        Some(Scalar::Float(f)) => f.to_string(),
        Some(Scalar::Bool(b)) => b.to_string(),
    })
}

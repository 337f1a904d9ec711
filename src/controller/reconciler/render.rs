//! # Template Rendering
//!
//! Turns one decrypted [`SecretTemplate`] into the desired child `Secret`.
//!
//! The payload is built from `stringData` first; base64-decoded `data`
//! entries are applied afterwards and win on key collision. Everything ends
//! up in `data`, so the desired object compares directly against what the
//! API server returns.

use crate::crd::SecretTemplate;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use thiserror::Error;

pub const SECRET_TYPE_OPAQUE: &str = "Opaque";

/// Secret types accepted verbatim; anything else renders as `Opaque`.
const KNOWN_SECRET_TYPES: [&str; 7] = [
    "kubernetes.io/service-account-token",
    "kubernetes.io/dockercfg",
    "kubernetes.io/dockerconfigjson",
    "kubernetes.io/basic-auth",
    "kubernetes.io/ssh-auth",
    "kubernetes.io/tls",
    "bootstrap.kubernetes.io/token",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("secret template name must be specified and not empty")]
    MissingName,
    #[error("data[{key}] is not a valid base64 string")]
    InvalidBase64 { key: String },
}

/// Map a template type onto the closed set of Kubernetes secret types.
#[must_use]
pub fn secret_type(requested: &str) -> &'static str {
    KNOWN_SECRET_TYPES
        .iter()
        .find(|known| **known == requested)
        .copied()
        .unwrap_or(SECRET_TYPE_OPAQUE)
}

/// Render the desired secret for `template` in `namespace`, without owner references.
///
/// # Errors
///
/// [`RenderError::InvalidBase64`] when a `data` entry does not decode,
/// [`RenderError::MissingName`] when the template has no name.
pub fn render_secret(template: &SecretTemplate, namespace: &str) -> Result<Secret, RenderError> {
    let mut payload: BTreeMap<String, ByteString> = template
        .string_data
        .iter()
        .map(|(key, value)| (key.clone(), ByteString(value.clone().into_bytes())))
        .collect();
    for (key, value) in &template.data {
        let decoded = STANDARD
            .decode(value)
            .map_err(|_| RenderError::InvalidBase64 { key: key.clone() })?;
        payload.insert(key.clone(), ByteString(decoded));
    }

    if template.name.is_empty() {
        return Err(RenderError::MissingName);
    }

    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(template.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(template.labels.clone()),
            annotations: Some(template.annotations.clone()),
            ..ObjectMeta::default()
        },
        type_: Some(secret_type(&template.secret_type).to_string()),
        data: Some(payload),
        ..Secret::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> SecretTemplate {
        SecretTemplate {
            name: "db".to_string(),
            string_data: BTreeMap::from([
                ("user".to_string(), "u1".to_string()),
                ("shared".to_string(), "from-string-data".to_string()),
            ]),
            data: BTreeMap::from([
                ("pass".to_string(), STANDARD.encode("p1")),
                ("shared".to_string(), STANDARD.encode("from-data")),
            ]),
            labels: BTreeMap::from([("app".to_string(), "web".to_string())]),
            ..SecretTemplate::default()
        }
    }

    #[test]
    fn test_data_overwrites_string_data() {
        let secret = render_secret(&template(), "ns").unwrap();
        let data = secret.data.unwrap();
        assert_eq!(data["user"].0, b"u1");
        assert_eq!(data["pass"].0, b"p1");
        assert_eq!(data["shared"].0, b"from-data");
        assert_eq!(secret.metadata.namespace.as_deref(), Some("ns"));
        assert_eq!(secret.metadata.labels.unwrap()["app"], "web");
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let mut template = template();
        template.data.insert("broken".to_string(), "not base64!".to_string());
        assert_eq!(
            render_secret(&template, "ns"),
            Err(RenderError::InvalidBase64 {
                key: "broken".to_string()
            })
        );
    }

    #[test]
    fn test_missing_name_is_rejected() {
        let template = SecretTemplate::default();
        assert_eq!(render_secret(&template, "ns"), Err(RenderError::MissingName));
    }

    #[test]
    fn test_secret_type_table() {
        assert_eq!(secret_type("kubernetes.io/tls"), "kubernetes.io/tls");
        assert_eq!(secret_type("bootstrap.kubernetes.io/token"), "bootstrap.kubernetes.io/token");
        assert_eq!(secret_type(""), "Opaque");
        assert_eq!(secret_type("Kubernetes.io/tls"), "Opaque");
        assert_eq!(secret_type("example.com/custom"), "Opaque");
    }
}

//! # SopsSecret Spec
//!
//! Main CRD specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// SopsSecret Custom Resource Definition
///
/// A set of Kubernetes secret templates whose values are encrypted with
/// SOPS. The operator decrypts the resource and keeps one child `Secret` per
/// template in the resource namespace.
///
/// # Example
///
/// ```yaml
/// apiVersion: isindir.github.com/v1alpha3
/// kind: SopsSecret
/// metadata:
///   name: app
///   namespace: default
/// spec:
///   secretTemplates:
///     - name: db
///       stringData:
///         user: ENC[AES256_GCM,data:...,type:str]
///       data:
///         pass: ENC[AES256_GCM,data:...,type:str]
/// sops:
///   age:
///     - recipient: age1...
///       enc: |
///         -----BEGIN AGE ENCRYPTED FILE-----
///   encrypted_suffix: Templates
///   lastmodified: "2024-01-01T00:00:00Z"
///   mac: ENC[AES256_GCM,data:...,type:str]
///   version: 3.8.1
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "SopsSecret",
    group = "isindir.github.com",
    version = "v1alpha3",
    namespaced,
    status = "crate::crd::SopsSecretStatus",
    shortname = "sops",
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".status.message"}, {"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SopsSecretSpec {
    /// Templates for the Kubernetes secrets to create
    #[serde(alias = "secretsTemplate")]
    pub secret_templates: Vec<SecretTemplate>,
    /// Stop reconciling this resource while true
    #[serde(default)]
    pub suspend: bool,
}

/// Template for one child Kubernetes secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretTemplate {
    /// Name of the Kubernetes secret to create
    pub name: String,
    /// Kubernetes secret type, `Opaque` when empty or unknown
    #[serde(default, rename = "type", skip_serializing_if = "String::is_empty")]
    pub secret_type: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    /// Values stored as-is in the secret
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub string_data: BTreeMap<String, String>,
    /// Base64-encoded values, decoded into the secret; wins over `stringData`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

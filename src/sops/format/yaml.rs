//! YAML documents. `serde_yaml` mappings keep insertion order; comments are
//! not preserved.

use super::json;
use super::METADATA_KEY;
use crate::sops::error::DecryptError;
use crate::sops::tree::{Branch, Item, Value};
use serde_yaml::{Mapping, Number};

const FORMAT: &str = "yaml";

pub(super) fn load(data: &[u8]) -> Result<(Branch, Option<serde_json::Value>), DecryptError> {
    let document: serde_yaml::Value =
        serde_yaml::from_slice(data).map_err(|e| DecryptError::malformed(FORMAT, e))?;
    let serde_yaml::Value::Mapping(mapping) = untag(document) else {
        return Err(DecryptError::malformed(FORMAT, "document root must be a mapping"));
    };

    let mut metadata = None;
    let mut branch = Branch::new();
    for (key, value) in mapping {
        let key = key_to_string(&key);
        if key == METADATA_KEY {
            // Metadata goes through the same serde model as JSON documents.
            metadata = Some(json::to_json(&from_yaml(value)));
        } else {
            branch.push(key, from_yaml(value));
        }
    }
    Ok((branch, metadata))
}

pub(super) fn emit(branch: &Branch, metadata: Option<&serde_json::Value>) -> Result<Vec<u8>, DecryptError> {
    let mut root = branch_to_yaml(branch);
    if let Some(metadata) = metadata {
        let metadata = serde_yaml::to_value(metadata).map_err(|e| DecryptError::malformed(FORMAT, e))?;
        root.insert(serde_yaml::Value::String(METADATA_KEY.to_string()), metadata);
    }
    serde_yaml::to_string(&serde_yaml::Value::Mapping(root))
        .map(String::into_bytes)
        .map_err(|e| DecryptError::malformed(FORMAT, e))
}

fn untag(value: serde_yaml::Value) -> serde_yaml::Value {
    match value {
        serde_yaml::Value::Tagged(tagged) => untag(tagged.value),
        other => other,
    }
}

fn key_to_string(key: &serde_yaml::Value) -> String {
    match key {
        serde_yaml::Value::String(s) => s.clone(),
        serde_yaml::Value::Bool(b) => b.to_string(),
        serde_yaml::Value::Number(n) => n.to_string(),
        serde_yaml::Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn from_yaml(value: serde_yaml::Value) -> Value {
    match untag(value) {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(items) => Value::Sequence(items.into_iter().map(from_yaml).collect()),
        serde_yaml::Value::Mapping(mapping) => {
            let mut branch = Branch::new();
            for (key, value) in mapping {
                branch.push(key_to_string(&key), from_yaml(value));
            }
            Value::Branch(branch)
        }
        serde_yaml::Value::Tagged(tagged) => from_yaml(tagged.value),
    }
}

fn branch_to_yaml(branch: &Branch) -> Mapping {
    let mut mapping = Mapping::new();
    for item in &branch.0 {
        if let Item::Pair(key, value) = item {
            mapping.insert(serde_yaml::Value::String(key.clone()), to_yaml(value));
        }
    }
    mapping
}

fn to_yaml(value: &Value) -> serde_yaml::Value {
    match value {
        Value::Null => serde_yaml::Value::Null,
        Value::Bool(b) => serde_yaml::Value::Bool(*b),
        Value::Int(i) => serde_yaml::Value::Number(Number::from(*i)),
        Value::Float(f) => serde_yaml::Value::Number(Number::from(*f)),
        Value::String(s) => serde_yaml::Value::String(s.clone()),
        Value::Bytes(b) => serde_yaml::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::Branch(branch) => serde_yaml::Value::Mapping(branch_to_yaml(branch)),
        Value::Sequence(items) => serde_yaml::Value::Sequence(items.iter().map(to_yaml).collect()),
    }
}

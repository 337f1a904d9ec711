//! JSON documents, order-preserving through `serde_json`'s `preserve_order`.

use super::METADATA_KEY;
use crate::sops::error::DecryptError;
use crate::sops::tree::{Branch, Item, Value};
use serde_json::{Map, Number};

const FORMAT: &str = "json";

pub(super) fn load(data: &[u8]) -> Result<(Branch, Option<serde_json::Value>), DecryptError> {
    let document: serde_json::Value =
        serde_json::from_slice(data).map_err(|e| DecryptError::malformed(FORMAT, e))?;
    let serde_json::Value::Object(map) = document else {
        return Err(DecryptError::malformed(FORMAT, "document root must be an object"));
    };

    let mut metadata = None;
    let mut branch = Branch::new();
    for (key, value) in map {
        if key == METADATA_KEY {
            metadata = Some(value);
        } else {
            branch.push(key, from_json(value));
        }
    }
    Ok((branch, metadata))
}

pub(super) fn emit(branch: &Branch, metadata: Option<&serde_json::Value>) -> Result<Vec<u8>, DecryptError> {
    let mut root = branch_to_json(branch);
    if let Some(metadata) = metadata {
        root.insert(METADATA_KEY.to_string(), metadata.clone());
    }
    let mut out = serde_json::to_vec_pretty(&serde_json::Value::Object(root))
        .map_err(|e| DecryptError::malformed(FORMAT, e))?;
    out.push(b'\n');
    Ok(out)
}

pub(super) fn from_json(value: serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        // integers beyond i64 become floats and lose precision, as in sops
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::Sequence(items.into_iter().map(from_json).collect()),
        serde_json::Value::Object(map) => {
            let mut branch = Branch::new();
            for (key, value) in map {
                branch.push(key, from_json(value));
            }
            Value::Branch(branch)
        }
    }
}

/// Comments have no JSON representation and are dropped.
pub(super) fn branch_to_json(branch: &Branch) -> Map<String, serde_json::Value> {
    let mut map = Map::new();
    for item in &branch.0 {
        if let Item::Pair(key, value) = item {
            map.insert(key.clone(), to_json(value));
        }
    }
    map
}

pub(super) fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::Number(Number::from(*i)),
        Value::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, serde_json::Value::Number),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(b) => serde_json::Value::String(String::from_utf8_lossy(b).into_owned()),
        Value::Branch(branch) => serde_json::Value::Object(branch_to_json(branch)),
        Value::Sequence(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
    }
}

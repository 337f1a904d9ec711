//! Arbitrary files, stored encrypted as a JSON document whose single `data`
//! leaf holds the whole content.

use super::json;
use crate::sops::error::DecryptError;
use crate::sops::tree::{Branch, Value};

const FORMAT: &str = "binary";
const DATA_KEY: &str = "data";

pub(super) fn load(data: &[u8]) -> Result<(Branch, Option<serde_json::Value>), DecryptError> {
    let (branch, metadata) = json::load(data).map_err(|e| match e {
        DecryptError::MalformedDocument { reason, .. } => DecryptError::malformed(FORMAT, reason),
        other => other,
    })?;
    if branch.get(DATA_KEY).is_none() {
        return Err(DecryptError::malformed(FORMAT, "missing 'data' key"));
    }
    Ok((branch, metadata))
}

pub(super) fn load_plain(data: &[u8]) -> Branch {
    let value = match std::str::from_utf8(data) {
        Ok(text) => Value::String(text.to_string()),
        Err(_) => Value::Bytes(data.to_vec()),
    };
    let mut branch = Branch::new();
    branch.push(DATA_KEY, value);
    branch
}

pub(super) fn emit_plain(branch: &Branch) -> Result<Vec<u8>, DecryptError> {
    match branch.get(DATA_KEY) {
        Some(Value::String(s)) => Ok(s.as_bytes().to_vec()),
        Some(Value::Bytes(b)) => Ok(b.clone()),
        Some(_) => Err(DecryptError::malformed(FORMAT, "'data' is not a string")),
        None => Err(DecryptError::malformed(FORMAT, "missing 'data' key")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_bytes_round_trip() {
        let raw = [0u8, 255, 1, 2];
        let branch = load_plain(&raw);
        assert_eq!(branch.get("data"), Some(&Value::Bytes(raw.to_vec())));
        assert_eq!(emit_plain(&branch).unwrap(), raw);
    }

    #[test]
    fn test_requires_data_key() {
        let err = load(br#"{"other": "x", "sops": {}}"#).unwrap_err();
        assert!(matches!(err, DecryptError::MalformedDocument { format: "binary", .. }));
    }
}

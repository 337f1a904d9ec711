//! Dotenv documents: `KEY=VALUE` and `#comment` lines, with `\n` escaped in
//! values. Metadata is flattened into `sops_` prefixed keys, nested maps and
//! lists being encoded with `__map_` and `__list_N` separators.

use crate::sops::error::DecryptError;
use crate::sops::tree::{Branch, Item, Value};
use serde_json::Map;

const FORMAT: &str = "dotenv";
const METADATA_PREFIX: &str = "sops_";
const MAP_SEPARATOR: &str = "__map_";
const LIST_SEPARATOR: &str = "__list_";

pub(super) fn load(data: &[u8]) -> Result<(Branch, Option<serde_json::Value>), DecryptError> {
    let text = std::str::from_utf8(data).map_err(|e| DecryptError::malformed(FORMAT, e))?;

    let mut branch = Branch::new();
    let mut flattened = Vec::new();
    for (number, line) in text.split('\n').enumerate() {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            branch.0.push(Item::Comment(comment.to_string()));
            continue;
        }
        let (key, value) = line.split_once('=').ok_or_else(|| {
            DecryptError::malformed(FORMAT, format!("line {} is not KEY=VALUE", number + 1))
        })?;
        let value = value.replace("\\n", "\n");
        match key.strip_prefix(METADATA_PREFIX) {
            Some(meta_key) => flattened.push((meta_key.to_string(), value)),
            None => branch.push(key, Value::String(value)),
        }
    }

    let metadata = if flattened.is_empty() {
        None
    } else {
        Some(unflatten(flattened)?)
    };
    Ok((branch, metadata))
}

pub(super) fn emit(branch: &Branch, metadata: Option<&serde_json::Value>) -> Result<Vec<u8>, DecryptError> {
    let mut out = String::new();
    for item in &branch.0 {
        match item {
            Item::Comment(comment) => {
                out.push('#');
                out.push_str(comment);
                out.push('\n');
            }
            Item::Pair(key, value) => {
                let text = scalar_text(value).ok_or_else(|| {
                    DecryptError::malformed(FORMAT, format!("value of '{key}' is not a scalar"))
                })?;
                push_line(&mut out, key, &text);
            }
        }
    }

    if let Some(metadata) = metadata {
        let mut flattened = Vec::new();
        flatten(String::new(), metadata, &mut flattened);
        for (key, text) in flattened {
            push_line(&mut out, &format!("{METADATA_PREFIX}{key}"), &text);
        }
    }
    Ok(out.into_bytes())
}

fn push_line(out: &mut String, key: &str, value: &str) {
    out.push_str(key);
    out.push('=');
    out.push_str(&value.replace('\n', "\\n"));
    out.push('\n');
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Int(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::String(s) => Some(s.clone()),
        Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        Value::Branch(_) | Value::Sequence(_) => None,
    }
}

fn flatten(prefix: String, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, value) in map {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}{MAP_SEPARATOR}{key}")
                };
                flatten(key, value, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, value) in items.iter().enumerate() {
                flatten(format!("{prefix}{LIST_SEPARATOR}{index}"), value, out);
            }
        }
        serde_json::Value::Null => {}
        serde_json::Value::String(s) => out.push((prefix, s.clone())),
        other => out.push((prefix, other.to_string())),
    }
}

enum Segment {
    Key(String),
    Index(usize),
}

fn split_segments(flat: &str) -> Result<Vec<Segment>, DecryptError> {
    let mut segments = Vec::new();
    let (head, mut rest) = match next_separator(flat) {
        Some(pos) => (&flat[..pos], &flat[pos..]),
        None => (flat, ""),
    };
    segments.push(Segment::Key(head.to_string()));

    while !rest.is_empty() {
        let (is_list, body) = if let Some(body) = rest.strip_prefix(MAP_SEPARATOR) {
            (false, body)
        } else if let Some(body) = rest.strip_prefix(LIST_SEPARATOR) {
            (true, body)
        } else {
            return Err(DecryptError::malformed(FORMAT, format!("invalid metadata key 'sops_{flat}'")));
        };
        let end = next_separator(body).unwrap_or(body.len());
        let token = &body[..end];
        rest = &body[end..];
        if is_list {
            let index = token.parse().map_err(|_| {
                DecryptError::malformed(FORMAT, format!("invalid list index in 'sops_{flat}'"))
            })?;
            segments.push(Segment::Index(index));
        } else {
            segments.push(Segment::Key(token.to_string()));
        }
    }
    Ok(segments)
}

fn next_separator(s: &str) -> Option<usize> {
    match (s.find(MAP_SEPARATOR), s.find(LIST_SEPARATOR)) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn unflatten(entries: Vec<(String, String)>) -> Result<serde_json::Value, DecryptError> {
    let mut root = serde_json::Value::Object(Map::new());
    for (key, value) in entries {
        let segments = split_segments(&key)?;
        insert(&mut root, &segments, value)
            .map_err(|reason| DecryptError::malformed(FORMAT, format!("'sops_{key}': {reason}")))?;
    }
    Ok(root)
}

fn insert(node: &mut serde_json::Value, segments: &[Segment], value: String) -> Result<(), &'static str> {
    let Some((first, rest)) = segments.split_first() else {
        *node = serde_json::Value::String(value);
        return Ok(());
    };
    let child = match first {
        Segment::Key(key) => {
            if node.is_null() {
                *node = serde_json::Value::Object(Map::new());
            }
            let map = node.as_object_mut().ok_or("expected a map")?;
            map.entry(key.clone()).or_insert(serde_json::Value::Null)
        }
        Segment::Index(index) => {
            if node.is_null() {
                *node = serde_json::Value::Array(Vec::new());
            }
            let items = node.as_array_mut().ok_or("expected a list")?;
            // list entries are written in order, so an index may only extend the list by one
            if *index == items.len() {
                items.push(serde_json::Value::Null);
            }
            items.get_mut(*index).ok_or("list index is not contiguous")?
        }
    };
    insert(child, rest, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_load_lines_and_comments() {
        let (branch, metadata) = load(b"# database\nUSER=u1\nCERT=line1\\nline2\n\nEMPTY=\n").unwrap();
        assert_eq!(branch.0[0], Item::Comment(" database".to_string()));
        assert_eq!(branch.get("CERT"), Some(&Value::String("line1\nline2".into())));
        assert_eq!(branch.get("EMPTY"), Some(&Value::String(String::new())));
        assert!(metadata.is_none());
    }

    #[test]
    fn test_invalid_line_is_malformed() {
        assert!(matches!(
            load(b"NOT_A_PAIR\n"),
            Err(DecryptError::MalformedDocument { .. })
        ));
    }

    #[test]
    fn test_metadata_flatten_round_trip() {
        let metadata = json!({
            "pgp": [{"fp": "ABC", "enc": "-----BEGIN PGP MESSAGE-----\nxyz\n-----END PGP MESSAGE-----"}],
            "key_groups": [{"age": [{"recipient": "age1", "enc": "a"}, {"recipient": "age2", "enc": "b"}]}],
            "lastmodified": "2024-01-01T00:00:00Z",
            "mac_only_encrypted": true,
            "version": "3.8.1"
        });
        let out = emit(&Branch::new(), Some(&metadata)).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.contains("sops_pgp__list_0__map_fp=ABC\n"));
        assert!(text.contains("sops_key_groups__list_0__map_age__list_1__map_recipient=age2\n"));
        assert!(text.contains("sops_mac_only_encrypted=true\n"));

        let (_, reloaded) = load(&out).unwrap();
        let reloaded = reloaded.unwrap();
        assert_eq!(reloaded["pgp"][0]["enc"], metadata["pgp"][0]["enc"]);
        assert_eq!(reloaded["key_groups"][0]["age"][1]["enc"], "b");
        assert_eq!(reloaded["mac_only_encrypted"], "true");
    }

    #[test]
    fn test_out_of_order_list_index_is_malformed() {
        for doc in [
            &b"a=b\nsops_pgp__list_18446744073709551615__map_fp=x\n"[..],
            b"a=b\nsops_pgp__list_10000000000__map_fp=x\n",
            b"a=b\nsops_pgp__list_0__map_fp=x\nsops_pgp__list_2__map_fp=y\n",
        ] {
            assert!(matches!(load(doc), Err(DecryptError::MalformedDocument { .. })));
        }
    }

    #[test]
    fn test_repeated_list_index_fills_same_entry() {
        let (_, metadata) = load(b"sops_pgp__list_0__map_fp=A\nsops_pgp__list_0__map_enc=e\nsops_pgp__list_1__map_fp=B\n").unwrap();
        let metadata = metadata.unwrap();
        assert_eq!(metadata["pgp"][0], json!({"fp": "A", "enc": "e"}));
        assert_eq!(metadata["pgp"][1]["fp"], "B");
    }

    #[test]
    fn test_nested_values_cannot_be_emitted() {
        let mut branch = Branch::new();
        branch.push("NESTED", Value::Branch(Branch::new()));
        assert!(emit(&branch, None).is_err());
    }
}

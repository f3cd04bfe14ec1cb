//! Tool-call argument history compaction (§4.5 Observe): once a
//! string argument crosses a byte threshold, or looks like binary
//! data, it is replaced with a small `{content_len, content_sha256,
//! content_ref}` record rather than kept inline in `TaskState`.

use sha2::{Digest, Sha256};

const PATH_HINT_KEYS: &[&str] = &["path", "file_path", "output_path", "dest"];

fn looks_binary(text: &str) -> bool {
    let bytes = text.as_bytes();
    if bytes.iter().any(|&b| b == 0) {
        return true;
    }
    let sample_len = bytes.len().min(512);
    let non_printable = bytes[..sample_len]
        .iter()
        .filter(|&&b| b < 0x09 || (b > 0x0d && b < 0x20))
        .count();
    sample_len > 0 && non_printable * 10 > sample_len
}

fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn compact_string(text: &str, path_hint: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "content_len": text.len(),
        "content_sha256": sha256_hex(text),
        "content_ref": path_hint,
    })
}

fn find_path_hint(value: &serde_json::Value) -> Option<String> {
    let obj = value.as_object()?;
    for key in PATH_HINT_KEYS {
        if let Some(path) = obj.get(*key).and_then(|v| v.as_str()) {
            return Some(path.to_string());
        }
    }
    None
}

fn compact_value(
    value: serde_json::Value,
    threshold: usize,
    path_hint: Option<&str>,
) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => {
            if text.len() > threshold || looks_binary(&text) {
                compact_string(&text, path_hint)
            } else {
                serde_json::Value::String(text)
            }
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items
                .into_iter()
                .map(|v| compact_value(v, threshold, path_hint))
                .collect(),
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, compact_value(v, threshold, path_hint)))
                .collect(),
        ),
        other => other,
    }
}

/// Compact oversized or binary-looking string values inside a tool
/// call's arguments, deriving `content_ref` from a sibling path-shaped
/// key when one is present (the common case for file-writing tools).
pub fn compact_arguments(arguments: serde_json::Value, threshold: usize) -> serde_json::Value {
    let path_hint = find_path_hint(&arguments);
    compact_value(arguments, threshold, path_hint.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn small_strings_are_left_alone() {
        let args = json!({"query": "hello"});
        let out = compact_arguments(args.clone(), 256);
        assert_eq!(out, args);
    }

    #[test]
    fn oversized_string_is_replaced_with_summary() {
        let big = "a".repeat(300);
        let args = json!({"content": big});
        let out = compact_arguments(args, 256);
        assert_eq!(out["content"]["content_len"], 300);
        assert!(out["content"]["content_sha256"].is_string());
    }

    #[test]
    fn path_hint_is_attached_as_content_ref() {
        let big = "b".repeat(300);
        let args = json!({"path": "/tmp/out.txt", "content": big});
        let out = compact_arguments(args, 256);
        assert_eq!(out["content"]["content_ref"], "/tmp/out.txt");
    }

    #[test]
    fn binary_looking_short_string_is_still_compacted() {
        let binary: String = (0u8..50).map(|b| b as char).collect();
        let args = json!({"data": binary});
        let out = compact_arguments(args, 256);
        assert!(out["data"]["content_sha256"].is_string());
    }
}

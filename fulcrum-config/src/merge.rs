//! Nullable-pointer partial-override merging (§6 "Config override
//! document"): an overlay composes with a base document field by
//! field. An explicit `null` in the overlay clears any override for
//! that key, letting the base value show through; a missing key
//! leaves the base untouched; any other value replaces (objects
//! merge recursively, everything else replaces wholesale).

use serde_json::Value;

/// Merge `overlay` onto `base` following nullable-pointer semantics.
pub fn merge_overrides(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                match overlay_value {
                    Value::Null => {
                        merged.remove(key);
                    }
                    Value::Object(_) => {
                        let base_value = merged.get(key).cloned().unwrap_or(Value::Null);
                        merged.insert(key.clone(), merge_overrides(&base_value, overlay_value));
                    }
                    other => {
                        merged.insert(key.clone(), other.clone());
                    }
                }
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_field_replaces_base_field() {
        let base = json!({"timeout_ms": 1000, "retries": 3});
        let overlay = json!({"timeout_ms": 2000});
        assert_eq!(
            merge_overrides(&base, &overlay),
            json!({"timeout_ms": 2000, "retries": 3})
        );
    }

    #[test]
    fn explicit_null_clears_override_back_to_base() {
        let base = json!({"timeout_ms": 1000});
        let overlay = json!({"timeout_ms": null});
        assert_eq!(merge_overrides(&base, &overlay), json!({}));
    }

    #[test]
    fn nested_objects_merge_recursively() {
        let base = json!({"model": {"tier": "opus", "max_tokens": 4096}});
        let overlay = json!({"model": {"tier": "sonnet"}});
        assert_eq!(
            merge_overrides(&base, &overlay),
            json!({"model": {"tier": "sonnet", "max_tokens": 4096}})
        );
    }

    #[test]
    fn missing_overlay_key_leaves_base_untouched() {
        let base = json!({"a": 1, "b": 2});
        let overlay = json!({"a": 3});
        assert_eq!(merge_overrides(&base, &overlay), json!({"a": 3, "b": 2}));
    }

    #[test]
    fn scalar_overlay_replaces_object_base_wholesale() {
        let base = json!({"model": {"tier": "opus"}});
        let overlay = json!({"model": "disabled"});
        assert_eq!(merge_overrides(&base, &overlay), json!({"model": "disabled"}));
    }

    #[test]
    fn null_base_with_object_overlay_yields_overlay() {
        let merged = merge_overrides(&Value::Null, &json!({"a": 1}));
        assert_eq!(merged, json!({"a": 1}));
    }
}

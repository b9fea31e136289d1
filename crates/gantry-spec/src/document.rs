//! Generic JSON-compatible document operations.
//!
//! Documents are plain [`serde_json::Value`]s so that new specification
//! fields never require code changes. All operations return new values;
//! inputs are never mutated.

use serde_json::{Map, Value};

/// A specification document (mapping, sequence or scalar).
pub type Document = Value;

/// An empty mapping.
pub fn empty() -> Document {
    Value::Object(Map::new())
}

/// Deep-merge `overlay` onto `base`, returning a new document.
///
/// Mappings merge key by key, recursively. Any other pairing (sequence,
/// scalar, or a mapping meeting a non-mapping) is won by `overlay`.
pub fn deep_merge(base: &Document, overlay: &Document) -> Document {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in overlay_map {
                let next = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), next);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

/// Mappings whose keys are user-chosen names rather than schema fields.
const NAMED_MAPS: &[&str] = &["properties", "definitions"];

/// Recursively drop every mapping key for which `remove` returns true.
///
/// Entries of `properties` and `definitions` mappings are names, so they
/// are kept even when they collide with a removable field; their values
/// are still filtered.
pub fn strip_keys(doc: &Document, remove: &dyn Fn(&str) -> bool) -> Document {
    strip(doc, remove, false)
}

fn strip(doc: &Document, remove: &dyn Fn(&str) -> bool, named: bool) -> Document {
    match doc {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| named || !remove(key))
                .map(|(key, value)| {
                    let named_map = !named && NAMED_MAPS.contains(&key.as_str()) && value.is_object();
                    (key.clone(), strip(value, remove, named_map))
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| strip(v, remove, false)).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mappings_merge_key_wise() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let overlay = json!({"b": 2, "nested": {"y": 3, "z": 4}});
        assert_eq!(
            deep_merge(&base, &overlay),
            json!({"a": 1, "b": 2, "nested": {"x": 1, "y": 3, "z": 4}})
        );
    }

    #[test]
    fn sequences_and_scalars_are_replaced() {
        let base = json!({"tags": ["a", "b"], "title": "old"});
        let overlay = json!({"tags": ["c"], "title": "new"});
        assert_eq!(
            deep_merge(&base, &overlay),
            json!({"tags": ["c"], "title": "new"})
        );
    }

    #[test]
    fn mapping_replaced_by_scalar() {
        let base = json!({"cors": {"origin": "*"}});
        let overlay = json!({"cors": false});
        assert_eq!(deep_merge(&base, &overlay), json!({"cors": false}));
    }

    #[test]
    fn merge_leaves_inputs_untouched() {
        let base = json!({"a": {"b": 1}});
        let overlay = json!({"a": {"c": 2}});
        let _ = deep_merge(&base, &overlay);
        assert_eq!(base, json!({"a": {"b": 1}}));
        assert_eq!(overlay, json!({"a": {"c": 2}}));
    }

    #[test]
    fn strip_keys_recurses_into_arrays() {
        let doc = json!({
            "x-secret": 1,
            "parameters": [{"name": "id", "x-secret": true}],
            "keep": {"x-secret": {}, "y": 1}
        });
        let stripped = strip_keys(&doc, &|k: &str| k == "x-secret");
        assert_eq!(
            stripped,
            json!({"parameters": [{"name": "id"}], "keep": {"y": 1}})
        );
    }

    #[test]
    fn strip_keys_keeps_named_schema_entries() {
        let doc = json!({
            "definitions": {
                "x-secret": {"type": "object", "x-secret": 1},
                "User": {"properties": {"x-secret": {"type": "string", "x-secret": 2}}}
            }
        });
        let stripped = strip_keys(&doc, &|k: &str| k == "x-secret");
        assert_eq!(
            stripped,
            json!({
                "definitions": {
                    "x-secret": {"type": "object"},
                    "User": {"properties": {"x-secret": {"type": "string"}}}
                }
            })
        );
    }
}

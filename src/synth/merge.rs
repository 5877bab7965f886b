//! Deep merge of overlay documents onto a base document.

use serde_json::{Map, Value};

/// Merge `overlay` onto `base`, returning a new mapping.
///
/// - mapping + mapping: merged recursively
/// - sequence + sequence: overlay items first, then base items
/// - anything else: the overlay value replaces the base value
///
/// Base-only keys keep their position; overlay-only keys are appended.
pub fn deep_merge(base: &Map<String, Value>, overlay: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = base.clone();
    for (key, incoming) in overlay {
        let value = match (merged.get(key), incoming) {
            (Some(Value::Object(current)), Value::Object(incoming)) => {
                Value::Object(deep_merge(current, incoming))
            }
            (Some(Value::Array(current)), Value::Array(incoming)) => {
                Value::Array(incoming.iter().chain(current.iter()).cloned().collect())
            }
            _ => incoming.clone(),
        };
        merged.insert(key.clone(), value);
    }
    merged
}

/// Apply overlays left to right.
pub fn merge_all<'a, I>(base: Map<String, Value>, overlays: I) -> Map<String, Value>
where
    I: IntoIterator<Item = &'a Map<String, Value>>,
{
    overlays
        .into_iter()
        .fold(base, |acc, overlay| deep_merge(&acc, overlay))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(m) => m,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn documented_example() {
        let base = map(json!({"a": [1, 2], "b": {"x": 1}}));
        let overlay = map(json!({"a": [3], "b": {"y": 2}, "c": 5}));
        assert_eq!(
            Value::Object(deep_merge(&base, &overlay)),
            json!({"a": [3, 1, 2], "b": {"x": 1, "y": 2}, "c": 5})
        );
    }

    #[test]
    fn empty_overlay_is_identity() {
        let base = map(json!({"a": [1], "b": {"c": {"d": null}}, "e": "f"}));
        assert_eq!(deep_merge(&base, &Map::new()), base);
        assert_eq!(merge_all(base.clone(), []), base);
    }

    #[test]
    fn scalar_replaces_mapping_and_back() {
        let base = map(json!({"dns": {"enable": true}, "mode": "rule"}));
        let overlay = map(json!({"dns": false, "mode": {"nested": 1}}));
        assert_eq!(
            Value::Object(deep_merge(&base, &overlay)),
            json!({"dns": false, "mode": {"nested": 1}})
        );
    }

    #[test]
    fn sequence_replaces_scalar_without_concat() {
        let base = map(json!({"rules": "none"}));
        let overlay = map(json!({"rules": ["MATCH,Final"]}));
        assert_eq!(deep_merge(&base, &overlay)["rules"], json!(["MATCH,Final"]));
    }

    #[test]
    fn null_overlay_value_replaces() {
        let base = map(json!({"a": 1}));
        let overlay = map(json!({"a": null}));
        assert_eq!(deep_merge(&base, &overlay)["a"], Value::Null);
    }

    #[test]
    fn duplicates_are_kept() {
        let base = map(json!({"a": ["x", "y"]}));
        let overlay = map(json!({"a": ["y"]}));
        assert_eq!(deep_merge(&base, &overlay)["a"], json!(["y", "x", "y"]));
    }

    #[test]
    fn inputs_are_not_mutated() {
        let base = map(json!({"a": [1], "b": {"x": 1}}));
        let overlay = map(json!({"a": [2], "b": {"y": 2}}));
        let base_before = base.clone();
        let overlay_before = overlay.clone();
        let _ = deep_merge(&base, &overlay);
        assert_eq!(base, base_before);
        assert_eq!(overlay, overlay_before);
    }

    #[test]
    fn key_order_base_first_then_new_keys() {
        let base = map(json!({"mixed-port": 7890, "mode": "rule"}));
        let overlay = map(json!({"tun": {"enable": true}, "mixed-port": 7891}));
        let merged = deep_merge(&base, &overlay);
        let keys: Vec<_> = merged.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["mixed-port", "mode", "tun"]);
        assert_eq!(merged["mixed-port"], 7891);
    }

    #[test]
    fn overlays_apply_in_order() {
        let base = map(json!({"rules": ["MATCH,Final"]}));
        let first = map(json!({"rules": ["DOMAIN,a.com,DIRECT"]}));
        let second = map(json!({"rules": ["DOMAIN,b.com,Proxies"]}));
        let merged = merge_all(base, [&first, &second]);
        assert_eq!(
            merged["rules"],
            json!(["DOMAIN,b.com,Proxies", "DOMAIN,a.com,DIRECT", "MATCH,Final"])
        );
    }
}

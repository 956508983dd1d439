//! The semantic value shared by every backend.
//!
//! Documents keep their own formatting; what crosses the API is a plain
//! `serde_json::Value` (insertion ordered) so merge logic never sees
//! comments, quoting or anchors.

pub use serde_json::{Map, Value};

/// Wrap `value` in one mapping level per key, innermost last.
pub fn nest(keys: &[String], value: Value) -> Value {
    keys.iter().rev().fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key.clone(), inner);
        Value::Object(map)
    })
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}

/// Walk plain keys through nested mappings.
pub fn lookup<'v>(value: &'v Value, keys: &[String]) -> Option<&'v Value> {
    keys.iter().try_fold(value, |node, key| node.as_object()?.get(key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nest_builds_inside_out() {
        let keys = vec!["a".to_string(), "b".to_string()];
        assert_eq!(nest(&keys, json!(1)), json!({"a": {"b": 1}}));
        assert_eq!(nest(&[], json!(1)), json!(1));
    }

    #[test]
    fn lookup_stops_at_scalars() {
        let v = json!({"a": {"b": 1}});
        assert_eq!(lookup(&v, &["a".into(), "b".into()]), Some(&json!(1)));
        assert_eq!(lookup(&v, &["a".into(), "b".into(), "c".into()]), None);
    }
}

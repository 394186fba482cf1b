//! Dot-separated field paths (`address.city`).

use serde_json::{Map, Value};

/// Resolve a dot path. `None` when any segment is missing or a non-object
/// is traversed.
pub fn get_path<'a>(doc: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Set a value at a dot path, creating or overwriting intermediate objects.
pub fn set_path(doc: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            doc.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = doc
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(map) = child {
                set_path(map, rest, value);
            }
        }
    }
}

/// Remove the value at a dot path, returning it if it existed.
pub fn remove_path(doc: &mut Map<String, Value>, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => doc.shift_remove(path),
        Some((head, rest)) => match doc.get_mut(head) {
            Some(Value::Object(map)) => remove_path(map, rest),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_get_nested() {
        let d = doc(json!({"address": {"city": "Oslo"}, "n": 1}));
        assert_eq!(get_path(&d, "address.city"), Some(&json!("Oslo")));
        assert_eq!(get_path(&d, "n"), Some(&json!(1)));
        assert_eq!(get_path(&d, "address.zip"), None);
        assert_eq!(get_path(&d, "n.deeper"), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut d = doc(json!({"a": 5}));
        set_path(&mut d, "a.b.c", json!(true));
        set_path(&mut d, "x", json!("y"));
        assert_eq!(Value::Object(d), json!({"a": {"b": {"c": true}}, "x": "y"}));
    }

    #[test]
    fn test_remove_nested() {
        let mut d = doc(json!({"a": {"b": 1, "c": 2}}));
        assert_eq!(remove_path(&mut d, "a.b"), Some(json!(1)));
        assert_eq!(remove_path(&mut d, "a.zzz"), None);
        assert_eq!(Value::Object(d), json!({"a": {"c": 2}}));
    }
}

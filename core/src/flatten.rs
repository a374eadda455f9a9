//! Dot-delimited flattening of JSON objects.
//!
//! Non-empty objects are walked; arrays, empty objects and scalars are leaves.
use serde_json::{Map, Value};

pub const DELIMITER: char = '.';

/// Segment that is never materialized by [`unflatten`]
const PROTO_SEGMENT: &str = "__proto__";

pub fn flatten(object: &Map<String, Value>) -> Map<String, Value> {
    let mut output = Map::new();
    step(object, None, &mut output);
    output
}

fn step(object: &Map<String, Value>, prefix: Option<&str>, output: &mut Map<String, Value>) {
    for (key, value) in object {
        let path = match prefix {
            Some(prefix) => format!("{prefix}{DELIMITER}{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(child) if !child.is_empty() => step(child, Some(&path), output),
            _ => {
                output.insert(path, value.clone());
            }
        }
    }
}

/// Rebuild nesting from flattened keys. Keys containing a `__proto__` segment
/// are dropped, and a scalar already placed on a path is never replaced by an
/// object.
pub fn unflatten(flat: &Map<String, Value>) -> Map<String, Value> {
    let mut result = Map::new();
    for (key, value) in flat {
        let segments: Vec<&str> = key.split(DELIMITER).collect();
        if segments.iter().any(|s| *s == PROTO_SEGMENT) {
            continue;
        }
        insert_path(&mut result, &segments, value.clone());
    }
    result
}

fn insert_path(target: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert((*last).to_string(), value);
        }
        [head, rest @ ..] => {
            let entry = target
                .entry((*head).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = entry {
                insert_path(child, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn nested_keys_are_joined() {
        let flat = flatten(&obj(json!({
            "uuid": "u1",
            "host": { "hostname": "h", "buildInfo": { "version": "10.0" } },
            "variables": [{ "name": "env" }],
            "extra": {},
        })));

        assert_eq!(flat["uuid"], json!("u1"));
        assert_eq!(flat["host.hostname"], json!("h"));
        assert_eq!(flat["host.buildInfo.version"], json!("10.0"));
        assert_eq!(flat["variables"], json!([{ "name": "env" }]));
        assert_eq!(flat["extra"], json!({}));
        assert_eq!(flat.len(), 5);
    }

    #[test]
    fn unflatten_recovers_nested_object() {
        let original = obj(json!({
            "type": "start",
            "timeRange": { "from": 1, "to": 2, "raw": { "from": "now-1h", "to": "now" } },
            "user": { "login": "admin", "orgId": 1 },
            "variables": [],
        }));
        assert_eq!(unflatten(&flatten(&original)), original);
    }

    #[test]
    fn proto_segments_are_ignored() {
        let flat = obj(json!({
            "__proto__.polluted": true,
            "a.__proto__.b": 1,
            "a.c": 2,
        }));
        let nested = unflatten(&flat);
        assert_eq!(Value::Object(nested), json!({ "a": { "c": 2 } }));
    }

    #[test]
    fn scalar_is_not_replaced_by_object() {
        let flat = obj(json!({ "a": 1, "a.b": 2 }));
        assert_eq!(Value::Object(unflatten(&flat)), json!({ "a": 1 }));
    }
}

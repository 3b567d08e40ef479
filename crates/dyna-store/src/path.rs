//! Dot-path addressing over the state tree
//!
//! Paths like `"profile.user.email"` are resolved by splitting on `.` and
//! walking nested JSON objects. Writes create intermediate objects as
//! needed; a write of `None` removes the leaf.

use serde_json::{Map, Value};

/// Resolve a dot-path against a value tree
///
/// Returns `None` when any intermediate segment is missing or not an
/// object.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a value at a dot-path, creating intermediate objects
///
/// A `value` of `None` removes the leaf entry. A non-object node found on
/// the way (including a non-object root) is replaced by an object so the
/// walk can continue.
pub fn set_path(root: &mut Value, path: &str, value: Option<Value>) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("just coerced to object");
        if i == segments.len() - 1 {
            match value {
                Some(v) => {
                    map.insert((*segment).to_string(), v);
                }
                None => {
                    map.remove(*segment);
                }
            }
            return;
        }
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Shallow-merge a patch onto a base value
///
/// Merge is only meaningful for object-shaped state: a non-object (or
/// absent) base is treated as an empty object, and non-object patches
/// contribute nothing.
pub fn merge_objects(base: Option<&Value>, patch: &Value) -> Value {
    let mut merged = match base.and_then(Value::as_object) {
        Some(map) => map.clone(),
        None => Map::new(),
    };
    if let Some(patch_map) = patch.as_object() {
        for (key, value) in patch_map {
            merged.insert(key.clone(), value.clone());
        }
    }
    Value::Object(merged)
}

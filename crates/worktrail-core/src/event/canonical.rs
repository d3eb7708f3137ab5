//! Canonical JSON for deterministic entry hashing.
//!
//! The same logical metadata payload must always hash to the same bytes, so
//! audit entries are serialized as compact JSON with object keys sorted
//! lexicographically at every nesting level. Array order is preserved.

use serde_json::Value;

/// Produce a canonical JSON string from a [`serde_json::Value`].
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use worktrail_core::event::canonical::canonicalize_json;
///
/// let val = json!({"reason": "scope cut", "delay_days": 4});
/// assert_eq!(canonicalize_json(&val), r#"{"delay_days":4,"reason":"scope cut"}"#);
/// ```
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(true) => buf.push_str("true"),
        Value::Bool(false) => buf.push_str("false"),
        Value::Number(n) => buf.push_str(&n.to_string()),
        Value::String(s) => push_escaped(s, buf),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(key, _)| *key);

            buf.push('{');
            for (i, (key, val)) in entries.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                push_escaped(key, buf);
                buf.push(':');
                write_canonical(val, buf);
            }
            buf.push('}');
        }
    }
}

fn push_escaped(s: &str, buf: &mut String) {
    // serde_json's escaping of a bare string cannot fail.
    match serde_json::to_string(s) {
        Ok(escaped) => buf.push_str(&escaped),
        Err(_) => buf.push_str("\"\""),
    }
}

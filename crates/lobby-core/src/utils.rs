//! JSON value helpers: kind inspection and dot-notation paths.
//!
//! User and room data are free-form JSON objects. Clients address nested
//! entries with dot-separated keys such as `"user.profile.colour"`; numeric
//! segments index into arrays when reading.

use serde_json::{Map, Value};

/// Name of the JSON kind of `value`.
pub fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Whether `value` is of the named kind (case-insensitive).
///
/// Accepts `integer`/`float` as aliases of `number` and `bool` of `boolean`.
pub fn is_kind(value: &Value, kind: &str) -> bool {
    let kind = kind.to_ascii_lowercase();
    match kind.as_str() {
        "integer" => value.is_i64() || value.is_u64(),
        "float" | "number" => value.is_number(),
        "bool" => value.is_boolean(),
        other => value_kind(value) == other,
    }
}

/// Read the value at a dot-separated `key`.
pub fn get_path<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    key.split('.').try_fold(root, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Whether a value exists at `key`.
pub fn has_path(root: &Value, key: &str) -> bool {
    get_path(root, key).is_some()
}

/// Write `value` at a dot-separated `key`, creating intermediate objects.
///
/// Intermediates that are not objects are replaced by empty objects. Returns
/// `false` when `root` is not an object or `key` is empty.
pub fn set_path(root: &mut Value, key: &str, value: Value) -> bool {
    let Value::Object(map) = root else {
        return false;
    };
    if key.is_empty() {
        return false;
    }
    let mut segments: Vec<&str> = key.split('.').collect();
    let Some(last) = segments.pop() else {
        return false;
    };

    let mut node: &mut Map<String, Value> = map;
    for segment in segments {
        let entry = node
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return false;
        };
        node = next;
    }
    let _ = node.insert(last.to_owned(), value);
    true
}

/// Substitute `{0}`, `{1}`, ... in `template` with positional `args`.
///
/// Placeholders with no matching argument are left intact.
pub fn format_placeholders(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let replaced = tail.find('}').and_then(|close| {
            let index = tail[1..close].parse::<usize>().ok()?;
            args.get(index).map(|arg| (arg, close))
        });
        match replaced {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Deterministic component keys
//!
//! Parameters are rendered as JSON with object keys sorted at every depth,
//! so two parameter sets that differ only in construction order hash to the
//! same key.

use serde_json::Value;

/// Key for a `(kind, params)` pair: 32 hex chars of BLAKE3
pub fn component_key(kind: &str, params: &Value) -> String {
    let mut canonical = String::with_capacity(kind.len() + 64);
    canonical.push_str(&Value::String(kind.to_string()).to_string());
    canonical.push(':');
    write_canonical(params, &mut canonical);

    let hash = blake3::hash(canonical.as_bytes());
    hash.to_hex()[..32].to_string()
}

/// Canonical JSON rendering of `value`
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

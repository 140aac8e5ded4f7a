//! Canonical JSON emitter.
//!
//! Same logical content as the YAML form: sorted object keys, the same
//! null-elision discipline, one trailing newline. Numbers print in their
//! shortest round-trip form.

use serde_yaml::Value;

use crate::errors::ConvertResult;
use crate::value::{untag, yaml_to_json};

use super::{canonicalize, SerializeOptions};

/// Serialize a tree to indented canonical JSON.
pub fn to_json_bytes(v: &Value, opts: &SerializeOptions) -> ConvertResult<Vec<u8>> {
    let json = match canonicalize(v) {
        None => {
            if untag(v).is_mapping() {
                serde_json::Value::Object(serde_json::Map::new())
            } else {
                serde_json::Value::Null
            }
        }
        Some(c) => yaml_to_json(&c)?,
    };
    let mut out = String::new();
    emit(&mut out, &json, 0, opts.indent);
    out.push('\n');
    Ok(out.into_bytes())
}

/// Compact canonical JSON, used for inline defaults.
pub fn to_compact_json_string(v: &serde_json::Value) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "null".to_string())
}

fn emit(out: &mut String, v: &serde_json::Value, col: usize, indent: usize) {
    match v {
        serde_json::Value::Null => out.push_str("null"),
        serde_json::Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        serde_json::Value::Number(n) => out.push_str(&n.to_string()),
        serde_json::Value::String(s) => out.push_str(&quote(s)),
        serde_json::Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
                return;
            }
            out.push_str("[\n");
            let inner = " ".repeat(col + indent);
            for (i, item) in items.iter().enumerate() {
                out.push_str(&inner);
                emit(out, item, col + indent, indent);
                if i + 1 < items.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&" ".repeat(col));
            out.push(']');
        }
        serde_json::Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
                return;
            }
            out.push_str("{\n");
            let inner = " ".repeat(col + indent);
            // serde_json's default map is ordered by key, which matches the
            // canonical code-point ordering.
            for (i, (k, val)) in map.iter().enumerate() {
                out.push_str(&inner);
                out.push_str(&quote(k));
                out.push_str(": ");
                emit(out, val, col + indent, indent);
                if i + 1 < map.len() {
                    out.push(',');
                }
                out.push('\n');
            }
            out.push_str(&" ".repeat(col));
            out.push('}');
        }
    }
}

fn quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

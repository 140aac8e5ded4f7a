//! Block-structured YAML emitter.
//!
//! Hand-written so the output is canonical: sorted keys, stable quoting,
//! exactly one trailing newline, and optional annotation comments that
//! never alter parse semantics. Default serde formatting is not canonical
//! and is never used for output bytes.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::errors::ConvertResult;
use crate::value::{key_to_string, untag};

use super::{canonicalize, expression_inner, SerializeOptions};

static STATUS_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]+)\.status\.").unwrap());
static METADATA_REF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z0-9_-]+)\.metadata\.").unwrap());

/// Serialize a tree to canonical block YAML.
pub fn to_yaml_bytes(v: &Value, opts: &SerializeOptions) -> ConvertResult<Vec<u8>> {
    let mut out = String::new();
    match canonicalize(v) {
        None => {
            if untag(v).is_mapping() {
                out.push_str("{}\n");
            } else {
                out.push_str("null\n");
            }
        }
        Some(Value::Mapping(m)) => emit_mapping(&mut out, &m, 0, opts),
        Some(Value::Sequence(s)) => {
            if s.is_empty() {
                out.push_str("[]\n");
            } else {
                emit_sequence(&mut out, &s, 0, opts);
            }
        }
        Some(scalar) => {
            out.push_str(&scalar_repr(&scalar));
            out.push('\n');
        }
    }
    Ok(out.into_bytes())
}

fn emit_mapping(out: &mut String, m: &Mapping, col: usize, opts: &SerializeOptions) {
    let pad = " ".repeat(col);
    for (k, v) in m {
        if opts.annotate_expressions {
            if let Value::String(s) = v {
                if let Some(text) = annotation_for(s) {
                    out.push_str(&pad);
                    out.push_str("# ");
                    out.push_str(&text);
                    out.push('\n');
                }
            }
        }
        let key = quote_scalar(&key_to_string(k));
        match v {
            Value::Mapping(child) => {
                out.push_str(&pad);
                out.push_str(&key);
                out.push_str(":\n");
                emit_mapping(out, child, col + opts.indent, opts);
            }
            Value::Sequence(child) if child.is_empty() => {
                out.push_str(&pad);
                out.push_str(&key);
                out.push_str(": []\n");
            }
            Value::Sequence(child) => {
                out.push_str(&pad);
                out.push_str(&key);
                out.push_str(":\n");
                emit_sequence(out, child, col + opts.indent, opts);
            }
            scalar => {
                out.push_str(&pad);
                out.push_str(&key);
                out.push_str(": ");
                out.push_str(&scalar_repr(scalar));
                out.push('\n');
            }
        }
    }
}

fn emit_sequence(out: &mut String, seq: &[Value], col: usize, opts: &SerializeOptions) {
    let pad = " ".repeat(col);
    for item in seq {
        match item {
            Value::Mapping(child) => {
                let mut sub = String::new();
                emit_mapping(&mut sub, child, col + 2, opts);
                splice_dash(out, &sub, col);
            }
            Value::Sequence(child) if child.is_empty() => {
                out.push_str(&pad);
                out.push_str("- []\n");
            }
            Value::Sequence(child) => {
                let mut sub = String::new();
                emit_sequence(&mut sub, child, col + 2, opts);
                splice_dash(out, &sub, col);
            }
            scalar => {
                out.push_str(&pad);
                out.push_str("- ");
                out.push_str(&scalar_repr(scalar));
                out.push('\n');
            }
        }
    }
}

/// Attach a `- ` marker to the first non-comment line of a rendered block.
///
/// The block was rendered two columns deeper than the marker, so the first
/// entry lands inline after the dash and subsequent entries stay aligned.
fn splice_dash(out: &mut String, sub: &str, col: usize) {
    let mut spliced = false;
    for line in sub.lines() {
        if !spliced && !line.trim_start().starts_with('#') {
            out.push_str(&" ".repeat(col));
            out.push_str("- ");
            out.push_str(&line[(col + 2).min(line.len())..]);
            spliced = true;
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
}

/// Classify a single-expression string for annotation.
fn annotation_for(s: &str) -> Option<String> {
    let inner = expression_inner(s)?;
    if let Some(field) = inner.strip_prefix("schema.spec.") {
        return Some(format!("From parameters: .{field}"));
    }
    if inner == "self" || inner.starts_with("self.") {
        return Some("Readiness/status self-reference".to_string());
    }
    if let Some(caps) = STATUS_REF.captures(inner) {
        return Some(format!("Status from resource: {}", &caps[1]));
    }
    if let Some(caps) = METADATA_REF.captures(inner) {
        return Some(format!("Reference to resource: {}", &caps[1]));
    }
    None
}

fn scalar_repr(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote_scalar(s),
        // Canonicalized trees never reach here with a collection.
        _ => "null".to_string(),
    }
}

/// Quote a string only when emitting it plain would change its parse.
///
/// The check reparses the candidate: if YAML would read the bare text back
/// as anything but the identical string (a number, a bool, a nested
/// structure, a truncating comment), it gets double-quoted.
fn quote_scalar(s: &str) -> String {
    if needs_quote(s) {
        double_quote(s)
    } else {
        s.to_string()
    }
}

fn needs_quote(s: &str) -> bool {
    if s.is_empty() || s != s.trim() {
        return true;
    }
    if s.chars().any(|c| c.is_control()) {
        return true;
    }
    match serde_yaml::from_str::<Value>(s) {
        Ok(Value::String(parsed)) => parsed != s,
        _ => true,
    }
}

fn double_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

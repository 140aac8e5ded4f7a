//! Schema extraction from the merged values tree.
//!
//! Flattens the parameter tree into typed leaf fields. By default only
//! paths actually reached by inference make it into the schema; callers
//! can widen that to every leaf, and per-path overrides win over anything
//! inferred.

use std::collections::BTreeSet;

use serde_yaml::Value;

use crate::serialize::to_compact_json_string;
use crate::value::{key_to_string, scalar_to_string, untag, yaml_to_json};

/// Field types the schema language understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl SchemaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            "object" => Some(Self::Object),
            "array" => Some(Self::Array),
            _ => None,
        }
    }
}

/// One emitted schema field.
#[derive(Debug, Clone)]
pub struct SchemaField {
    pub name: String,
    /// Dot-path into the parameter tree.
    pub path: String,
    pub field_type: SchemaType,
    /// Pre-quoted default: strings double-quoted, everything else bare.
    pub default: Option<String>,
    pub description: Option<String>,
}

impl SchemaField {
    /// Render the `type | default=…` form used in the output document.
    pub fn render(&self) -> String {
        match &self.default {
            Some(d) => format!("{} | default={}", self.field_type.as_str(), d),
            None => self.field_type.as_str().to_string(),
        }
    }
}

/// Extraction options.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Emit every leaf instead of only referenced paths.
    pub include_all: bool,
    /// Join path segments into one camel-case name instead of nesting.
    pub flat_names: bool,
}

/// A per-path user override applied after extraction.
#[derive(Debug, Clone, Default)]
pub struct SchemaOverride {
    pub field_type: Option<SchemaType>,
    pub default: Option<String>,
    pub description: Option<String>,
}

/// Flatten the parameter tree into schema fields.
///
/// Never fails: an empty tree yields an empty field list. Output is
/// path-ascending (segment by segment).
pub fn extract_schema(
    values: &Value,
    referenced: Option<&BTreeSet<String>>,
    supplemental: Option<&serde_json::Value>,
    opts: &ExtractOptions,
) -> Vec<SchemaField> {
    let mut fields = Vec::new();
    let mut segs: Vec<String> = Vec::new();
    if let Some(map) = untag(values).as_mapping() {
        for (k, child) in map {
            segs.push(key_to_string(k));
            visit(child, &mut segs, referenced, supplemental, opts, &mut fields);
            segs.pop();
        }
    }
    fields.sort_by(|a, b| {
        let sa: Vec<&str> = a.path.split('.').collect();
        let sb: Vec<&str> = b.path.split('.').collect();
        sa.cmp(&sb)
    });
    fields
}

fn visit(
    v: &Value,
    segs: &mut Vec<String>,
    referenced: Option<&BTreeSet<String>>,
    supplemental: Option<&serde_json::Value>,
    opts: &ExtractOptions,
    fields: &mut Vec<SchemaField>,
) {
    let v = untag(v);
    match v {
        Value::Mapping(map) if !map.is_empty() => {
            let before = fields.len();
            for (k, child) in map {
                segs.push(key_to_string(k));
                visit(child, segs, referenced, supplemental, opts, fields);
                segs.pop();
            }
            // An object-valued path with no scalar children still gets a
            // field when it covers a referenced subtree.
            if fields.len() == before && covers_referenced(segs, referenced, opts) {
                fields.push(make_field(v, segs, supplemental, opts));
            }
        }
        Value::Mapping(_) => {
            if covers_referenced(segs, referenced, opts) {
                fields.push(make_field(v, segs, supplemental, opts));
            }
        }
        // Sequences are leaves: their elements are never addressed
        // individually by inference.
        _ => {
            if is_included(segs, referenced, opts) {
                fields.push(make_field(v, segs, supplemental, opts));
            }
        }
    }
}

fn dot_path(segs: &[String]) -> String {
    segs.join(".")
}

/// A leaf is included when its path, or any ancestor of it, is referenced.
fn is_included(segs: &[String], referenced: Option<&BTreeSet<String>>, opts: &ExtractOptions) -> bool {
    if opts.include_all {
        return true;
    }
    let Some(referenced) = referenced else {
        return false;
    };
    let path = dot_path(segs);
    if referenced.contains(&path) {
        return true;
    }
    let mut prefix = String::new();
    for seg in &segs[..segs.len().saturating_sub(1)] {
        if !prefix.is_empty() {
            prefix.push('.');
        }
        prefix.push_str(seg);
        if referenced.contains(&prefix) {
            return true;
        }
    }
    false
}

/// An object path covers a referenced subtree when it is itself referenced
/// (directly or via an ancestor) or some referenced path lies beneath it.
fn covers_referenced(
    segs: &[String],
    referenced: Option<&BTreeSet<String>>,
    opts: &ExtractOptions,
) -> bool {
    if is_included(segs, referenced, opts) {
        return true;
    }
    let Some(referenced) = referenced else {
        return false;
    };
    let below = format!("{}.", dot_path(segs));
    referenced.iter().any(|r| r.starts_with(&below))
}

fn make_field(
    v: &Value,
    segs: &[String],
    supplemental: Option<&serde_json::Value>,
    opts: &ExtractOptions,
) -> SchemaField {
    let path = dot_path(segs);
    let supp = supplemental.and_then(|s| lookup_supplemental(s, segs));

    let field_type = supp
        .and_then(|s| s.get("type"))
        .and_then(|t| t.as_str())
        .and_then(SchemaType::parse)
        .unwrap_or_else(|| runtime_type(v));

    let description = supp
        .and_then(|s| s.get("description"))
        .and_then(|d| d.as_str())
        .map(|d| d.to_string());

    SchemaField {
        name: shape_name(segs, opts),
        path,
        field_type,
        default: render_default(v),
        description,
    }
}

fn runtime_type(v: &Value) -> SchemaType {
    match untag(v) {
        Value::Bool(_) => SchemaType::Boolean,
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                SchemaType::Integer
            } else {
                SchemaType::Number
            }
        }
        Value::Sequence(_) => SchemaType::Array,
        Value::Mapping(_) => SchemaType::Object,
        _ => SchemaType::String,
    }
}

/// Stringify the leaf's current value as the schema default.
fn render_default(v: &Value) -> Option<String> {
    match untag(v) {
        Value::Null => None,
        Value::String(s) => Some(format!("{s:?}")),
        Value::Bool(_) | Value::Number(_) => scalar_to_string(v),
        other => yaml_to_json(other).ok().map(|j| to_compact_json_string(&j)),
    }
}

/// Camel-join a dot-path into its flat field name.
pub fn flat_name(path: &str) -> String {
    let segs: Vec<String> = path.split('.').map(|s| s.to_string()).collect();
    shape_name(
        &segs,
        &ExtractOptions {
            include_all: false,
            flat_names: true,
        },
    )
}

fn shape_name(segs: &[String], opts: &ExtractOptions) -> String {
    if !opts.flat_names {
        return segs.last().cloned().unwrap_or_default();
    }
    let mut out = String::new();
    for seg in segs {
        let clean: String = seg.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
        if out.is_empty() {
            out.push_str(&clean);
        } else {
            let mut chars = clean.chars();
            if let Some(first) = chars.next() {
                out.push(first.to_ascii_uppercase());
                out.extend(chars);
            }
        }
    }
    out
}

/// Apply user overrides on top of extracted fields.
///
/// An override for a path not present in the field list promotes that path
/// into the schema.
pub fn apply_overrides(
    fields: &mut Vec<SchemaField>,
    overrides: &std::collections::BTreeMap<String, SchemaOverride>,
    opts: &ExtractOptions,
) {
    for (path, ov) in overrides {
        if let Some(field) = fields.iter_mut().find(|f| f.path == *path) {
            if let Some(t) = ov.field_type {
                field.field_type = t;
            }
            if let Some(d) = &ov.default {
                field.default = Some(d.clone());
            }
            if let Some(d) = &ov.description {
                field.description = Some(d.clone());
            }
        } else {
            let segs: Vec<String> = path.split('.').map(|s| s.to_string()).collect();
            fields.push(SchemaField {
                name: shape_name(&segs, opts),
                path: path.clone(),
                field_type: ov.field_type.unwrap_or(SchemaType::String),
                default: ov.default.clone(),
                description: ov.description.clone(),
            });
        }
    }
    fields.sort_by(|a, b| {
        let sa: Vec<&str> = a.path.split('.').collect();
        let sb: Vec<&str> = b.path.split('.').collect();
        sa.cmp(&sb)
    });
}

fn lookup_supplemental<'a>(
    schema: &'a serde_json::Value,
    segs: &[String],
) -> Option<&'a serde_json::Value> {
    let mut cur = schema;
    for seg in segs {
        cur = cur.get("properties")?.get(seg)?;
    }
    Some(cur)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn values(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn refs(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn referenced_only_by_default() {
        let v = values("used: x\nunused: y\n");
        let r = refs(&["used"]);
        let fields = extract_schema(&v, Some(&r), None, &ExtractOptions::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].path, "used");
        assert_eq!(fields[0].render(), "string | default=\"x\"");
    }

    #[test]
    fn include_all_emits_every_leaf() {
        let v = values("a: 1\nb:\n  c: true\n");
        let opts = ExtractOptions {
            include_all: true,
            ..Default::default()
        };
        let fields = extract_schema(&v, None, None, &opts);
        let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["a", "b.c"]);
        assert_eq!(fields[0].render(), "integer | default=1");
        assert_eq!(fields[1].render(), "boolean | default=true");
    }

    #[test]
    fn ancestor_reference_includes_leaves() {
        let v = values("image:\n  repository: nginx\n  tag: \"1.25\"\n");
        let r = refs(&["image"]);
        let fields = extract_schema(&v, Some(&r), None, &ExtractOptions::default());
        let paths: Vec<&str> = fields.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["image.repository", "image.tag"]);
    }

    #[test]
    fn referenced_empty_mapping_becomes_object() {
        let v = values("podAnnotations: {}\nother: 1\n");
        let r = refs(&["podAnnotations"]);
        let fields = extract_schema(&v, Some(&r), None, &ExtractOptions::default());
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field_type, SchemaType::Object);
        assert_eq!(fields[0].default.as_deref(), Some("{}"));
    }

    #[test]
    fn sequences_are_array_leaves() {
        let v = values("args:\n  - --verbose\n  - --json\n");
        let r = refs(&["args"]);
        let fields = extract_schema(&v, Some(&r), None, &ExtractOptions::default());
        assert_eq!(fields[0].field_type, SchemaType::Array);
        assert_eq!(
            fields[0].default.as_deref(),
            Some("[\"--verbose\",\"--json\"]")
        );
    }

    #[test]
    fn supplemental_schema_wins_on_type() {
        let v = values("port: 8080\n");
        let supp = serde_json::json!({
            "properties": {
                "port": { "type": "string", "description": "listen port" }
            }
        });
        let r = refs(&["port"]);
        let fields = extract_schema(&v, Some(&r), Some(&supp), &ExtractOptions::default());
        assert_eq!(fields[0].field_type, SchemaType::String);
        assert_eq!(fields[0].description.as_deref(), Some("listen port"));
    }

    #[test]
    fn flat_names_camel_join() {
        let v = values("image:\n  repository: nginx\n");
        let opts = ExtractOptions {
            include_all: true,
            flat_names: true,
        };
        let fields = extract_schema(&v, None, None, &opts);
        assert_eq!(fields[0].name, "imageRepository");
    }

    #[test]
    fn override_wins_and_promotes() {
        let v = values("count: 5\n");
        let mut fields = extract_schema(
            &v,
            Some(&refs(&["count"])),
            None,
            &ExtractOptions::default(),
        );
        let mut overrides = std::collections::BTreeMap::new();
        overrides.insert(
            "count".to_string(),
            SchemaOverride {
                field_type: Some(SchemaType::Integer),
                default: Some("10".to_string()),
                description: None,
            },
        );
        overrides.insert(
            "promoted".to_string(),
            SchemaOverride {
                field_type: Some(SchemaType::Boolean),
                default: Some("false".to_string()),
                description: None,
            },
        );
        apply_overrides(&mut fields, &overrides, &ExtractOptions::default());
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].render(), "integer | default=10");
        assert_eq!(fields[1].path, "promoted");
        assert_eq!(fields[1].render(), "boolean | default=false");
    }

    #[test]
    fn empty_input_yields_empty_fields() {
        let fields = extract_schema(
            &Value::Null,
            None,
            None,
            &ExtractOptions {
                include_all: true,
                ..Default::default()
            },
        );
        assert!(fields.is_empty());
    }
}

//! ResourceGraphDefinition assembly.
//!
//! Wraps engine output in the outer document shape: runtime constants,
//! chart-derived metadata, the hierarchical schema map, status
//! projections, and the topologically ordered resource entries with their
//! readiness predicates and explicit dependencies.

use std::collections::BTreeMap;

use serde_yaml::{Mapping, Value};

use crate::engine::ConvertOutcome;
use crate::errors::{ConvertError, ConvertResult};
use crate::readiness::ready_when_for;
use crate::resource::ChartMeta;
use crate::schema::SchemaField;
use crate::value::map_insert;
use crate::{RGD_API_VERSION, RGD_KIND, SCHEMA_API_VERSION};

/// Assembly options.
#[derive(Debug, Clone, Default)]
pub struct AssembleOptions {
    /// Readiness predicates per kind, replacing the built-ins.
    pub readiness_overrides: BTreeMap<String, Vec<String>>,
    /// Injected timestamp for the generated-at annotation; the assembler
    /// itself never reads a clock.
    pub generated_at: Option<String>,
    /// Emit schema fields as one flat map instead of nesting by path.
    pub flat_names: bool,
}

/// Produce the full output document tree.
pub fn assemble(
    outcome: &ConvertOutcome,
    chart: &ChartMeta,
    opts: &AssembleOptions,
) -> ConvertResult<Value> {
    let mut root = Mapping::new();
    map_insert(&mut root, "apiVersion", Value::String(RGD_API_VERSION.to_string()));
    map_insert(&mut root, "kind", Value::String(RGD_KIND.to_string()));
    map_insert(&mut root, "metadata", metadata(chart, opts));

    let mut spec = Mapping::new();
    map_insert(&mut spec, "schema", schema_block(outcome, chart, opts));
    map_insert(&mut spec, "resources", resources_block(outcome, opts)?);
    map_insert(&mut root, "spec", Value::Mapping(spec));

    Ok(Value::Mapping(root))
}

fn metadata(chart: &ChartMeta, opts: &AssembleOptions) -> Value {
    let mut meta = Mapping::new();
    map_insert(&mut meta, "name", Value::String(document_name(&chart.name)));

    let mut labels = Mapping::new();
    if !chart.name.is_empty() {
        map_insert(
            &mut labels,
            "app.kubernetes.io/name",
            Value::String(chart.name.clone()),
        );
    }
    if !chart.version.is_empty() {
        map_insert(
            &mut labels,
            "app.kubernetes.io/version",
            Value::String(chart.version.clone()),
        );
    }
    if !labels.is_empty() {
        map_insert(&mut meta, "labels", Value::Mapping(labels));
    }

    let mut annotations = Mapping::new();
    map_insert(
        &mut annotations,
        "chart2rgd.io/generated-by",
        Value::String("chart2rgd".to_string()),
    );
    if let Some(ts) = &opts.generated_at {
        map_insert(
            &mut annotations,
            "chart2rgd.io/generated-at",
            Value::String(ts.clone()),
        );
    }
    map_insert(&mut meta, "annotations", Value::Mapping(annotations));

    Value::Mapping(meta)
}

fn schema_block(outcome: &ConvertOutcome, chart: &ChartMeta, opts: &AssembleOptions) -> Value {
    let mut schema = Mapping::new();
    map_insert(
        &mut schema,
        "apiVersion",
        Value::String(SCHEMA_API_VERSION.to_string()),
    );
    map_insert(&mut schema, "kind", Value::String(schema_kind(&chart.name)));

    if !outcome.schema_fields.is_empty() {
        let mut spec = Mapping::new();
        for field in &outcome.schema_fields {
            if opts.flat_names {
                map_insert(&mut spec, &field.name, Value::String(field.render()));
            } else {
                insert_nested(&mut spec, &field.path, field);
            }
        }
        map_insert(&mut schema, "spec", Value::Mapping(spec));
    }

    if !outcome.status_fields.is_empty() {
        let mut status = Mapping::new();
        for field in &outcome.status_fields {
            map_insert(&mut status, &field.name, Value::String(field.expression.clone()));
        }
        map_insert(&mut schema, "status", Value::Mapping(status));
    }

    Value::Mapping(schema)
}

/// Nest `a.b.c` under intermediate mappings, creating them as needed.
fn insert_nested(map: &mut Mapping, path: &str, field: &SchemaField) {
    let segs: Vec<&str> = path.split('.').collect();
    let mut cur = map;
    for seg in &segs[..segs.len() - 1] {
        let key = Value::String(seg.to_string());
        if !matches!(cur.get(&key), Some(Value::Mapping(_))) {
            cur.insert(key.clone(), Value::Mapping(Mapping::new()));
        }
        let Some(Value::Mapping(next)) = cur.get_mut(&key) else {
            return;
        };
        cur = next;
    }
    if let Some(last) = segs.last() {
        map_insert(cur, last, Value::String(field.render()));
    }
}

fn resources_block(outcome: &ConvertOutcome, opts: &AssembleOptions) -> ConvertResult<Value> {
    let mut entries = Vec::with_capacity(outcome.order.len());
    for id in &outcome.order {
        let resource = outcome.graph.node(id).ok_or_else(|| {
            ConvertError::SerializationFailed(format!("ordered id {id} has no resource"))
        })?;

        let mut entry = Mapping::new();
        map_insert(&mut entry, "id", Value::String(id.clone()));
        map_insert(&mut entry, "template", resource.tree.clone());

        if let Some(predicates) = ready_when_for(&resource.kind, &opts.readiness_overrides) {
            map_insert(
                &mut entry,
                "readyWhen",
                Value::Sequence(predicates.into_iter().map(Value::String).collect()),
            );
        }

        let depends: Vec<String> = outcome
            .graph
            .dependencies_of(id)
            .into_iter()
            .filter(|d| d != id)
            .collect();
        if !depends.is_empty() {
            map_insert(
                &mut entry,
                "dependsOn",
                Value::Sequence(depends.into_iter().map(Value::String).collect()),
            );
        }

        entries.push(Value::Mapping(entry));
    }
    Ok(Value::Sequence(entries))
}

/// Chart name as a document name: lowercase, safe characters only.
fn document_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.to_ascii_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "chart".to_string()
    } else {
        trimmed
    }
}

/// Chart name as the schema kind: UpperCamelCase, `^[A-Z][A-Za-z0-9]*$`.
fn schema_kind(name: &str) -> String {
    let mut out = String::new();
    for seg in name
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|s| !s.is_empty())
    {
        let mut chars = seg.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    while out.starts_with(|c: char| c.is_ascii_digit()) {
        out.remove(0);
    }
    match out.chars().next() {
        None => "App".to_string(),
        Some(c) if c.is_ascii_lowercase() => {
            format!("{}{}", c.to_ascii_uppercase(), &out[1..])
        }
        Some(_) => out,
    }
}

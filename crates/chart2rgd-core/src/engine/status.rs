//! Status projections.
//!
//! Surfaces observed state into `spec.schema.status`: per-kind defaults
//! (a Deployment's available replicas, a Job's completions) plus any
//! projection the templates themselves spelled out as a plain
//! `<id>.status.*` / `<id>.metadata.*` string. Names collide
//! deterministically and renames apply last.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::resource::Resource;
use crate::value::for_each_string;

static STATUS_STRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.(status|metadata)\.([A-Za-z0-9_.\[\]-]+)$").unwrap()
});

/// One projected status field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusField {
    pub name: String,
    /// A `${…}` reference into a resource's observed state.
    pub expression: String,
}

/// Built-in projections: (kind, field suffix, sub-path).
const DEFAULT_PROJECTIONS: &[(&str, &str, &str)] = &[
    ("DaemonSet", "numberReady", "status.numberReady"),
    ("Deployment", "availableReplicas", "status.availableReplicas"),
    ("Job", "succeeded", "status.succeeded"),
    ("PersistentVolumeClaim", "phase", "status.phase"),
    ("StatefulSet", "readyReplicas", "status.readyReplicas"),
];

/// Project status fields for every resource, id-ascending.
pub fn extract_status_projections(
    resources: &[(String, Resource)],
    renames: &BTreeMap<String, String>,
) -> Vec<StatusField> {
    let ids: BTreeSet<&str> = resources.iter().map(|(id, _)| id.as_str()).collect();

    let mut ordered: Vec<&(String, Resource)> = resources.iter().collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut fields: Vec<StatusField> = Vec::new();
    let mut used: BTreeSet<String> = BTreeSet::new();

    for (id, resource) in ordered {
        for (kind, suffix, path) in DEFAULT_PROJECTIONS {
            if resource.kind == *kind {
                push_unique(
                    &mut fields,
                    &mut used,
                    format!("{id}-{suffix}"),
                    format!("${{{id}.{path}}}"),
                );
            }
        }

        let mut discovered: Vec<(String, String)> = Vec::new();
        for_each_string(&resource.tree, &mut |_, s| {
            if let Some(caps) = STATUS_STRING.captures(s) {
                let target = &caps[1];
                if ids.contains(target) {
                    let leaf = caps[3]
                        .split('.')
                        .next_back()
                        .unwrap_or("")
                        .split('[')
                        .next()
                        .unwrap_or("");
                    if !leaf.is_empty() {
                        discovered.push((format!("{target}-{leaf}"), format!("${{{s}}}")));
                    }
                }
            }
        });
        discovered.sort();
        discovered.dedup();
        for (name, expr) in discovered {
            push_unique(&mut fields, &mut used, name, expr);
        }
    }

    for field in &mut fields {
        if let Some(renamed) = renames.get(&field.name) {
            field.name = renamed.clone();
        }
    }
    fields
}

/// Duplicate names get `-2`, `-3`, … suffixes in discovery order.
fn push_unique(
    fields: &mut Vec<StatusField>,
    used: &mut BTreeSet<String>,
    name: String,
    expression: String,
) {
    let mut candidate = name.clone();
    let mut n = 2;
    while !used.insert(candidate.clone()) {
        candidate = format!("{name}-{n}");
        n += 1;
    }
    fields.push(StatusField {
        name: candidate,
        expression,
    });
}

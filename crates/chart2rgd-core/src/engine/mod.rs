//! The transformation engine.
//!
//! Runs once per conversion: assign ids, infer mappings, extract the
//! schema, rewrite fields, link cross-resource references, project status,
//! build the dependency graph, apply overrides, order topologically.
//! Non-fatal conditions accumulate as diagnostics on the outcome; fatal
//! errors short-circuit with context.

use std::collections::{BTreeMap, BTreeSet};

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::errors::{ConvertError, ConvertResult, Diagnostic};
use crate::graph::{is_valid_id, DependencyGraph, GraphError};
use crate::infer::{ast, sentinel, FieldMapping};
use crate::manifest;
use crate::render::{CancelToken, RenderRequest, Renderer};
use crate::resource::{ChartMeta, Resource};
use crate::schema::{self, ExtractOptions, SchemaField, SchemaOverride};

mod references;
mod rewrite;
mod status;

pub use references::link_references;
pub use rewrite::rewrite_fields;
pub use status::{extract_status_projections, StatusField};

/// Which inference strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Re-render with marker values and diff (default).
    #[default]
    Sentinel,
    /// Scan template source for parameter accessors.
    Ast,
}

/// Everything the engine consumes.
#[derive(Debug, Clone)]
pub struct ConvertInput {
    /// Baseline rendered resources, already hook-filtered.
    pub resources: Vec<Resource>,
    /// The merged parameter tree. Read-only from here on.
    pub values: Value,
    /// Supplemental JSON-Schema shipped with the chart.
    pub values_schema: Option<serde_json::Value>,
    /// Raw template source keyed by file name (AST strategy only).
    pub templates: BTreeMap<String, String>,
    pub chart: ChartMeta,
}

/// Per-run configuration. No hidden state: everything the engine varies
/// on flows through here.
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub strategy: Strategy,
    pub include_all_params: bool,
    pub flat_names: bool,
    /// Resource-id overrides keyed by `<kind>/<name>`.
    pub id_overrides: BTreeMap<String, String>,
    /// Schema overrides keyed by values dot-path.
    pub schema_overrides: BTreeMap<String, SchemaOverride>,
    /// Readiness predicates keyed by kind, replacing the built-ins.
    pub readiness_overrides: BTreeMap<String, Vec<String>>,
    /// Status-field renames applied after projection.
    pub status_field_renames: BTreeMap<String, String>,
    pub release_name: String,
    pub namespace: Option<String>,
    /// Deadline handed to the renderer for the marker render.
    pub render_timeout_ms: Option<u64>,
    pub cancel: CancelToken,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Sentinel,
            include_all_params: false,
            flat_names: false,
            id_overrides: BTreeMap::new(),
            schema_overrides: BTreeMap::new(),
            readiness_overrides: BTreeMap::new(),
            status_field_renames: BTreeMap::new(),
            release_name: "release".to_string(),
            namespace: None,
            render_timeout_ms: None,
            cancel: CancelToken::new(),
        }
    }
}

/// Engine output consumed by the assembler and serializers.
#[derive(Debug)]
pub struct ConvertOutcome {
    /// Rewritten resources, owned by their graph nodes.
    pub graph: DependencyGraph,
    /// Topological order of resource ids (dependencies first).
    pub order: Vec<String>,
    pub schema_fields: Vec<SchemaField>,
    pub status_fields: Vec<StatusField>,
    pub field_mappings: Vec<FieldMapping>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Run the full conversion pipeline.
///
/// `renderer` is only consulted by the sentinel strategy; pass `None` to
/// force the AST path (a warning is recorded if sentinel was requested).
pub fn convert(
    input: ConvertInput,
    opts: &ConvertOptions,
    renderer: Option<&dyn Renderer>,
) -> ConvertResult<ConvertOutcome> {
    check_cancel(&opts.cancel)?;

    if input.resources.is_empty() {
        return Err(ConvertError::NoResources);
    }

    let mut diagnostics = Vec::new();

    let ids = assign_resource_ids(&input.resources, &opts.id_overrides)?;
    let id_map: BTreeMap<String, String> = input
        .resources
        .iter()
        .zip(ids.iter())
        .map(|(r, id)| (r.identity(), id.clone()))
        .collect();
    debug!(resources = input.resources.len(), "assigned resource ids");

    let mappings = infer_mappings(&input, opts, renderer, &id_map, &mut diagnostics)?;
    debug!(mappings = mappings.len(), "inference complete");

    check_cancel(&opts.cancel)?;

    let referenced: BTreeSet<String> =
        mappings.iter().map(|m| m.values_path.clone()).collect();
    let extract_opts = ExtractOptions {
        include_all: opts.include_all_params,
        flat_names: opts.flat_names,
    };
    let mut schema_fields = schema::extract_schema(
        &input.values,
        Some(&referenced),
        input.values_schema.as_ref(),
        &extract_opts,
    );

    let mut resources: Vec<(String, Resource)> =
        ids.into_iter().zip(input.resources).collect();

    rewrite_fields(&mut resources, &mappings, &input.values, opts.flat_names);
    let linked = link_references(&mut resources);
    if linked > 0 {
        diagnostics.push(Diagnostic::info(
            "engine.references.linked",
            format!("rewrote {linked} cross-resource name reference(s)"),
        ));
    }

    let status_fields =
        extract_status_projections(&resources, &opts.status_field_renames);

    let edges = collect_reference_edges(&resources);
    let mut graph = DependencyGraph::new();
    for (id, resource) in resources {
        graph.add_node(id.clone(), resource).map_err(|e| {
            ConvertError::InvalidConfiguration(format!("graph node {id}: {e}"))
        })?;
    }
    for (from, to) in edges {
        graph.add_edge(&from, &to).map_err(|e| {
            ConvertError::InvalidConfiguration(format!("graph edge: {e}"))
        })?;
    }

    schema::apply_overrides(&mut schema_fields, &opts.schema_overrides, &extract_opts);

    check_cancel(&opts.cancel)?;

    let order = graph.topological_sort().map_err(|e| match e {
        GraphError::CycleDetected(cycles) => ConvertError::CycleDetected(cycles),
        other => ConvertError::InvalidConfiguration(other.to_string()),
    })?;

    Ok(ConvertOutcome {
        graph,
        order,
        schema_fields,
        status_fields,
        field_mappings: mappings,
        diagnostics,
    })
}

fn check_cancel(cancel: &CancelToken) -> ConvertResult<()> {
    if cancel.is_cancelled() {
        return Err(ConvertError::Cancelled);
    }
    Ok(())
}

/// Derive a unique, identifier-valid id for every resource.
///
/// Ids come from lower-camel name plus kind (`web` + `Deployment` →
/// `webDeployment`); collisions get a stable numeric suffix in resource
/// order. Overrides (keyed `<kind>/<name>`) win but must be valid
/// identifiers; two overrides claiming the same id is a conflict.
pub fn assign_resource_ids(
    resources: &[Resource],
    overrides: &BTreeMap<String, String>,
) -> ConvertResult<Vec<String>> {
    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut ids = Vec::with_capacity(resources.len());

    for resource in resources {
        let key = format!("{}/{}", resource.kind, resource.name);
        let id = match overrides.get(&key) {
            Some(explicit) => {
                if !is_valid_id(explicit) {
                    return Err(ConvertError::InvalidId {
                        id: explicit.clone(),
                        reason: "must match [A-Za-z_][A-Za-z0-9_]*".to_string(),
                    });
                }
                if !used.insert(explicit.clone()) {
                    return Err(ConvertError::IdConflict(explicit.clone()));
                }
                explicit.clone()
            }
            None => {
                let base = derive_id(&resource.name, &resource.kind);
                let mut candidate = base.clone();
                let mut n = 2;
                while !used.insert(candidate.clone()) {
                    candidate = format!("{base}{n}");
                    n += 1;
                    if n > resources.len() + 2 {
                        return Err(ConvertError::IdConflict(base));
                    }
                }
                candidate
            }
        };
        ids.push(id);
    }
    Ok(ids)
}

/// `my-app` + `Deployment` → `myAppDeployment`.
fn derive_id(name: &str, kind: &str) -> String {
    let mut out = camel_segments(name, false);
    out.push_str(&camel_segments(kind, true));
    if out.is_empty() {
        out.push_str("resource");
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, 'r');
    }
    out
}

fn camel_segments(s: &str, capitalize_first: bool) -> String {
    let mut out = String::new();
    for (i, seg) in s
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|seg| !seg.is_empty())
        .enumerate()
    {
        let mut chars = seg.chars();
        let Some(first) = chars.next() else { continue };
        if i == 0 && !capitalize_first {
            out.push(first.to_ascii_lowercase());
        } else {
            out.push(first.to_ascii_uppercase());
        }
        out.extend(chars);
    }
    out
}

fn infer_mappings(
    input: &ConvertInput,
    opts: &ConvertOptions,
    renderer: Option<&dyn Renderer>,
    id_map: &BTreeMap<String, String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> ConvertResult<Vec<FieldMapping>> {
    match opts.strategy {
        Strategy::Ast => Ok(run_ast(input, id_map, diagnostics)),
        Strategy::Sentinel => {
            let Some(renderer) = renderer else {
                warn!("sentinel strategy requested without a renderer");
                diagnostics.push(Diagnostic::warning(
                    "infer.sentinel.unavailable",
                    "no renderer available for the marker render, falling back to AST analysis",
                ));
                return Ok(run_ast(input, id_map, diagnostics));
            };
            match run_sentinel(input, opts, renderer, id_map) {
                Ok(mappings) => Ok(mappings),
                Err(ConvertError::Cancelled) => Err(ConvertError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "sentinel pass failed, degrading to AST analysis");
                    diagnostics.push(Diagnostic::warning(
                        "infer.sentinel.degraded",
                        format!("sentinel pass failed ({e}), falling back to AST analysis"),
                    ));
                    Ok(run_ast(input, id_map, diagnostics))
                }
            }
        }
    }
}

fn run_sentinel(
    input: &ConvertInput,
    opts: &ConvertOptions,
    renderer: &dyn Renderer,
    id_map: &BTreeMap<String, String>,
) -> ConvertResult<Vec<FieldMapping>> {
    check_cancel(&opts.cancel)?;

    let marker_values = sentinel::sentinelise(&input.values);
    let request = RenderRequest {
        values: &marker_values,
        release_name: &opts.release_name,
        namespace: opts.namespace.as_deref(),
        strict: false,
        timeout_ms: opts.render_timeout_ms,
    };
    let bytes = renderer.render(&request)?;

    check_cancel(&opts.cancel)?;

    let parsed = manifest::parse_manifests(&bytes)?;
    Ok(sentinel::diff_all_resources(
        &input.resources,
        &parsed.resources,
        id_map,
    ))
}

fn run_ast(
    input: &ConvertInput,
    id_map: &BTreeMap<String, String>,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<FieldMapping> {
    if input.templates.is_empty() {
        diagnostics.push(Diagnostic::warning(
            "infer.ast.no-templates",
            "no template sources supplied; no mappings inferred",
        ));
        return Vec::new();
    }
    let (mappings, mut diags) =
        ast::infer_from_templates(&input.templates, &input.values, &input.resources, id_map);
    diagnostics.append(&mut diags);
    mappings
}

/// Every `${<id>.(status|metadata|spec).…}` reference in `u` becomes an
/// edge `u -> <id>`. Self-edges are dropped here, before they reach the
/// graph.
fn collect_reference_edges(resources: &[(String, Resource)]) -> Vec<(String, String)> {
    use once_cell::sync::Lazy;
    use regex::Regex;

    static EXPR_REF: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\.(?:status|metadata|spec)\.").unwrap()
    });

    let known: BTreeSet<&str> = resources.iter().map(|(id, _)| id.as_str()).collect();
    let mut edges: BTreeSet<(String, String)> = BTreeSet::new();

    for (id, resource) in resources {
        crate::value::for_each_string(&resource.tree, &mut |_, s| {
            for caps in EXPR_REF.captures_iter(s) {
                let target = &caps[1];
                if target != id && known.contains(target) {
                    edges.insert((id.clone(), target.to_string()));
                }
            }
        });
    }
    edges.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn res(api: &str, kind: &str, name: &str) -> Resource {
        let tree: Value = serde_yaml::from_str(&format!(
            "apiVersion: {api}\nkind: {kind}\nmetadata:\n  name: {name}\n"
        ))
        .unwrap();
        Resource::from_tree(tree, None).unwrap()
    }

    #[test]
    fn ids_derive_from_name_and_kind() {
        let resources = vec![
            res("apps/v1", "Deployment", "web"),
            res("v1", "Service", "my-app"),
        ];
        let ids = assign_resource_ids(&resources, &BTreeMap::new()).unwrap();
        assert_eq!(ids, vec!["webDeployment", "myAppService"]);
    }

    #[test]
    fn id_collisions_get_stable_suffixes() {
        let resources = vec![
            res("apps/v1", "Deployment", "web"),
            res("apps/v2", "Deployment", "web"),
        ];
        let ids = assign_resource_ids(&resources, &BTreeMap::new()).unwrap();
        assert_eq!(ids, vec!["webDeployment", "webDeployment2"]);
    }

    #[test]
    fn override_wins_but_must_be_valid() {
        let resources = vec![res("apps/v1", "Deployment", "web")];
        let mut overrides = BTreeMap::new();
        overrides.insert("Deployment/web".to_string(), "frontend".to_string());
        let ids = assign_resource_ids(&resources, &overrides).unwrap();
        assert_eq!(ids, vec!["frontend"]);

        overrides.insert("Deployment/web".to_string(), "front-end".to_string());
        assert!(matches!(
            assign_resource_ids(&resources, &overrides),
            Err(ConvertError::InvalidId { .. })
        ));
    }

    #[test]
    fn numeric_leading_names_are_prefixed() {
        let resources = vec![res("v1", "ConfigMap", "404-page")];
        let ids = assign_resource_ids(&resources, &BTreeMap::new()).unwrap();
        assert_eq!(ids, vec!["r404PageConfigMap"]);
    }

    #[test]
    fn empty_input_is_no_resources() {
        let input = ConvertInput {
            resources: vec![],
            values: Value::Null,
            values_schema: None,
            templates: BTreeMap::new(),
            chart: ChartMeta::default(),
        };
        assert!(matches!(
            convert(input, &ConvertOptions::default(), None),
            Err(ConvertError::NoResources)
        ));
    }

    #[test]
    fn cancelled_token_aborts_before_work() {
        let opts = ConvertOptions::default();
        opts.cancel.cancel();
        let input = ConvertInput {
            resources: vec![res("v1", "ConfigMap", "cfg")],
            values: Value::Null,
            values_schema: None,
            templates: BTreeMap::new(),
            chart: ChartMeta::default(),
        };
        assert!(matches!(
            convert(input, &opts, None),
            Err(ConvertError::Cancelled)
        ));
    }

    #[test]
    fn reference_edges_skip_self_and_unknown() {
        let mut r1 = res("apps/v1", "Deployment", "web");
        r1.tree = serde_yaml::from_str(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  a: ${cfgConfigMap.metadata.name}\n  b: ${webDeployment.status.x}\n  c: ${ghost.status.x}\n",
        )
        .unwrap();
        let r2 = res("v1", "ConfigMap", "cfg");
        let resources = vec![
            ("webDeployment".to_string(), r1),
            ("cfgConfigMap".to_string(), r2),
        ];
        let edges = collect_reference_edges(&resources);
        assert_eq!(
            edges,
            vec![("webDeployment".to_string(), "cfgConfigMap".to_string())]
        );
    }
}

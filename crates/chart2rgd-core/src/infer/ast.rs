//! Template-AST inference (fast strategy).
//!
//! Scans raw template source for the parameter accessors the template
//! grammar exposes (`.Values.*`), composing nested accesses into dot-paths
//! and letting `with`/`range` blocks rebind the cursor. Each referenced
//! path is then looked up in the parameter tree and matched against the
//! rendered resources by value.
//!
//! Trade-off: this misses values produced by function composition
//! (concatenation, `printf`, conditional selection); sentinel diffing
//! catches those at the cost of one extra render.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::errors::Diagnostic;
use crate::resource::Resource;
use crate::value::{get_path, scalar_to_string, untag};

use super::{for_each_scalar, sort_mappings, FieldMapping, MatchType};

/// File suffixes treated as template source.
const TEMPLATE_EXTENSIONS: &[&str] = &[".yaml", ".yml", ".tpl"];

/// Substring matching only applies to string leaves longer than this.
const MIN_SUBSTRING_LEN: usize = 3;

static ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{\{-?(.*?)-?\}\}").unwrap());
static ACCESSOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\.[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*").unwrap());

/// Template-root names that are never parameter accesses.
const BUILTIN_ROOTS: &[&str] = &[
    "Chart",
    "Release",
    "Capabilities",
    "Template",
    "Files",
    "Subcharts",
];

/// Collect every parameter dot-path syntactically referenced by the
/// template files.
///
/// Files that do not carry a template extension are ignored; a file with
/// unbalanced action delimiters is skipped with a warning so one bad
/// template cannot abort inference.
pub fn referenced_paths(
    templates: &BTreeMap<String, String>,
) -> (BTreeSet<String>, Vec<Diagnostic>) {
    let mut paths = BTreeSet::new();
    let mut diagnostics = Vec::new();

    for (name, content) in templates {
        if !TEMPLATE_EXTENSIONS.iter().any(|ext| name.ends_with(ext)) {
            continue;
        }
        match scan_file(content) {
            Ok(found) => paths.extend(found),
            Err(reason) => diagnostics.push(Diagnostic::warning(
                "ast.template.skipped",
                format!("template {name} skipped: {reason}"),
            )),
        }
    }

    (paths, diagnostics)
}

/// One `with`/`range`/`if` frame; `binding` is the values path the block
/// rebound the cursor to, if any.
#[derive(Debug)]
struct Frame {
    binding: Option<String>,
}

fn scan_file(content: &str) -> Result<BTreeSet<String>, String> {
    let open = content.matches("{{").count();
    let close = content.matches("}}").count();
    if open != close {
        return Err(format!(
            "unbalanced action delimiters ({open} open, {close} close)"
        ));
    }

    let mut paths = BTreeSet::new();
    let mut stack: Vec<Frame> = Vec::new();

    for caps in ACTION.captures_iter(content) {
        let action = caps[1].trim().to_string();
        let head = action.split_whitespace().next().unwrap_or("");

        match head {
            "end" => {
                stack.pop();
            }
            "else" => {}
            "with" | "range" | "if" => {
                let binding = if head == "if" {
                    None
                } else {
                    bound_path(&action, &stack, &mut paths)
                };
                collect_accessors(&action, &stack, &mut paths);
                stack.push(Frame { binding });
            }
            _ => collect_accessors(&action, &stack, &mut paths),
        }
    }

    Ok(paths)
}

/// The values path a `with`/`range` head binds the cursor to.
///
/// The base path itself counts as referenced even when no field under it
/// is accessed directly.
fn bound_path(action: &str, stack: &[Frame], paths: &mut BTreeSet<String>) -> Option<String> {
    for m in ACCESSOR.find_iter(action) {
        if let Some(path) = resolve_accessor(m.as_str(), stack) {
            paths.insert(path.clone());
            return Some(path);
        }
    }
    None
}

fn collect_accessors(action: &str, stack: &[Frame], paths: &mut BTreeSet<String>) {
    for m in ACCESSOR.find_iter(action) {
        if let Some(path) = resolve_accessor(m.as_str(), stack) {
            paths.insert(path);
        }
    }
}

/// Turn one accessor token into a values dot-path, if it is one.
fn resolve_accessor(token: &str, stack: &[Frame]) -> Option<String> {
    let token = token.strip_prefix('$').unwrap_or(token);
    let body = token.strip_prefix('.')?;

    if let Some(rest) = body.strip_prefix("Values.") {
        return Some(rest.to_string());
    }
    if body == "Values" {
        return None;
    }

    let root = body.split('.').next().unwrap_or("");
    if BUILTIN_ROOTS.contains(&root) {
        return None;
    }

    // A relative access composes with the innermost cursor rebinding.
    let binding = stack.iter().rev().find_map(|f| f.binding.as_deref())?;
    Some(format!("{binding}.{body}"))
}

/// Run the full AST strategy: scan templates, then search the rendered
/// resources for each referenced parameter's value.
pub fn infer_from_templates(
    templates: &BTreeMap<String, String>,
    values: &Value,
    resources: &[Resource],
    id_map: &BTreeMap<String, String>,
) -> (Vec<FieldMapping>, Vec<Diagnostic>) {
    let (paths, diagnostics) = referenced_paths(templates);
    let mut mappings = Vec::new();

    for path in &paths {
        let Some(leaf) = get_path(values, path) else {
            continue;
        };
        let leaf = untag(leaf);
        let Some(leaf_str) = scalar_to_string(leaf) else {
            continue;
        };
        let substring_ok = matches!(leaf, Value::String(s) if s.len() > MIN_SUBSTRING_LEN);

        for resource in resources {
            let Some(id) = id_map.get(&resource.identity()) else {
                continue;
            };
            for_each_scalar(&resource.tree, &mut |field_path, field_value| {
                if field_value == leaf {
                    mappings.push(FieldMapping {
                        values_path: path.clone(),
                        resource_id: id.clone(),
                        field_path: field_path.to_string(),
                        match_type: MatchType::Exact,
                        sentinel_rendered: None,
                    });
                } else if substring_ok {
                    if let Some(s) = field_value.as_str() {
                        if s.contains(&leaf_str) {
                            mappings.push(FieldMapping {
                                values_path: path.clone(),
                                resource_id: id.clone(),
                                field_path: field_path.to_string(),
                                match_type: MatchType::Substring,
                                sentinel_rendered: None,
                            });
                        }
                    }
                }
            });
        }
    }

    sort_mappings(&mut mappings);
    (mappings, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn templates(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn direct_accessors_are_collected() {
        let t = templates(&[(
            "templates/deploy.yaml",
            "replicas: {{ .Values.replicaCount }}\nimage: {{ .Values.image.repository }}:{{ .Values.image.tag }}\n",
        )]);
        let (paths, diags) = referenced_paths(&t);
        assert!(diags.is_empty());
        let got: Vec<&str> = paths.iter().map(String::as_str).collect();
        assert_eq!(got, vec!["image.repository", "image.tag", "replicaCount"]);
    }

    #[test]
    fn with_block_rebinds_cursor() {
        let t = templates(&[(
            "templates/deploy.yaml",
            "{{ with .Values.image }}image: {{ .repository }}{{ end }}\nafter: {{ .Chart.Name }}\n",
        )]);
        let (paths, _) = referenced_paths(&t);
        assert!(paths.contains("image"));
        assert!(paths.contains("image.repository"));
        // .Chart.Name after the block end is not a parameter.
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn if_blocks_do_not_rebind() {
        let t = templates(&[(
            "templates/svc.yaml",
            "{{ if .Values.service.enabled }}port: {{ .Values.service.port }}{{ end }}\n",
        )]);
        let (paths, _) = referenced_paths(&t);
        assert!(paths.contains("service.enabled"));
        assert!(paths.contains("service.port"));
    }

    #[test]
    fn include_pipeline_argument_counts() {
        let t = templates(&[(
            "templates/_helpers.tpl",
            "{{ include \"app.labels\" .Values.labels }}\n",
        )]);
        let (paths, _) = referenced_paths(&t);
        assert!(paths.contains("labels"));
    }

    #[test]
    fn builtin_roots_and_non_templates_ignored() {
        let t = templates(&[
            ("templates/NOTES.txt", "{{ .Values.hidden }}"),
            ("templates/deploy.yaml", "name: {{ .Release.Name }}\n"),
        ]);
        let (paths, _) = referenced_paths(&t);
        assert!(paths.is_empty());
    }

    #[test]
    fn unbalanced_file_warns_and_is_skipped() {
        let t = templates(&[
            ("templates/bad.yaml", "oops: {{ .Values.broken\n"),
            ("templates/good.yaml", "ok: {{ .Values.fine }}\n"),
        ]);
        let (paths, diags) = referenced_paths(&t);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("bad.yaml"));
        assert!(paths.contains("fine"));
        assert!(!paths.contains("broken"));
    }

    #[test]
    fn matching_emits_exact_and_substring() {
        let t = templates(&[(
            "templates/deploy.yaml",
            "replicas: {{ .Values.replicaCount }}\nrepo: {{ .Values.image.repository }}\n",
        )]);
        let values: Value =
            serde_yaml::from_str("replicaCount: 3\nimage:\n  repository: nginx-stable\n").unwrap();
        let tree: Value = serde_yaml::from_str(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 3\n  image: \"nginx-stable:1.25\"\n",
        )
        .unwrap();
        let resource = Resource::from_tree(tree, None).unwrap();
        let mut ids = BTreeMap::new();
        ids.insert(resource.identity(), "webDeployment".to_string());

        let (mappings, _) = infer_from_templates(&t, &values, &[resource], &ids);
        assert!(mappings.iter().any(|m| {
            m.values_path == "replicaCount"
                && m.field_path == "spec.replicas"
                && m.match_type == MatchType::Exact
        }));
        assert!(mappings.iter().any(|m| {
            m.values_path == "image.repository"
                && m.field_path == "spec.image"
                && m.match_type == MatchType::Substring
        }));
        assert!(mappings.iter().all(|m| m.sentinel_rendered.is_none()));
    }

    #[test]
    fn short_string_leaves_never_substring_match() {
        let t = templates(&[("templates/x.yaml", "tag: {{ .Values.tag }}\n")]);
        let values: Value = serde_yaml::from_str("tag: ab\n").unwrap();
        let tree: Value = serde_yaml::from_str(
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: c\ndata:\n  joined: abcd\n  exact: ab\n",
        )
        .unwrap();
        let resource = Resource::from_tree(tree, None).unwrap();
        let mut ids = BTreeMap::new();
        ids.insert(resource.identity(), "cConfigMap".to_string());

        let (mappings, _) = infer_from_templates(&t, &values, &[resource], &ids);
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].field_path, "data.exact");
        assert_eq!(mappings[0].match_type, MatchType::Exact);
    }
}

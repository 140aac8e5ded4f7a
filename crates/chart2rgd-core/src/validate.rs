//! Post-assembly validation.
//!
//! An independent structural and referential check over an assembled (or
//! externally supplied) document tree. Produces a report even when
//! validation fails so frontends can print every finding; use
//! [`ValidationReport::ok`] or the error count to decide the outcome.

use std::collections::{BTreeMap, BTreeSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::Value;

use crate::graph::detect_cycles_in;
use crate::value::{get_path, key_to_string, map_get, untag};
use crate::{RGD_API_VERSION, RGD_KIND};

static SCHEMA_KIND: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Za-z0-9]*$").unwrap());
static TYPE_DECL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(string|integer|number|boolean|object|array)(\s*\|\s*default=.*)?$").unwrap()
});
static EXPRESSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]*)\}").unwrap());
static RESOURCE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.(status|metadata|spec)(\.|\s|$)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindingLevel {
    Error,
    Warning,
}

/// One validation finding.
#[derive(Debug, Clone)]
pub struct Finding {
    pub level: FindingLevel,
    pub code: String,
    pub message: String,
}

/// Validation result.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub findings: Vec<Finding>,
}

impl ValidationReport {
    pub fn ok(&self) -> bool {
        self.error_count() == 0
    }

    pub fn error_count(&self) -> usize {
        self.findings
            .iter()
            .filter(|f| f.level == FindingLevel::Error)
            .count()
    }
}

fn push(report: &mut ValidationReport, level: FindingLevel, code: &str, message: impl Into<String>) {
    report.findings.push(Finding {
        level,
        code: code.to_string(),
        message: message.into(),
    });
}

/// Validate an assembled document tree.
pub fn validate_document(doc: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    let Some(root) = untag(doc).as_mapping() else {
        push(
            &mut report,
            FindingLevel::Error,
            "doc.shape",
            "document is not a mapping",
        );
        return report;
    };

    // Top-level fields.
    match map_get(root, "apiVersion").and_then(|v| untag(v).as_str()) {
        None => push(
            &mut report,
            FindingLevel::Error,
            "doc.apiVersion.missing",
            "apiVersion is missing or not a string",
        ),
        Some(v) if v != RGD_API_VERSION => push(
            &mut report,
            FindingLevel::Warning,
            "doc.apiVersion.mismatch",
            format!("apiVersion is {v:?}, expected {RGD_API_VERSION:?}"),
        ),
        Some(_) => {}
    }

    match map_get(root, "kind").and_then(|v| untag(v).as_str()) {
        Some(k) if k == RGD_KIND => {}
        Some(k) => push(
            &mut report,
            FindingLevel::Error,
            "doc.kind.mismatch",
            format!("kind is {k:?}, expected {RGD_KIND:?}"),
        ),
        None => push(
            &mut report,
            FindingLevel::Error,
            "doc.kind.missing",
            "kind is missing or not a string",
        ),
    }

    if get_path(doc, "metadata.name")
        .and_then(|v| untag(v).as_str())
        .map(str::trim)
        .unwrap_or("")
        .is_empty()
    {
        push(
            &mut report,
            FindingLevel::Error,
            "doc.metadata.name",
            "metadata.name is missing or empty",
        );
    }

    // Schema block.
    match get_path(doc, "spec.schema.kind").and_then(|v| untag(v).as_str()) {
        Some(kind) if SCHEMA_KIND.is_match(kind) => {}
        Some(kind) => push(
            &mut report,
            FindingLevel::Error,
            "schema.kind.invalid",
            format!("spec.schema.kind {kind:?} does not match ^[A-Z][A-Za-z0-9]*$"),
        ),
        None => push(
            &mut report,
            FindingLevel::Error,
            "schema.kind.missing",
            "spec.schema.kind is missing",
        ),
    }

    let mut schema_paths: BTreeSet<String> = BTreeSet::new();
    if let Some(spec) = get_path(doc, "spec.schema.spec") {
        let mut segs = Vec::new();
        check_schema_leaves(spec, &mut segs, &mut schema_paths, &mut report);
    }

    // Resources.
    let mut ids: BTreeSet<String> = BTreeSet::new();
    let mut depends: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let resources = get_path(doc, "spec.resources")
        .and_then(|v| untag(v).as_sequence())
        .cloned()
        .unwrap_or_default();

    for (idx, entry) in resources.iter().enumerate() {
        let id = get_path(entry, "id")
            .and_then(|v| untag(v).as_str())
            .unwrap_or("")
            .to_string();
        if id.is_empty() {
            push(
                &mut report,
                FindingLevel::Error,
                "resource.id.missing",
                format!("resources[{idx}] has no id"),
            );
            continue;
        }
        if !ids.insert(id.clone()) {
            push(
                &mut report,
                FindingLevel::Error,
                "resource.id.duplicate",
                format!("duplicate resource id: {id}"),
            );
        }
        if get_path(entry, "template.kind")
            .and_then(|v| untag(v).as_str())
            .unwrap_or("")
            .is_empty()
        {
            push(
                &mut report,
                FindingLevel::Error,
                "resource.template.kind",
                format!("resource {id} template has no kind"),
            );
        }
        depends.insert(id, BTreeSet::new());
    }

    for entry in &resources {
        let Some(id) = get_path(entry, "id").and_then(|v| untag(v).as_str()) else {
            continue;
        };
        if let Some(list) = get_path(entry, "dependsOn").and_then(|v| untag(v).as_sequence()) {
            for dep in list {
                let Some(dep) = untag(dep).as_str() else {
                    continue;
                };
                if !ids.contains(dep) {
                    push(
                        &mut report,
                        FindingLevel::Error,
                        "resource.dependsOn.unknown",
                        format!("resource {id} depends on undeclared resource {dep}"),
                    );
                } else if let Some(set) = depends.get_mut(id) {
                    set.insert(dep.to_string());
                }
            }
        }
    }

    // Expressions, everywhere under spec.
    if let Some(spec) = get_path(doc, "spec") {
        crate::value::for_each_string(spec, &mut |path, s| {
            for caps in EXPRESSION.captures_iter(s) {
                check_expression(&caps[1], path, &schema_paths, &ids, &mut report);
            }
        });
    }

    // Cycles over the explicit dependency lists.
    let cycles = detect_cycles_in(&depends);
    if let Some(cycle) = cycles.iter().min() {
        push(
            &mut report,
            FindingLevel::Error,
            "graph.cycle",
            format!("dependency cycle: {}", cycle.join(" -> ")),
        );
    }

    report
}

/// Walk the schema spec: every leaf must be a `type | default=…` string.
fn check_schema_leaves(
    v: &Value,
    segs: &mut Vec<String>,
    paths: &mut BTreeSet<String>,
    report: &mut ValidationReport,
) {
    match untag(v) {
        Value::Mapping(m) => {
            for (k, child) in m {
                segs.push(key_to_string(k));
                check_schema_leaves(child, segs, paths, report);
                segs.pop();
            }
        }
        Value::String(s) => {
            let path = segs.join(".");
            if TYPE_DECL.is_match(s) {
                paths.insert(path);
            } else {
                push(
                    report,
                    FindingLevel::Error,
                    "schema.field.type",
                    format!("schema field {path} has invalid declaration {s:?}"),
                );
            }
        }
        _ => {
            push(
                report,
                FindingLevel::Error,
                "schema.field.shape",
                format!("schema field {} is not a type string", segs.join(".")),
            );
        }
    }
}

/// One `${…}` body must be a parameter, self, or resource reference.
fn check_expression(
    inner: &str,
    at: &str,
    schema_paths: &BTreeSet<String>,
    ids: &BTreeSet<String>,
    report: &mut ValidationReport,
) {
    let inner = inner.trim();

    if let Some(field) = inner.strip_prefix("schema.spec.") {
        let field = field
            .split(|c: char| c.is_whitespace() || "=><!|&".contains(c))
            .next()
            .unwrap_or("");
        let known = schema_paths.contains(field)
            || schema_paths
                .iter()
                .any(|p| p.starts_with(&format!("{field}.")) || field.starts_with(&format!("{p}.")));
        if !known {
            push(
                report,
                FindingLevel::Error,
                "expr.schema.unknown",
                format!("{at}: expression references undeclared schema field {field:?}"),
            );
        }
        return;
    }

    if inner == "self" || inner.starts_with("self.") {
        return;
    }

    if let Some(caps) = RESOURCE_REF.captures(inner) {
        let id = &caps[1];
        if !ids.contains(id) {
            push(
                report,
                FindingLevel::Error,
                "expr.resource.unknown",
                format!("{at}: expression references undeclared resource {id:?}"),
            );
        }
        return;
    }

    push(
        report,
        FindingLevel::Error,
        "expr.grammar",
        format!("{at}: expression ${{{inner}}} matches no known form"),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(extra: &str) -> Value {
        serde_yaml::from_str(&format!(
            r#"apiVersion: kro.run/v1alpha1
kind: ResourceGraphDefinition
metadata:
  name: demo
spec:
  schema:
    apiVersion: v1alpha1
    kind: Demo
    spec:
      replicaCount: integer | default=3
  resources:
{extra}"#
        ))
        .unwrap()
    }

    #[test]
    fn well_formed_document_passes() {
        let d = doc(
            r#"    - id: webDeployment
      template:
        kind: Deployment
        spec:
          replicas: ${schema.spec.replicaCount}
"#,
        );
        let report = validate_document(&d);
        assert!(report.ok(), "findings: {:?}", report.findings);
    }

    #[test]
    fn wrong_kind_is_error_wrong_api_version_is_warning() {
        let mut d = doc("    []\n");
        crate::value::set_path(&mut d, "kind", Value::String("Other".into()));
        crate::value::set_path(&mut d, "apiVersion", Value::String("v0".into()));
        let report = validate_document(&d);
        assert!(report
            .findings
            .iter()
            .any(|f| f.code == "doc.kind.mismatch" && f.level == FindingLevel::Error));
        assert!(report
            .findings
            .iter()
            .any(|f| f.code == "doc.apiVersion.mismatch" && f.level == FindingLevel::Warning));
    }

    #[test]
    fn bad_schema_kind_and_type_flagged() {
        let mut d = doc("    []\n");
        crate::value::set_path(&mut d, "spec.schema.kind", Value::String("notCamel".into()));
        crate::value::set_path(
            &mut d,
            "spec.schema.spec.replicaCount",
            Value::String("quantity".into()),
        );
        let report = validate_document(&d);
        assert!(report.findings.iter().any(|f| f.code == "schema.kind.invalid"));
        assert!(report.findings.iter().any(|f| f.code == "schema.field.type"));
    }

    #[test]
    fn duplicate_and_missing_ids_flagged() {
        let d = doc(
            r#"    - id: web
      template:
        kind: Deployment
    - id: web
      template:
        kind: Service
    - template:
        kind: ConfigMap
"#,
        );
        let report = validate_document(&d);
        assert!(report.findings.iter().any(|f| f.code == "resource.id.duplicate"));
        assert!(report.findings.iter().any(|f| f.code == "resource.id.missing"));
    }

    #[test]
    fn unknown_depends_on_flagged() {
        let d = doc(
            r#"    - id: web
      template:
        kind: Deployment
      dependsOn:
        - ghost
"#,
        );
        let report = validate_document(&d);
        assert!(report
            .findings
            .iter()
            .any(|f| f.code == "resource.dependsOn.unknown"));
    }

    #[test]
    fn unknown_expression_targets_flagged() {
        let d = doc(
            r#"    - id: web
      template:
        kind: Deployment
        spec:
          a: ${schema.spec.ghost}
          b: ${ghost.status.x}
          c: ${what.is.this}
"#,
        );
        let report = validate_document(&d);
        assert!(report.findings.iter().any(|f| f.code == "expr.schema.unknown"));
        assert!(report.findings.iter().any(|f| f.code == "expr.resource.unknown"));
        assert!(report.findings.iter().any(|f| f.code == "expr.grammar"));
    }

    #[test]
    fn self_and_comparison_expressions_pass() {
        let d = doc(
            r#"    - id: web
      template:
        kind: Deployment
      readyWhen:
        - ${self.status.availableReplicas == self.spec.replicas}
"#,
        );
        let report = validate_document(&d);
        assert!(report.ok(), "findings: {:?}", report.findings);
    }

    #[test]
    fn cycle_reported_once_rooted_at_minimum() {
        let d = doc(
            r#"    - id: a
      template:
        kind: ConfigMap
      dependsOn:
        - b
    - id: b
      template:
        kind: ConfigMap
      dependsOn:
        - a
"#,
        );
        let report = validate_document(&d);
        let cycle_findings: Vec<&Finding> = report
            .findings
            .iter()
            .filter(|f| f.code == "graph.cycle")
            .collect();
        assert_eq!(cycle_findings.len(), 1);
        assert!(cycle_findings[0].message.contains("a -> b -> a"));
    }
}

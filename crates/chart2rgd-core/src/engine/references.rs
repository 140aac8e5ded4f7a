//! Cross-resource name linking.
//!
//! Kubernetes objects point at each other by name through a small closed
//! set of reference fields. After parameter rewriting, any such field that
//! is still a plain string and names another resource of the matching kind
//! becomes `${<id>.metadata.name}` — which is what makes the dependency
//! visible to the reference walk. Parameter bindings always win: a field
//! already carrying an expression is left alone.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::resource::Resource;
use crate::value::{key_to_string, map_get, path_to_string, set_path, untag, PathSeg};

/// Mapping-valued reference fields: (container key, name key, target kind).
const CONTAINER_REFS: &[(&str, &str, &str)] = &[
    ("configMapRef", "name", "ConfigMap"),
    ("configMapKeyRef", "name", "ConfigMap"),
    ("configMap", "name", "ConfigMap"),
    ("secretRef", "name", "Secret"),
    ("secretKeyRef", "name", "Secret"),
    ("secret", "secretName", "Secret"),
    ("persistentVolumeClaim", "claimName", "PersistentVolumeClaim"),
];

/// Scalar reference fields: (key, target kind).
const SCALAR_REFS: &[(&str, &str)] = &[
    ("serviceAccountName", "ServiceAccount"),
    ("serviceName", "Service"),
];

/// Rewrite name references in place; returns how many fields changed.
pub fn link_references(resources: &mut [(String, Resource)]) -> usize {
    let index: BTreeMap<(String, String), String> = resources
        .iter()
        .map(|(id, r)| ((r.kind.clone(), r.name.clone()), id.clone()))
        .collect();

    let mut total = 0;
    for i in 0..resources.len() {
        let self_id = resources[i].0.clone();
        let mut edits: Vec<(String, String)> = Vec::new();
        {
            let (_, resource) = &resources[i];
            let mut segs = Vec::new();
            collect_edits(&resource.tree, &mut segs, &self_id, &index, &mut edits);
        }
        let (_, resource) = &mut resources[i];
        for (path, expr) in edits {
            if set_path(&mut resource.tree, &path, Value::String(expr)) {
                total += 1;
            }
        }
    }
    total
}

fn collect_edits(
    v: &Value,
    segs: &mut Vec<PathSeg>,
    self_id: &str,
    index: &BTreeMap<(String, String), String>,
    edits: &mut Vec<(String, String)>,
) {
    match untag(v) {
        Value::Mapping(m) => {
            for (k, child) in m {
                let key = key_to_string(k);

                if let Some((_, kind)) = SCALAR_REFS.iter().find(|(f, _)| *f == key) {
                    if let Some(name) = plain_string(child) {
                        if let Some(target) = lookup(index, kind, name, self_id) {
                            segs.push(PathSeg::Key(key.clone()));
                            edits.push((
                                path_to_string(segs),
                                format!("${{{target}.metadata.name}}"),
                            ));
                            segs.pop();
                        }
                    }
                }

                if let Some((_, name_key, kind)) =
                    CONTAINER_REFS.iter().find(|(f, _, _)| *f == key)
                {
                    if let Some(container) = untag(child).as_mapping() {
                        if let Some(name) = map_get(container, name_key).and_then(plain_string)
                        {
                            if let Some(target) = lookup(index, kind, name, self_id) {
                                segs.push(PathSeg::Key(key.clone()));
                                segs.push(PathSeg::Key(name_key.to_string()));
                                edits.push((
                                    path_to_string(segs),
                                    format!("${{{target}.metadata.name}}"),
                                ));
                                segs.pop();
                                segs.pop();
                            }
                        }
                    }
                }

                segs.push(PathSeg::Key(key));
                collect_edits(child, segs, self_id, index, edits);
                segs.pop();
            }
        }
        Value::Sequence(seq) => {
            for (i, child) in seq.iter().enumerate() {
                segs.push(PathSeg::Index(i));
                collect_edits(child, segs, self_id, index, edits);
                segs.pop();
            }
        }
        _ => {}
    }
}

fn plain_string(v: &Value) -> Option<&str> {
    let s = untag(v).as_str()?;
    if s.is_empty() || s.contains("${") {
        return None;
    }
    Some(s)
}

fn lookup<'a>(
    index: &'a BTreeMap<(String, String), String>,
    kind: &str,
    name: &str,
    self_id: &str,
) -> Option<&'a str> {
    let target = index.get(&(kind.to_string(), name.to_string()))?;
    if target == self_id {
        return None;
    }
    Some(target.as_str())
}

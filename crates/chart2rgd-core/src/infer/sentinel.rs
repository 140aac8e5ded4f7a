//! Sentinel-diff inference (default strategy).
//!
//! Replace every scalar leaf of the parameter tree with a unique marker
//! string encoding its path, re-render the chart with that marker tree,
//! and diff the result against the baseline render. Every position where
//! the two differ is explained by the markers present in the
//! marker-rendered value.
//!
//! Resources are matched across the two renders by identity key, never by
//! position: marker substitution can flip conditional blocks and shift
//! document order. A baseline resource with no marker-rendered partner
//! contributes no mappings, and a baseline field absent from the marker
//! render contributes none either.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::resource::Resource;
use crate::sentinel_marker::{PREFIX, SUFFIX};
use crate::value::{key_to_string, path_to_string, scalar_to_string, untag, PathSeg};

use super::{sort_mappings, FieldMapping, MatchType};

static MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"__SENTINEL_([A-Za-z0-9_.\-]+?)__").unwrap());

/// The marker string for a parameter path.
pub fn marker(path: &str) -> String {
    format!("{PREFIX}{path}{SUFFIX}")
}

/// Deep-copy the parameter tree, replacing every scalar leaf with its
/// marker.
///
/// Sequences are preserved verbatim — their elements are not marked — so
/// list shapes stay identical across the two renders. The transform never
/// mutates its input and is idempotent: markers are themselves scalar
/// leaves that re-encode to the same path.
pub fn sentinelise(tree: &Value) -> Value {
    let mut segs: Vec<String> = Vec::new();
    sentinelise_inner(tree, &mut segs)
}

fn sentinelise_inner(v: &Value, segs: &mut Vec<String>) -> Value {
    match untag(v) {
        Value::Mapping(m) => {
            let mut out = Mapping::new();
            for (k, child) in m {
                segs.push(key_to_string(k));
                let replaced = sentinelise_inner(child, segs);
                segs.pop();
                out.insert(k.clone(), replaced);
            }
            Value::Mapping(out)
        }
        Value::Sequence(seq) => Value::Sequence(seq.clone()),
        scalar => {
            if segs.is_empty() {
                scalar.clone()
            } else {
                Value::String(marker(&segs.join(".")))
            }
        }
    }
}

/// All marker paths in a string, left to right.
pub fn extract_markers(s: &str) -> Vec<String> {
    MARKER
        .captures_iter(s)
        .map(|c| c[1].to_string())
        .collect()
}

/// Replace every marker occurrence with the formatter's output, keeping
/// literal segments in place.
pub fn replace_markers<F>(s: &str, f: F) -> String
where
    F: Fn(&str) -> String,
{
    MARKER
        .replace_all(s, |caps: &regex::Captures<'_>| f(&caps[1]))
        .into_owned()
}

/// A changed position discovered by the tree diff.
#[derive(Debug)]
struct Found {
    field_path: String,
    rendered: String,
}

/// Diff every identity-matched resource pair and emit field mappings.
///
/// `id_map` maps identity keys to assigned resource ids; pairs without an
/// entry are skipped. Output is in canonical (resource id, field path,
/// values path) order regardless of worker scheduling.
pub fn diff_all_resources(
    baseline: &[Resource],
    marker_rendered: &[Resource],
    id_map: &BTreeMap<String, String>,
) -> Vec<FieldMapping> {
    let by_identity: BTreeMap<String, &Resource> = marker_rendered
        .iter()
        .filter(|r| !r.kind.is_empty())
        .map(|r| (r.identity(), r))
        .collect();

    let pairs: Vec<(&Resource, &Resource, &str)> = baseline
        .iter()
        .filter(|r| !r.kind.is_empty())
        .filter_map(|base| {
            let mark = by_identity.get(&base.identity())?;
            let id = id_map.get(&base.identity())?;
            Some((base, *mark, id.as_str()))
        })
        .collect();

    let mut mappings = diff_pairs(&pairs);
    sort_mappings(&mut mappings);
    mappings
}

#[cfg(feature = "parallel")]
fn diff_pairs(pairs: &[(&Resource, &Resource, &str)]) -> Vec<FieldMapping> {
    use rayon::prelude::*;
    pairs
        .par_iter()
        .flat_map_iter(|(base, mark, id)| diff_pair(base, mark, id))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn diff_pairs(pairs: &[(&Resource, &Resource, &str)]) -> Vec<FieldMapping> {
    pairs
        .iter()
        .flat_map(|(base, mark, id)| diff_pair(base, mark, id))
        .collect()
}

fn diff_pair(base: &Resource, mark: &Resource, id: &str) -> Vec<FieldMapping> {
    let mut found = Vec::new();
    let mut segs = Vec::new();
    diff_value(Some(&base.tree), &mark.tree, &mut segs, &mut found);

    let mut mappings = Vec::new();
    for f in found {
        let markers = extract_markers(&f.rendered);
        if markers.is_empty() {
            // The field changed but carries no marker: the template derived
            // it from something other than a parameter.
            continue;
        }
        if markers.len() == 1 && f.rendered == marker(&markers[0]) {
            mappings.push(FieldMapping {
                values_path: markers[0].clone(),
                resource_id: id.to_string(),
                field_path: f.field_path.clone(),
                match_type: MatchType::Exact,
                sentinel_rendered: None,
            });
            continue;
        }
        let mut distinct = markers;
        distinct.sort();
        distinct.dedup();
        for path in distinct {
            mappings.push(FieldMapping {
                values_path: path,
                resource_id: id.to_string(),
                field_path: f.field_path.clone(),
                match_type: MatchType::Substring,
                sentinel_rendered: Some(f.rendered.clone()),
            });
        }
    }
    mappings
}

/// Walk baseline and marker-rendered trees in lockstep.
///
/// `base = None` means the position exists only in the marker render.
fn diff_value(base: Option<&Value>, mark: &Value, segs: &mut Vec<PathSeg>, found: &mut Vec<Found>) {
    let mark = untag(mark);
    match mark {
        Value::Mapping(mark_map) => match base.map(untag).and_then(Value::as_mapping) {
            Some(base_map) => {
                for (k, child) in mark_map {
                    segs.push(PathSeg::Key(key_to_string(k)));
                    diff_value(base_map.get(k), child, segs, found);
                    segs.pop();
                }
            }
            None => collect_new(mark, segs, found),
        },
        Value::Sequence(mark_seq) => match base.map(untag).and_then(Value::as_sequence) {
            Some(base_seq) => {
                for (i, child) in mark_seq.iter().enumerate() {
                    segs.push(PathSeg::Index(i));
                    // Trailing marker-rendered elements are new.
                    diff_value(base_seq.get(i), child, segs, found);
                    segs.pop();
                }
            }
            None => collect_new(mark, segs, found),
        },
        scalar => {
            let changed = match base.map(untag) {
                Some(b) => b != scalar,
                None => true,
            };
            if changed {
                // The template may have coerced the marker to a non-string
                // scalar; stringify before scanning.
                if let Some(rendered) = scalar_to_string(scalar) {
                    found.push(Found {
                        field_path: path_to_string(segs),
                        rendered,
                    });
                }
            }
        }
    }
}

/// A subtree present only in the marker render: scan all of its scalars.
fn collect_new(mark: &Value, segs: &mut Vec<PathSeg>, found: &mut Vec<Found>) {
    match untag(mark) {
        Value::Mapping(m) => {
            for (k, child) in m {
                segs.push(PathSeg::Key(key_to_string(k)));
                collect_new(child, segs, found);
                segs.pop();
            }
        }
        Value::Sequence(seq) => {
            for (i, child) in seq.iter().enumerate() {
                segs.push(PathSeg::Index(i));
                collect_new(child, segs, found);
                segs.pop();
            }
        }
        scalar => {
            if let Some(rendered) = scalar_to_string(scalar) {
                found.push(Found {
                    field_path: path_to_string(segs),
                    rendered,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn res(kind: &str, name: &str, body: &str) -> Resource {
        let tree = parse(&format!(
            "apiVersion: apps/v1\nkind: {kind}\nmetadata:\n  name: {name}\n{body}"
        ));
        Resource::from_tree(tree, None).unwrap()
    }

    fn id_map(entries: &[(&Resource, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(r, id)| (r.identity(), id.to_string()))
            .collect()
    }

    #[test]
    fn sentinelise_marks_scalars_and_keeps_sequences() {
        let v = parse("replicaCount: 3\nimage:\n  tag: \"1.25\"\nargs:\n  - a\n  - b\n");
        let s = sentinelise(&v);
        assert_eq!(
            crate::value::get_path(&s, "replicaCount").unwrap().as_str(),
            Some("__SENTINEL_replicaCount__")
        );
        assert_eq!(
            crate::value::get_path(&s, "image.tag").unwrap().as_str(),
            Some("__SENTINEL_image.tag__")
        );
        assert_eq!(
            crate::value::get_path(&s, "args").unwrap(),
            crate::value::get_path(&v, "args").unwrap()
        );
        // Original untouched.
        assert_eq!(
            crate::value::get_path(&v, "replicaCount").unwrap().as_i64(),
            Some(3)
        );
    }

    #[test]
    fn sentinelise_is_idempotent() {
        let v = parse("a: 1\nb:\n  c: x\n");
        let once = sentinelise(&v);
        assert_eq!(sentinelise(&once), once);
    }

    #[test]
    fn markers_extract_left_to_right() {
        let s = "__SENTINEL_image.repository__:__SENTINEL_image.tag__";
        assert_eq!(extract_markers(s), vec!["image.repository", "image.tag"]);
    }

    #[test]
    fn exact_scalar_substitution() {
        let base = res("Deployment", "web", "spec:\n  replicas: 3\n");
        let mark = res(
            "Deployment",
            "web",
            "spec:\n  replicas: __SENTINEL_replicaCount__\n",
        );
        let ids = id_map(&[(&base, "webDeployment")]);
        let m = diff_all_resources(
            std::slice::from_ref(&base),
            std::slice::from_ref(&mark),
            &ids,
        );
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].values_path, "replicaCount");
        assert_eq!(m[0].field_path, "spec.replicas");
        assert_eq!(m[0].match_type, MatchType::Exact);
        assert!(m[0].sentinel_rendered.is_none());
    }

    #[test]
    fn interpolation_yields_substring_pair() {
        let base = res("Deployment", "web", "spec:\n  image: \"nginx:1.25\"\n");
        let mark = res(
            "Deployment",
            "web",
            "spec:\n  image: \"__SENTINEL_image.repository__:__SENTINEL_image.tag__\"\n",
        );
        let ids = id_map(&[(&base, "webDeployment")]);
        let m = diff_all_resources(
            std::slice::from_ref(&base),
            std::slice::from_ref(&mark),
            &ids,
        );
        assert_eq!(m.len(), 2);
        assert!(m
            .iter()
            .all(|x| x.match_type == MatchType::Substring && x.field_path == "spec.image"));
        assert_eq!(m[0].values_path, "image.repository");
        assert_eq!(m[1].values_path, "image.tag");
        assert_eq!(
            m[0].sentinel_rendered.as_deref(),
            Some("__SENTINEL_image.repository__:__SENTINEL_image.tag__")
        );
    }

    #[test]
    fn unmatched_baseline_resource_contributes_nothing() {
        let base = res("Deployment", "web", "spec:\n  replicas: 3\n");
        let ids = id_map(&[(&base, "webDeployment")]);
        let m = diff_all_resources(std::slice::from_ref(&base), &[], &ids);
        assert!(m.is_empty());
    }

    #[test]
    fn key_only_in_marker_render_is_scanned() {
        let base = res("Deployment", "web", "spec: {}\n");
        let mark = res(
            "Deployment",
            "web",
            "spec:\n  extra: __SENTINEL_feature.flag__\n",
        );
        let ids = id_map(&[(&base, "webDeployment")]);
        let m = diff_all_resources(
            std::slice::from_ref(&base),
            std::slice::from_ref(&mark),
            &ids,
        );
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].values_path, "feature.flag");
        assert_eq!(m[0].field_path, "spec.extra");
    }

    #[test]
    fn changed_field_without_marker_is_ignored() {
        let base = res("Deployment", "web", "spec:\n  stamp: a\n");
        let mark = res("Deployment", "web", "spec:\n  stamp: b\n");
        let ids = id_map(&[(&base, "webDeployment")]);
        let m = diff_all_resources(
            std::slice::from_ref(&base),
            std::slice::from_ref(&mark),
            &ids,
        );
        assert!(m.is_empty());
    }

    #[test]
    fn trailing_sequence_elements_are_new() {
        let base = res("Deployment", "web", "spec:\n  args:\n    - keep\n");
        let mark = res(
            "Deployment",
            "web",
            "spec:\n  args:\n    - keep\n    - __SENTINEL_extraArg__\n",
        );
        let ids = id_map(&[(&base, "webDeployment")]);
        let m = diff_all_resources(
            std::slice::from_ref(&base),
            std::slice::from_ref(&mark),
            &ids,
        );
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].field_path, "spec.args[1]");
        assert_eq!(m[0].values_path, "extraArg");
    }

    proptest! {
        #[test]
        fn marker_round_trips_any_path(segs in proptest::collection::vec("[a-z][a-z0-9]{0,6}", 1..4)) {
            let path = segs.join(".");
            let found = extract_markers(&marker(&path));
            prop_assert_eq!(found, vec![path]);
        }

        #[test]
        fn literals_between_markers_are_ignored(lit in "[ /=,A-Za-z0-9-]{0,8}") {
            let s = format!("{}{}{}", marker("a.b"), lit, marker("c"));
            let found = extract_markers(&s);
            prop_assert_eq!(found, vec!["a.b".to_string(), "c".to_string()]);
        }
    }
}

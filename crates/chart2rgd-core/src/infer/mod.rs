//! Parameter-use inference.
//!
//! Two interchangeable strategies discover which resource fields are
//! controlled by which parameter paths: [`sentinel`] re-renders the chart
//! with marker values and diffs, [`ast`] scans template source for
//! `.Values` accessors. Both emit the same [`FieldMapping`] record, so
//! downstream consumers cannot tell which strategy produced a mapping.

use serde_yaml::Value;

use crate::value::{key_to_string, path_to_string, untag, PathSeg};

pub mod ast;
pub mod sentinel;

/// How a parameter relates to a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchType {
    /// The entire field value equals the parameter.
    Exact,
    /// The field value is a string containing the parameter, possibly
    /// alongside other parameters (interpolation).
    Substring,
}

/// One inferred binding from a parameter path to a resource field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    /// Dot-path into the parameter tree.
    pub values_path: String,
    pub resource_id: String,
    /// Dot-path into the resource's object tree (`a.b[0].c` form).
    pub field_path: String,
    pub match_type: MatchType,
    /// The marker-rendered string, kept so interpolation positions can be
    /// reconstructed. Present only for sentinel `Substring` matches.
    pub sentinel_rendered: Option<String>,
}

/// Sort into the canonical emission order and drop duplicates.
///
/// The order (resource id, field path, values path) is what keeps the
/// final output byte-stable regardless of discovery order — including
/// when the sentinel diff ran on parallel workers.
pub fn sort_mappings(mappings: &mut Vec<FieldMapping>) {
    mappings.sort_by(|a, b| {
        (&a.resource_id, &a.field_path, &a.values_path, a.match_type).cmp(&(
            &b.resource_id,
            &b.field_path,
            &b.values_path,
            b.match_type,
        ))
    });
    mappings.dedup_by(|a, b| {
        a.resource_id == b.resource_id
            && a.field_path == b.field_path
            && a.values_path == b.values_path
            && a.match_type == b.match_type
    });
}

/// Visit every scalar in the tree with its dot-path.
pub(crate) fn for_each_scalar<F>(root: &Value, f: &mut F)
where
    F: FnMut(&str, &Value),
{
    let mut segs = Vec::new();
    walk(root, &mut segs, f);
}

fn walk<F>(v: &Value, segs: &mut Vec<PathSeg>, f: &mut F)
where
    F: FnMut(&str, &Value),
{
    match untag(v) {
        Value::Mapping(m) => {
            for (k, child) in m {
                segs.push(PathSeg::Key(key_to_string(k)));
                walk(child, segs, f);
                segs.pop();
            }
        }
        Value::Sequence(seq) => {
            for (i, child) in seq.iter().enumerate() {
                segs.push(PathSeg::Index(i));
                walk(child, segs, f);
                segs.pop();
            }
        }
        scalar => f(&path_to_string(segs), scalar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping(res: &str, field: &str, vp: &str) -> FieldMapping {
        FieldMapping {
            values_path: vp.to_string(),
            resource_id: res.to_string(),
            field_path: field.to_string(),
            match_type: MatchType::Exact,
            sentinel_rendered: None,
        }
    }

    #[test]
    fn sort_order_is_resource_field_values() {
        let mut m = vec![
            mapping("b", "x", "p"),
            mapping("a", "y", "p"),
            mapping("a", "x", "q"),
            mapping("a", "x", "p"),
        ];
        sort_mappings(&mut m);
        let keys: Vec<(&str, &str, &str)> = m
            .iter()
            .map(|m| {
                (
                    m.resource_id.as_str(),
                    m.field_path.as_str(),
                    m.values_path.as_str(),
                )
            })
            .collect();
        assert_eq!(
            keys,
            vec![("a", "x", "p"), ("a", "x", "q"), ("a", "y", "p"), ("b", "x", "p")]
        );
    }

    #[test]
    fn duplicates_collapse() {
        let mut m = vec![mapping("a", "x", "p"), mapping("a", "x", "p")];
        sort_mappings(&mut m);
        assert_eq!(m.len(), 1);
    }
}

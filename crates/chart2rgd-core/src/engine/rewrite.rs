//! Field rewriting.
//!
//! Turns inferred mappings into symbolic expressions in place. An `Exact`
//! mapping replaces the whole field; `Substring` mappings reconstruct the
//! interpolated string from the preserved marker render, or — on the AST
//! path, where no marker render exists — by substituting the leaf value
//! inside the current string. Fields behind missing paths were
//! conditionally absent: setting them is a silent no-op.

use std::collections::BTreeMap;

use serde_yaml::Value;

use crate::infer::{sentinel, FieldMapping, MatchType};
use crate::resource::Resource;
use crate::schema::flat_name;
use crate::value::{get_path, scalar_to_string, set_path};

/// The `${schema.spec.…}` expression bound to a values path.
///
/// Flat naming changes the declared schema field, so the expression has
/// to follow it or the reference would dangle.
pub(crate) fn expr_for(values_path: &str, flat_names: bool) -> String {
    if flat_names {
        format!("${{schema.spec.{}}}", flat_name(values_path))
    } else {
        format!("${{schema.spec.{values_path}}}")
    }
}

/// Apply every mapping to its resource tree.
pub fn rewrite_fields(
    resources: &mut [(String, Resource)],
    mappings: &[FieldMapping],
    values: &Value,
    flat_names: bool,
) {
    let mut groups: BTreeMap<(&str, &str), Vec<&FieldMapping>> = BTreeMap::new();
    for m in mappings {
        groups
            .entry((m.resource_id.as_str(), m.field_path.as_str()))
            .or_default()
            .push(m);
    }

    for ((rid, field), group) in groups {
        let Some((_, resource)) = resources.iter_mut().find(|(id, _)| id.as_str() == rid)
        else {
            continue;
        };

        // An exact binding owns the whole field.
        if let Some(exact) = group.iter().find(|m| m.match_type == MatchType::Exact) {
            set_path(
                &mut resource.tree,
                field,
                Value::String(expr_for(&exact.values_path, flat_names)),
            );
            continue;
        }

        // Interpolation: rebuild from the marker render when we have it.
        if let Some(rendered) = group.iter().find_map(|m| m.sentinel_rendered.as_deref()) {
            let rebuilt = sentinel::replace_markers(rendered, |p| expr_for(p, flat_names));
            set_path(&mut resource.tree, field, Value::String(rebuilt));
            continue;
        }

        // AST path: substitute each leaf value inside the current string.
        let Some(mut current) = get_path(&resource.tree, field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
        else {
            continue;
        };
        for m in group {
            let Some(leaf) = get_path(values, &m.values_path).and_then(scalar_to_string)
            else {
                continue;
            };
            if leaf.is_empty() {
                continue;
            }
            current = current.replace(&leaf, &expr_for(&m.values_path, flat_names));
        }
        set_path(&mut resource.tree, field, Value::String(current));
    }
}

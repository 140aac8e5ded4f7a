//! Generic object-tree helpers.
//!
//! Rendered resources, values documents and the assembled output document
//! all share one representation: `serde_yaml::Value`. This module provides
//! the path addressing, deterministic conversions and tree walks the rest
//! of the pipeline builds on.
//!
//! Path notation: dot-separated mapping keys with `[n]` sequence indexing,
//! e.g. `spec.template.spec.containers[0].image`. Keys containing a literal
//! dot cannot be addressed this way; callers treat such paths as absent.

use serde_yaml::{Mapping, Value};

use crate::errors::{ConvertError, ConvertResult};

/// One step of a parsed field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

/// Parse `a.b[0].c` into segments.
///
/// Empty segments (leading/trailing/double dots) are dropped. A malformed
/// index suffix is treated as part of the key.
pub fn parse_path(path: &str) -> Vec<PathSeg> {
    let mut segs = Vec::new();
    for raw in path.split('.') {
        if raw.is_empty() {
            continue;
        }
        let mut rest = raw;
        // Peel `key[i][j]…` into a key followed by indices.
        if let Some(open) = rest.find('[') {
            let (key, mut tail) = rest.split_at(open);
            if !key.is_empty() {
                segs.push(PathSeg::Key(key.to_string()));
            }
            loop {
                let Some(close) = tail.find(']') else { break };
                match tail[1..close].parse::<usize>() {
                    Ok(i) => segs.push(PathSeg::Index(i)),
                    Err(_) => {
                        segs.push(PathSeg::Key(tail.to_string()));
                        tail = "";
                        break;
                    }
                }
                tail = &tail[close + 1..];
                if tail.is_empty() || !tail.starts_with('[') {
                    break;
                }
            }
            rest = tail;
            if !rest.is_empty() {
                segs.push(PathSeg::Key(rest.to_string()));
            }
        } else {
            segs.push(PathSeg::Key(rest.to_string()));
        }
    }
    segs
}

/// Render segments back to `a.b[0].c` form.
pub fn path_to_string(segs: &[PathSeg]) -> String {
    let mut out = String::new();
    for seg in segs {
        match seg {
            PathSeg::Key(k) => {
                if !out.is_empty() {
                    out.push('.');
                }
                out.push_str(k);
            }
            PathSeg::Index(i) => {
                out.push('[');
                out.push_str(&i.to_string());
                out.push(']');
            }
        }
    }
    out
}

/// Look up a mapping entry by string key.
///
/// `serde_yaml::Mapping` is keyed by `Value`; every lookup in this crate
/// goes through here so key construction stays in one place.
pub fn map_get<'a>(m: &'a Mapping, key: &str) -> Option<&'a Value> {
    m.get(Value::String(key.to_string()))
}

pub fn map_get_mut<'a>(m: &'a mut Mapping, key: &str) -> Option<&'a mut Value> {
    m.get_mut(Value::String(key.to_string()))
}

pub fn map_insert(m: &mut Mapping, key: &str, v: Value) {
    m.insert(Value::String(key.to_string()), v);
}

/// Strip a `Tagged` wrapper, if any.
pub fn untag(v: &Value) -> &Value {
    match v {
        Value::Tagged(t) => &t.value,
        other => other,
    }
}

/// Navigate to the value at `path`, or `None` if any step is absent.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for seg in parse_path(path) {
        cur = untag(cur);
        match seg {
            PathSeg::Key(k) => cur = map_get(cur.as_mapping()?, &k)?,
            PathSeg::Index(i) => cur = cur.as_sequence()?.get(i)?,
        }
    }
    Some(cur)
}

/// Replace the value at `path` in place.
///
/// Returns `false` without mutating anything when the path does not exist
/// (a conditionally absent field): setting through a missing path is a
/// silent no-op by contract.
pub fn set_path(root: &mut Value, path: &str, new: Value) -> bool {
    let segs = parse_path(path);
    if segs.is_empty() {
        return false;
    }
    let mut cur = root;
    for seg in &segs[..segs.len() - 1] {
        let step = match seg {
            PathSeg::Key(k) => match cur.as_mapping_mut() {
                Some(m) => map_get_mut(m, k),
                None => None,
            },
            PathSeg::Index(i) => match cur.as_sequence_mut() {
                Some(s) => s.get_mut(*i),
                None => None,
            },
        };
        match step {
            Some(next) => cur = next,
            None => return false,
        }
    }
    match &segs[segs.len() - 1] {
        PathSeg::Key(k) => match cur.as_mapping_mut() {
            Some(m) => match map_get_mut(m, k) {
                Some(slot) => {
                    *slot = new;
                    true
                }
                None => false,
            },
            None => false,
        },
        PathSeg::Index(i) => match cur.as_sequence_mut() {
            Some(s) => match s.get_mut(*i) {
                Some(slot) => {
                    *slot = new;
                    true
                }
                None => false,
            },
            None => false,
        },
    }
}

/// True for null, bool, number and string values.
pub fn is_scalar(v: &Value) -> bool {
    matches!(
        untag(v),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
    )
}

/// Stringify a scalar the way template output would coerce it.
///
/// Returns `None` for mappings and sequences.
pub fn scalar_to_string(v: &Value) -> Option<String> {
    match untag(v) {
        Value::Null => Some("null".to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}

/// Mapping keys as strings, in insertion order.
///
/// Non-string keys are serialized to their YAML form, matching how the
/// canonical serializer and the diff walk see them.
pub fn key_to_string(k: &Value) -> String {
    match k {
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .unwrap_or_else(|_| "<key>".to_string())
            .trim()
            .to_string(),
    }
}

/// Visit every string scalar in the tree with its dot-path.
pub fn for_each_string<F>(root: &Value, f: &mut F)
where
    F: FnMut(&str, &str),
{
    let mut segs = Vec::new();
    walk_strings(root, &mut segs, f);
}

fn walk_strings<F>(v: &Value, segs: &mut Vec<PathSeg>, f: &mut F)
where
    F: FnMut(&str, &str),
{
    match untag(v) {
        Value::String(s) => f(&path_to_string(segs), s),
        Value::Mapping(m) => {
            for (k, child) in m {
                segs.push(PathSeg::Key(key_to_string(k)));
                walk_strings(child, segs, f);
                segs.pop();
            }
        }
        Value::Sequence(seq) => {
            for (i, child) in seq.iter().enumerate() {
                segs.push(PathSeg::Index(i));
                walk_strings(child, segs, f);
                segs.pop();
            }
        }
        _ => {}
    }
}

/// Convert a YAML tree to JSON deterministically.
///
/// Non-string mapping keys are stringified; floats that JSON cannot
/// represent (NaN, infinities) are rejected.
pub fn yaml_to_json(v: &Value) -> ConvertResult<serde_json::Value> {
    match untag(v) {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(serde_json::Value::Number(i.into()))
            } else if let Some(u) = n.as_u64() {
                Ok(serde_json::Value::Number(serde_json::Number::from(u)))
            } else if let Some(f) = n.as_f64() {
                serde_json::Number::from_f64(f)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| {
                        ConvertError::SerializationFailed("non-finite float in tree".to_string())
                    })
            } else {
                Err(ConvertError::SerializationFailed(
                    "unknown numeric type in tree".to_string(),
                ))
            }
        }
        Value::String(s) => Ok(serde_json::Value::String(s.clone())),
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.push(yaml_to_json(item)?);
            }
            Ok(serde_json::Value::Array(out))
        }
        Value::Mapping(map) => {
            let mut obj = serde_json::Map::new();
            for (k, child) in map {
                obj.insert(key_to_string(k), yaml_to_json(child)?);
            }
            Ok(serde_json::Value::Object(obj))
        }
        Value::Tagged(_) => Err(ConvertError::SerializationFailed(
            "unsupported tagged value in tree".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn parse_path_handles_indices() {
        let segs = parse_path("spec.containers[0].image");
        assert_eq!(
            segs,
            vec![
                PathSeg::Key("spec".into()),
                PathSeg::Key("containers".into()),
                PathSeg::Index(0),
                PathSeg::Key("image".into()),
            ]
        );
        assert_eq!(path_to_string(&segs), "spec.containers[0].image");
    }

    #[test]
    fn get_and_set_through_sequences() {
        let mut v = parse("spec:\n  containers:\n    - image: nginx\n    - image: redis\n");
        assert_eq!(
            get_path(&v, "spec.containers[1].image").and_then(|x| x.as_str()),
            Some("redis")
        );
        assert!(set_path(
            &mut v,
            "spec.containers[0].image",
            Value::String("busybox".into())
        ));
        assert_eq!(
            get_path(&v, "spec.containers[0].image").and_then(|x| x.as_str()),
            Some("busybox")
        );
    }

    #[test]
    fn set_missing_path_is_noop() {
        let mut v = parse("a: 1\n");
        let before = v.clone();
        assert!(!set_path(&mut v, "a.b.c", Value::Null));
        assert!(!set_path(&mut v, "b", Value::Null));
        assert!(!set_path(&mut v, "a[3]", Value::Null));
        assert_eq!(v, before);
    }

    #[test]
    fn scalar_stringification() {
        assert_eq!(scalar_to_string(&Value::Bool(true)).unwrap(), "true");
        assert_eq!(scalar_to_string(&parse("3")).unwrap(), "3");
        assert_eq!(scalar_to_string(&parse("1.25")).unwrap(), "1.25");
        assert_eq!(scalar_to_string(&Value::Null).unwrap(), "null");
        assert!(scalar_to_string(&parse("[1]")).is_none());
    }

    #[test]
    fn string_walk_reports_paths() {
        let v = parse("a:\n  b:\n    - x\n    - y\nc: z\n");
        let mut seen = Vec::new();
        for_each_string(&v, &mut |path, s| seen.push((path.to_string(), s.to_string())));
        assert_eq!(
            seen,
            vec![
                ("a.b[0]".to_string(), "x".to_string()),
                ("a.b[1]".to_string(), "y".to_string()),
                ("c".to_string(), "z".to_string()),
            ]
        );
    }

    #[test]
    fn yaml_to_json_is_faithful() {
        let v = parse("a: 1\nb: [true, 1.5]\nc: null\n");
        let j = yaml_to_json(&v).unwrap();
        assert_eq!(j["a"], serde_json::json!(1));
        assert_eq!(j["b"][0], serde_json::json!(true));
        assert_eq!(j["c"], serde_json::Value::Null);
    }
}

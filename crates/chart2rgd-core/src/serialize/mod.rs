//! Canonical serialization.
//!
//! Deterministic textual output from a generic tree, in three formats:
//! block-structured YAML, JSON, and a per-resource split. All three share
//! one canonicalization pass: mapping keys sorted code-point-ascending,
//! null entries elided (and mappings emptied by elision elided with them),
//! null sequence elements dropped. Identical input produces byte-identical
//! output, and parsing the output back yields the canonicalized tree.

use itertools::Itertools;
use serde_yaml::{Mapping, Value};

use crate::value::{key_to_string, untag};

mod json;
mod split;
mod yaml;

pub use json::{to_compact_json_string, to_json_bytes};
pub use split::{split_document, SplitFile, CATALOG_FILE};
pub use yaml::to_yaml_bytes;

/// Serializer options.
#[derive(Debug, Clone)]
pub struct SerializeOptions {
    /// Emit an explanatory comment above every `${…}` mapping value.
    pub annotate_expressions: bool,
    /// Spaces per nesting level.
    pub indent: usize,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            annotate_expressions: false,
            indent: 2,
        }
    }
}

/// Canonicalize a tree: sort mapping keys, elide nulls.
///
/// Returns `None` when the value elides away entirely (null, or a mapping
/// left empty after elision).
pub fn canonicalize(v: &Value) -> Option<Value> {
    match untag(v) {
        Value::Null => None,
        Value::Mapping(map) => {
            let entries: Vec<(String, Value)> = map
                .iter()
                .filter_map(|(k, child)| canonicalize(child).map(|c| (key_to_string(k), c)))
                .sorted_by(|a, b| a.0.cmp(&b.0))
                .collect();
            if entries.is_empty() {
                return None;
            }
            let mut out = Mapping::new();
            for (k, c) in entries {
                out.insert(Value::String(k), c);
            }
            Some(Value::Mapping(out))
        }
        Value::Sequence(seq) => {
            let kept: Vec<Value> = seq.iter().filter_map(canonicalize).collect();
            Some(Value::Sequence(kept))
        }
        scalar => Some(scalar.clone()),
    }
}

/// Extract the inner form of a single-expression string.
///
/// Returns `Some("schema.spec.x")` for `"${schema.spec.x}"`; `None` for
/// anything else, including interpolations carrying more than one
/// expression.
pub(crate) fn expression_inner(s: &str) -> Option<&str> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    if inner.contains('{') || inner.contains('}') {
        return None;
    }
    Some(inner)
}

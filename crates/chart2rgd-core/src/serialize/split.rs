//! Per-resource split output.
//!
//! Emits one fully self-contained document per resource plus a catalog
//! file listing the generated names in emission order (the topological
//! order of the input document).

use std::collections::BTreeSet;

use serde_yaml::{Mapping, Value};

use crate::errors::{ConvertError, ConvertResult};
use crate::value::{get_path, map_insert, set_path, untag};

use super::{to_yaml_bytes, SerializeOptions};

/// Name of the catalog file appended after the per-resource files.
pub const CATALOG_FILE: &str = "index.yaml";

/// One emitted file.
#[derive(Debug, Clone)]
pub struct SplitFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Split an assembled document into per-resource files plus a catalog.
///
/// Fails with [`ConvertError::EmptyResources`] when `spec.resources` is
/// missing or empty.
pub fn split_document(doc: &Value, opts: &SerializeOptions) -> ConvertResult<Vec<SplitFile>> {
    let resources = get_path(doc, "spec.resources")
        .and_then(|v| untag(v).as_sequence())
        .filter(|s| !s.is_empty())
        .ok_or(ConvertError::EmptyResources)?
        .clone();

    let mut used: BTreeSet<String> = BTreeSet::new();
    let mut files = Vec::with_capacity(resources.len() + 1);
    let mut names = Vec::with_capacity(resources.len());

    for entry in &resources {
        let id = get_path(entry, "id")
            .and_then(|v| untag(v).as_str())
            .unwrap_or("resource");
        let base = file_stem(id);
        let mut stem = base.clone();
        let mut n = 2;
        while !used.insert(stem.clone()) {
            stem = format!("{base}-{n}");
            n += 1;
        }
        let name = format!("{stem}.yaml");

        let mut single = doc.clone();
        if !set_path(
            &mut single,
            "spec.resources",
            Value::Sequence(vec![entry.clone()]),
        ) {
            return Err(ConvertError::SerializationFailed(
                "document lost spec.resources during split".to_string(),
            ));
        }
        files.push(SplitFile {
            name: name.clone(),
            bytes: to_yaml_bytes(&single, opts)?,
        });
        names.push(name);
    }

    let mut catalog = Mapping::new();
    map_insert(
        &mut catalog,
        "resources",
        Value::Sequence(names.into_iter().map(Value::String).collect()),
    );
    files.push(SplitFile {
        name: CATALOG_FILE.to_string(),
        bytes: to_yaml_bytes(&Value::Mapping(catalog), opts)?,
    });

    Ok(files)
}

/// Lowercase the id and keep only filesystem-safe characters.
fn file_stem(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.to_ascii_lowercase().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c);
        } else {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "resource".to_string()
    } else {
        trimmed
    }
}

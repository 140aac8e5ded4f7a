//! Rendered-resource and chart-metadata models.
//!
//! A [`Resource`] is one parsed orchestration object. The typed fields are
//! projections of the object tree taken at construction time; the tree
//! itself stays authoritative and is what the rewrite pass mutates and the
//! assembler copies into the output document.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_yaml::Value;

use crate::errors::{ConvertError, ConvertResult};
use crate::value::{map_get, untag};

/// One parsed orchestration object.
#[derive(Debug, Clone)]
pub struct Resource {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    /// The full nested document.
    pub tree: Value,
    /// Template file that produced this object, when known.
    pub source_path: Option<String>,
}

impl Resource {
    /// Build a resource from a parsed document tree.
    ///
    /// Fails when `apiVersion`, `kind` or `metadata.name` is missing or
    /// empty; those three form the identity key used to match resources
    /// across renders.
    pub fn from_tree(tree: Value, source_path: Option<String>) -> ConvertResult<Self> {
        let map = tree
            .as_mapping()
            .ok_or_else(|| ConvertError::ParseFailed("document is not a mapping".to_string()))?;

        let api_version = string_field(map, "apiVersion")?;
        let kind = string_field(map, "kind")?;

        let metadata = map_get(map, "metadata").and_then(|v| untag(v).as_mapping());
        let name = metadata
            .and_then(|m| map_get(m, "name"))
            .and_then(|v| untag(v).as_str())
            .unwrap_or("")
            .to_string();
        if name.is_empty() {
            return Err(ConvertError::ParseFailed(format!(
                "{kind} document has no metadata.name"
            )));
        }

        let namespace = metadata
            .and_then(|m| map_get(m, "namespace"))
            .and_then(|v| untag(v).as_str())
            .map(|s| s.to_string());

        let labels = string_map(metadata.and_then(|m| map_get(m, "labels")));
        let annotations = string_map(metadata.and_then(|m| map_get(m, "annotations")));

        Ok(Self {
            api_version,
            kind,
            name,
            namespace,
            labels,
            annotations,
            tree,
            source_path,
        })
    }

    /// Stable identity key: `<apiVersion>/<kind>/<name>`.
    ///
    /// Resources are matched across renders by this key, never by position,
    /// because marker substitution can change conditional rendering.
    pub fn identity(&self) -> String {
        format!("{}/{}/{}", self.api_version, self.kind, self.name)
    }

    /// API group and version, split on the first `/`.
    pub fn group_version(&self) -> (Option<&str>, &str) {
        match self.api_version.split_once('/') {
            Some((g, v)) => (Some(g), v),
            None => (None, self.api_version.as_str()),
        }
    }
}

fn string_field(map: &serde_yaml::Mapping, key: &str) -> ConvertResult<String> {
    let s = map_get(map, key)
        .and_then(|v| untag(v).as_str())
        .unwrap_or("");
    if s.is_empty() {
        return Err(ConvertError::ParseFailed(format!(
            "document has no {key}"
        )));
    }
    Ok(s.to_string())
}

fn string_map(v: Option<&Value>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    if let Some(m) = v.and_then(|v| untag(v).as_mapping()) {
        for (k, val) in m {
            if let (Some(k), Some(val)) = (untag(k).as_str(), untag(val).as_str()) {
                out.insert(k.to_string(), val.to_string());
            }
        }
    }
    out
}

/// Chart metadata carried into the output document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChartMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "appVersion")]
    pub app_version: Option<String>,
}

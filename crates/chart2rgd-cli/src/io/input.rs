//! Chart loading and values merging.
//!
//! The CLI resolves everything on disk into the in-memory shapes the core
//! consumes: chart metadata, the merged values tree, raw template sources
//! and the optional supplemental JSON-Schema.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use chart2rgd_core::resource::ChartMeta;
use chart2rgd_core::value::{map_get_mut, map_insert};

/// Everything read from a chart directory.
#[derive(Debug)]
pub struct LoadedChart {
    pub meta: ChartMeta,
    pub values: Value,
    pub values_schema: Option<serde_json::Value>,
    pub templates: BTreeMap<String, String>,
}

pub fn load_chart(dir: &Path) -> Result<LoadedChart> {
    let chart_yaml = dir.join("Chart.yaml");
    let meta: ChartMeta = serde_yaml::from_str(
        &fs::read_to_string(&chart_yaml)
            .with_context(|| format!("reading {}", chart_yaml.display()))?,
    )
    .with_context(|| format!("parsing {}", chart_yaml.display()))?;
    if meta.name.is_empty() {
        return Err(anyhow!("{} has no name", chart_yaml.display()));
    }

    let values_path = dir.join("values.yaml");
    let values: Value = if values_path.exists() {
        serde_yaml::from_str(
            &fs::read_to_string(&values_path)
                .with_context(|| format!("reading {}", values_path.display()))?,
        )
        .with_context(|| format!("parsing {}", values_path.display()))?
    } else {
        Value::Mapping(Mapping::new())
    };

    let schema_path = dir.join("values.schema.json");
    let values_schema = if schema_path.exists() {
        Some(
            serde_json::from_str(
                &fs::read_to_string(&schema_path)
                    .with_context(|| format!("reading {}", schema_path.display()))?,
            )
            .with_context(|| format!("parsing {}", schema_path.display()))?,
        )
    } else {
        None
    };

    let mut templates = BTreeMap::new();
    let templates_dir = dir.join("templates");
    if templates_dir.is_dir() {
        for entry in WalkDir::new(&templates_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(dir) else {
                continue;
            };
            // Binary template payloads are not scannable source.
            if let Ok(content) = fs::read_to_string(entry.path()) {
                templates.insert(rel.to_string_lossy().replace('\\', "/"), content);
            }
        }
    }

    Ok(LoadedChart {
        meta,
        values,
        values_schema,
        templates,
    })
}

/// Overlay values files and `--set` scalars onto the chart defaults.
///
/// Later overlays win; `--set` wins over every file.
pub fn merge_values(base: Value, overlays: &[String], sets: &[String]) -> Result<Value> {
    let mut merged = base;
    for path in overlays {
        let overlay: Value = serde_yaml::from_str(
            &fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        )
        .with_context(|| format!("parsing {path}"))?;
        deep_merge(&mut merged, overlay);
    }
    for expr in sets {
        apply_set(&mut merged, expr)?;
    }
    Ok(merged)
}

/// Mapping entries merge recursively; everything else replaces.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (k, v) in overlay_map {
                match base_map.get_mut(&k) {
                    Some(slot) => deep_merge(slot, v),
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Apply one `path=value` override, creating intermediate mappings.
pub fn apply_set(values: &mut Value, expr: &str) -> Result<()> {
    let (path, raw) = expr
        .split_once('=')
        .ok_or_else(|| anyhow!("--set {expr:?} is not path=value"))?;
    if path.is_empty() {
        return Err(anyhow!("--set {expr:?} has an empty path"));
    }
    let parsed: Value =
        serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    if !values.is_mapping() {
        *values = Value::Mapping(Mapping::new());
    }
    let mut cur = values;
    let segs: Vec<&str> = path.split('.').collect();
    for seg in &segs[..segs.len() - 1] {
        let map = cur
            .as_mapping_mut()
            .ok_or_else(|| anyhow!("--set {expr:?} crosses a non-mapping value"))?;
        if !matches!(
            map_get_mut(map, seg).map(|v| v.is_mapping()),
            Some(true)
        ) {
            map_insert(map, seg, Value::Mapping(Mapping::new()));
        }
        cur = map_get_mut(
            cur.as_mapping_mut()
                .ok_or_else(|| anyhow!("--set {expr:?} crosses a non-mapping value"))?,
            seg,
        )
        .ok_or_else(|| anyhow!("--set {expr:?} lost its path"))?;
    }
    let map = cur
        .as_mapping_mut()
        .ok_or_else(|| anyhow!("--set {expr:?} crosses a non-mapping value"))?;
    map_insert(map, segs[segs.len() - 1], parsed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn deep_merge_prefers_overlay_scalars() {
        let mut base = parse("a: 1\nimage:\n  repository: nginx\n  tag: \"1.25\"\n");
        deep_merge(&mut base, parse("image:\n  tag: \"1.26\"\nextra: true\n"));
        assert_eq!(
            chart2rgd_core::value::get_path(&base, "image.tag").unwrap().as_str(),
            Some("1.26")
        );
        assert_eq!(
            chart2rgd_core::value::get_path(&base, "image.repository")
                .unwrap()
                .as_str(),
            Some("nginx")
        );
        assert_eq!(
            chart2rgd_core::value::get_path(&base, "extra").unwrap().as_bool(),
            Some(true)
        );
    }

    #[test]
    fn set_overrides_keep_scalar_types() {
        let mut values = parse("replicaCount: 1\n");
        apply_set(&mut values, "replicaCount=5").unwrap();
        apply_set(&mut values, "image.tag=1.26.0").unwrap();
        assert_eq!(
            chart2rgd_core::value::get_path(&values, "replicaCount")
                .unwrap()
                .as_i64(),
            Some(5)
        );
        assert_eq!(
            chart2rgd_core::value::get_path(&values, "image.tag").unwrap().as_str(),
            Some("1.26.0")
        );
    }

    #[test]
    fn malformed_set_is_rejected() {
        let mut values = parse("a: 1\n");
        assert!(apply_set(&mut values, "no-equals").is_err());
        assert!(apply_set(&mut values, "=x").is_err());
    }

    #[test]
    fn chart_loading_reads_everything() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Chart.yaml"), "name: demo\nversion: 0.1.0\n").unwrap();
        fs::write(dir.path().join("values.yaml"), "replicaCount: 2\n").unwrap();
        fs::create_dir_all(dir.path().join("templates")).unwrap();
        fs::write(
            dir.path().join("templates/deploy.yaml"),
            "replicas: {{ .Values.replicaCount }}\n",
        )
        .unwrap();

        let chart = load_chart(dir.path()).unwrap();
        assert_eq!(chart.meta.name, "demo");
        assert_eq!(
            chart2rgd_core::value::get_path(&chart.values, "replicaCount")
                .unwrap()
                .as_i64(),
            Some(2)
        );
        assert!(chart.templates.contains_key("templates/deploy.yaml"));
        assert!(chart.values_schema.is_none());
    }
}

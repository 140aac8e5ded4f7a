use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use chart2rgd_core::assemble::{assemble, AssembleOptions};
use chart2rgd_core::engine::{convert, ConvertInput, ConvertOptions, Strategy};
use chart2rgd_core::errors::DiagnosticLevel;
use chart2rgd_core::manifest::{parse_manifests, partition_hooks};
use chart2rgd_core::render::{RenderRequest, Renderer};
use chart2rgd_core::schema::{SchemaOverride, SchemaType};
use chart2rgd_core::serialize::{
    split_document, to_json_bytes, to_yaml_bytes, SerializeOptions,
};
use chart2rgd_core::validate::{validate_document, FindingLevel};
use chart2rgd_core::ConvertError;

use crate::args::ConvertArgs;
use crate::io::input;
use crate::output::{self, OutputWriteError};
use crate::renderer::HelmRenderer;

#[derive(Debug, Serialize)]
pub struct ConvertOut {
    pub chart: String,
    pub version: String,
    pub resources: usize,
    pub schema_fields: usize,
    pub status_fields: usize,
    pub field_mappings: usize,
    pub warnings: usize,
    pub output: String,
    pub metadata: BTreeMap<String, String>,
}

pub fn run(args: &ConvertArgs) -> Result<()> {
    let strategy = match args.strategy.as_str() {
        "sentinel" => Strategy::Sentinel,
        "ast" => Strategy::Ast,
        other => {
            return Err(
                ConvertError::InvalidConfiguration(format!("unknown strategy {other:?}")).into(),
            )
        }
    };
    if args.format != "yaml" && args.format != "json" {
        return Err(ConvertError::InvalidConfiguration(format!(
            "unknown format {:?}",
            args.format
        ))
        .into());
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
    pb.enable_steady_tick(std::time::Duration::from_millis(80));

    pb.set_message("loading chart");
    let chart_dir = Path::new(&args.chart);
    let chart = input::load_chart(chart_dir)?;
    let values = input::merge_values(chart.values, &args.values, &args.set)?;

    pb.set_message("rendering baseline");
    let renderer = HelmRenderer::new(&args.helm_bin, chart_dir);
    let request = RenderRequest {
        values: &values,
        release_name: &args.release_name,
        namespace: args.namespace.as_deref(),
        strict: false,
        timeout_ms: args.timeout_ms,
    };
    let baseline = renderer.render(&request)?;

    pb.set_message("parsing manifests");
    let parsed = parse_manifests(&baseline)?;
    for diag in &parsed.diagnostics {
        if diag.level == DiagnosticLevel::Warning {
            output::warn_line(&diag.message);
        }
    }
    let resources = if args.include_hooks {
        parsed.resources
    } else {
        let (kept, hooks) = partition_hooks(parsed.resources);
        if !hooks.is_empty() {
            tracing::info!(hooks = hooks.len(), "excluded lifecycle hooks");
        }
        kept
    };
    if resources.is_empty() {
        return Err(ConvertError::NoResources.into());
    }

    pb.set_message("converting");
    let opts = ConvertOptions {
        strategy,
        include_all_params: args.include_all_params,
        flat_names: args.flat_names,
        id_overrides: parse_id_overrides(&args.id_overrides)?,
        schema_overrides: parse_schema_overrides(&args.schema_overrides)?,
        release_name: args.release_name.clone(),
        namespace: args.namespace.clone(),
        render_timeout_ms: args.timeout_ms,
        ..Default::default()
    };
    let input = ConvertInput {
        resources,
        values,
        values_schema: chart.values_schema,
        templates: chart.templates,
        chart: chart.meta.clone(),
    };
    let outcome = convert(input, &opts, Some(&renderer))?;
    for diag in &outcome.diagnostics {
        if diag.level == DiagnosticLevel::Warning {
            output::warn_line(&diag.message);
        }
    }

    pb.set_message("assembling");
    let assemble_opts = AssembleOptions {
        readiness_overrides: BTreeMap::new(),
        generated_at: args.timestamp.then(now_rfc3339).flatten(),
        flat_names: args.flat_names,
    };
    let doc = assemble(&outcome, &chart.meta, &assemble_opts)?;

    pb.set_message("validating");
    let report = validate_document(&doc);
    for finding in &report.findings {
        match finding.level {
            FindingLevel::Warning => output::warn_line(&finding.message),
            FindingLevel::Error => output::error_line(&finding.message),
        }
    }
    if !report.ok() {
        pb.finish_and_clear();
        return Err(ConvertError::ValidationFailed(report.error_count()).into());
    }

    pb.set_message("writing output");
    let serialize_opts = SerializeOptions {
        annotate_expressions: args.annotate,
        indent: 2,
    };
    let destination = write_output(args, &doc, &serialize_opts)?;
    pb.finish_and_clear();

    let warnings = outcome
        .diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warning)
        .count();
    let mut metadata = BTreeMap::new();
    metadata.insert("strategy".to_string(), args.strategy.clone());
    metadata.insert("format".to_string(), args.format.clone());
    output::print(&ConvertOut {
        chart: chart.meta.name.clone(),
        version: chart.meta.version.clone(),
        resources: outcome.order.len(),
        schema_fields: outcome.schema_fields.len(),
        status_fields: outcome.status_fields.len(),
        field_mappings: outcome.field_mappings.len(),
        warnings,
        output: destination,
        metadata,
    })?;
    Ok(())
}

fn now_rfc3339() -> Option<String> {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .ok()
}

fn parse_id_overrides(entries: &[String]) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for entry in entries {
        let (key, id) = entry.split_once('=').ok_or_else(|| {
            ConvertError::InvalidConfiguration(format!(
                "--id-override {entry:?} is not Kind/name=id"
            ))
        })?;
        out.insert(key.to_string(), id.to_string());
    }
    Ok(out)
}

fn parse_schema_overrides(entries: &[String]) -> Result<BTreeMap<String, SchemaOverride>> {
    let mut out = BTreeMap::new();
    for entry in entries {
        let (path, decl) = entry.split_once('=').ok_or_else(|| {
            ConvertError::InvalidConfiguration(format!(
                "--schema-override {entry:?} is not path=type[:default]"
            ))
        })?;
        let (type_name, default) = match decl.split_once(':') {
            Some((t, d)) => (t, Some(d)),
            None => (decl, None),
        };
        let field_type = SchemaType::parse(type_name).ok_or_else(|| {
            ConvertError::InvalidConfiguration(format!(
                "--schema-override {entry:?} has unknown type {type_name:?}"
            ))
        })?;
        let default = default.map(|d| {
            if field_type == SchemaType::String {
                format!("{d:?}")
            } else {
                d.to_string()
            }
        });
        out.insert(
            path.to_string(),
            SchemaOverride {
                field_type: Some(field_type),
                default,
                description: None,
            },
        );
    }
    Ok(out)
}

/// Write the document to stdout, a file, or a split directory; returns a
/// human-readable destination for the summary.
fn write_output(
    args: &ConvertArgs,
    doc: &serde_yaml::Value,
    opts: &SerializeOptions,
) -> Result<String> {
    if let Some(dir) = &args.split {
        let files = split_document(doc, opts)?;
        std::fs::create_dir_all(dir).map_err(|e| OutputWriteError {
            path: dir.clone(),
            source: e,
        })?;
        for file in &files {
            let path = Path::new(dir).join(&file.name);
            std::fs::write(&path, &file.bytes).map_err(|e| OutputWriteError {
                path: path.display().to_string(),
                source: e,
            })?;
        }
        return Ok(format!("{dir} ({} files)", files.len()));
    }

    let bytes = if args.format == "json" {
        to_json_bytes(doc, opts)?
    } else {
        to_yaml_bytes(doc, opts)?
    };

    match &args.output {
        Some(path) => {
            std::fs::write(path, &bytes).map_err(|e| OutputWriteError {
                path: path.clone(),
                source: e,
            })?;
            Ok(path.clone())
        }
        None => {
            std::io::stdout()
                .write_all(&bytes)
                .map_err(|e| OutputWriteError {
                    path: "<stdout>".to_string(),
                    source: e,
                })?;
            Ok("<stdout>".to_string())
        }
    }
}

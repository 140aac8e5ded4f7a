//! Manifest parsing and hook filtering.
//!
//! Operates on in-memory bytes only. The renderer hands back one multi-
//! document YAML stream; this module splits it, tracks the `# Source:`
//! comment helm prepends to each document, and parses each document into a
//! [`Resource`]. Documents that are not orchestration objects (missing
//! `apiVersion` or `kind`, empty, or null) are skipped with a diagnostic
//! rather than aborting the stream.

use crate::errors::{ConvertError, ConvertResult, Diagnostic};
use crate::resource::Resource;
use crate::value::{map_get, untag};

/// Annotation that marks a document as a lifecycle hook.
pub const HOOK_ANNOTATION: &str = "helm.sh/hook";

/// Parse result: resources plus skip notes.
#[derive(Debug, Default)]
pub struct ParsedManifests {
    pub resources: Vec<Resource>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Parse a multi-document YAML stream into resources.
pub fn parse_manifests(bytes: &[u8]) -> ConvertResult<ParsedManifests> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ConvertError::ParseFailed(format!("manifest stream is not UTF-8: {e}")))?;

    let mut out = ParsedManifests::default();

    for (idx, chunk) in split_documents(text).into_iter().enumerate() {
        let source = source_comment(&chunk);
        let body = chunk.trim();
        if body.is_empty() {
            continue;
        }

        let value: serde_yaml::Value = serde_yaml::from_str(body).map_err(|e| {
            ConvertError::ParseFailed(format!(
                "document {idx}{}: {e}",
                source
                    .as_deref()
                    .map(|s| format!(" ({s})"))
                    .unwrap_or_default()
            ))
        })?;

        if value.is_null() {
            continue;
        }

        let has_identity = untag(&value)
            .as_mapping()
            .map(|m| {
                map_get(m, "apiVersion").is_some_and(|v| untag(v).as_str().is_some())
                    && map_get(m, "kind").is_some_and(|v| untag(v).as_str().is_some())
            })
            .unwrap_or(false);
        if !has_identity {
            out.diagnostics.push(Diagnostic::warning(
                "manifest.skipped",
                format!("document {idx} has no apiVersion/kind, skipping"),
            ));
            continue;
        }

        match Resource::from_tree(value, source) {
            Ok(r) => out.resources.push(r),
            Err(e) => out.diagnostics.push(Diagnostic::warning(
                "manifest.skipped",
                format!("document {idx} skipped: {e}"),
            )),
        }
    }

    Ok(out)
}

/// Split a YAML stream on `---` document markers.
fn split_documents(text: &str) -> Vec<String> {
    let mut docs = Vec::new();
    let mut current = String::new();
    for line in text.lines() {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed.starts_with("--- ") {
            docs.push(std::mem::take(&mut current));
            if let Some(rest) = trimmed.strip_prefix("--- ") {
                current.push_str(rest);
                current.push('\n');
            }
        } else {
            current.push_str(line);
            current.push('\n');
        }
    }
    docs.push(current);
    docs
}

/// Extract helm's `# Source: <path>` comment from a document chunk.
fn source_comment(chunk: &str) -> Option<String> {
    for line in chunk.lines() {
        let trimmed = line.trim();
        if let Some(path) = trimmed.strip_prefix("# Source:") {
            return Some(path.trim().to_string());
        }
        if !trimmed.is_empty() && !trimmed.starts_with('#') {
            break;
        }
    }
    None
}

/// Partition resources into (kept, hooks).
///
/// A resource is a hook when it carries the `helm.sh/hook` annotation.
/// Hooks describe lifecycle actions, not steady-state topology, so they
/// are excluded from conversion unless the caller opts in.
pub fn partition_hooks(resources: Vec<Resource>) -> (Vec<Resource>, Vec<Resource>) {
    resources
        .into_iter()
        .partition(|r| !r.annotations.contains_key(HOOK_ANNOTATION))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = "\
---
# Source: demo/templates/cm.yaml
apiVersion: v1
kind: ConfigMap
metadata:
  name: cfg
data:
  key: value
---
# Source: demo/templates/notes.txt
---
apiVersion: batch/v1
kind: Job
metadata:
  name: migrate
  annotations:
    \"helm.sh/hook\": pre-install
";

    #[test]
    fn parses_and_tracks_sources() {
        let parsed = parse_manifests(STREAM.as_bytes()).unwrap();
        assert_eq!(parsed.resources.len(), 2);
        assert_eq!(
            parsed.resources[0].source_path.as_deref(),
            Some("demo/templates/cm.yaml")
        );
        assert_eq!(parsed.resources[1].kind, "Job");
    }

    #[test]
    fn empty_documents_are_skipped_silently() {
        let parsed = parse_manifests(b"---\n---\n").unwrap();
        assert!(parsed.resources.is_empty());
        assert!(parsed.diagnostics.is_empty());
    }

    #[test]
    fn non_object_documents_warn() {
        let parsed = parse_manifests(b"data: only\n").unwrap();
        assert!(parsed.resources.is_empty());
        assert_eq!(parsed.diagnostics.len(), 1);
        assert_eq!(parsed.diagnostics[0].code, "manifest.skipped");
    }

    #[test]
    fn hooks_are_partitioned() {
        let parsed = parse_manifests(STREAM.as_bytes()).unwrap();
        let (kept, hooks) = partition_hooks(parsed.resources);
        assert_eq!(kept.len(), 1);
        assert_eq!(hooks.len(), 1);
        assert_eq!(hooks[0].name, "migrate");
    }

    #[test]
    fn invalid_yaml_fails_with_context() {
        let err = parse_manifests(b"apiVersion: [unclosed\n").err().unwrap();
        assert!(err.to_string().contains("parse failed"));
    }
}

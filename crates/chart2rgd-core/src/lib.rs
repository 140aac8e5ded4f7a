//! chart2rgd-core
//!
//! Core pipeline for chart2rgd:
//! - Parameter inference (sentinel diffing and template AST analysis)
//! - Schema extraction from a merged values tree
//! - Field rewriting into `${…}` expressions
//! - Dependency graph construction with topological ordering
//! - ResourceGraphDefinition assembly and validation
//! - Canonical serialization (block YAML, JSON, per-resource split)
//!
//! The core crate performs no filesystem or network I/O, reads no
//! environment variables and no system clock. Rendering is delegated to a
//! caller-supplied [`render::Renderer`]; timestamps are injected through
//! [`engine::ConvertOptions`]. Given identical inputs, every public entry
//! point produces byte-identical output.

pub mod assemble;
pub mod engine;
pub mod errors;
pub mod graph;
pub mod infer;
pub mod manifest;
pub mod readiness;
pub mod render;
pub mod resource;
pub mod schema;
pub mod serialize;
pub mod validate;
pub mod value;

pub use crate::errors::{ConvertError, ConvertResult};

/// API group/version of the emitted document.
pub const RGD_API_VERSION: &str = "kro.run/v1alpha1";

/// Kind of the emitted document.
pub const RGD_KIND: &str = "ResourceGraphDefinition";

/// Version string recorded under `spec.schema.apiVersion`.
pub const SCHEMA_API_VERSION: &str = "v1alpha1";

/// Marker framing used by the sentinel strategy.
///
/// These must remain stable: the diff pass recognizes markers purely by
/// this prefix/suffix pair, and parameter paths never contain the suffix.
pub mod sentinel_marker {
    pub const PREFIX: &str = "__SENTINEL_";
    pub const SUFFIX: &str = "__";
}

/// Convenience re-exports.
pub mod prelude {
    pub use crate::engine::{convert, ConvertInput, ConvertOptions, ConvertOutcome, Strategy};
    pub use crate::graph::DependencyGraph;
    pub use crate::infer::{FieldMapping, MatchType};
    pub use crate::render::{CancelToken, RenderRequest, Renderer};
    pub use crate::resource::{ChartMeta, Resource};
    pub use crate::schema::{SchemaField, SchemaType};
    pub use crate::serialize::{to_json_bytes, to_yaml_bytes, SerializeOptions};
    pub use crate::validate::{validate_document, ValidationReport};
    pub use crate::{ConvertError, ConvertResult};
}

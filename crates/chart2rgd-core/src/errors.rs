//! Error types for chart2rgd-core.
//!
//! One variant per failure kind the pipeline can surface. Non-fatal
//! conditions (a degraded inference strategy, a skipped manifest document)
//! are not errors: they are collected as diagnostics on the engine report.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ConvertResult<T> = Result<T, ConvertError>;

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Contradictory or malformed options supplied by the caller.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The external renderer returned an error.
    #[error("render failed: {0}")]
    RenderFailed(String),

    /// The external renderer exceeded the caller-supplied deadline.
    #[error("render timed out after {0} ms")]
    RenderTimeout(u64),

    /// Nothing usable was left after parsing and hook filtering.
    #[error("no convertible resources in rendered output")]
    NoResources,

    /// Manifest bytes could not be parsed.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// A user-supplied resource id override is not a valid identifier.
    #[error("invalid resource id {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// Resource-id derivation collided and exhausted disambiguation.
    #[error("resource id conflict for {0:?}")]
    IdConflict(String),

    /// The dependency graph contains at least one cycle.
    ///
    /// Each cycle is in canonical rotation (starts at its id-minimum
    /// member) with the entry node repeated at the tail.
    #[error("dependency cycle detected: {}", format_cycles(.0))]
    CycleDetected(Vec<Vec<String>>),

    /// The validator reported one or more errors.
    #[error("validation failed with {0} error(s)")]
    ValidationFailed(usize),

    /// Structural impossibility during emission.
    #[error("serialization failed: {0}")]
    SerializationFailed(String),

    /// The split serializer was handed a document without resources.
    #[error("document has no resources to split")]
    EmptyResources,

    /// Caller-initiated abort honoured at a renderer call.
    #[error("conversion cancelled")]
    Cancelled,
}

impl ConvertError {
    /// Stable exit codes surfaced to the CLI frontend.
    ///
    /// Codes 8 (breaking schema change) and 9 (audit threshold) belong to
    /// commands outside this crate and are reserved.
    pub fn exit_code(&self) -> i32 {
        match self {
            ConvertError::InvalidConfiguration(_) | ConvertError::InvalidId { .. } => 2,
            ConvertError::CycleDetected(_) => 5,
            ConvertError::ValidationFailed(_) => 7,
            _ => 1,
        }
    }
}

fn format_cycles(cycles: &[Vec<String>]) -> String {
    if cycles.is_empty() {
        return "<unreported>".to_string();
    }
    cycles[0].join(" -> ")
}

/// A non-fatal, structured note attached to the engine report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warning,
}

impl Diagnostic {
    pub fn info(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn warning(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            code: code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_contract() {
        assert_eq!(ConvertError::InvalidConfiguration("x".into()).exit_code(), 2);
        assert_eq!(ConvertError::CycleDetected(vec![]).exit_code(), 5);
        assert_eq!(ConvertError::ValidationFailed(1).exit_code(), 7);
        assert_eq!(ConvertError::NoResources.exit_code(), 1);
        assert_eq!(ConvertError::Cancelled.exit_code(), 1);
    }

    #[test]
    fn cycle_message_names_first_cycle() {
        let err = ConvertError::CycleDetected(vec![vec![
            "a".to_string(),
            "b".to_string(),
            "a".to_string(),
        ]]);
        assert!(err.to_string().contains("a -> b -> a"));
    }
}

//! The external-renderer boundary.
//!
//! Template execution lives outside this crate. The engine calls a
//! caller-supplied [`Renderer`] at most twice per conversion: once is done
//! by the frontend to produce the baseline, and once by the sentinel
//! strategy to produce the marker-rendered snapshot. Both calls carry the
//! same release/namespace so the two renders stay comparable.
//!
//! Determinism contract for implementations: same request, same chart
//! bytes, same output. Implementations must honour `timeout_ms` and map
//! expiry to [`ConvertError::RenderTimeout`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_yaml::Value;

use crate::errors::ConvertResult;

/// One render invocation.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// The full parameter tree for this render.
    pub values: &'a Value,
    pub release_name: &'a str,
    pub namespace: Option<&'a str>,
    /// Fail on missing values instead of rendering empty strings.
    pub strict: bool,
    /// Caller-supplied deadline for the render call.
    pub timeout_ms: Option<u64>,
}

/// Renders a chart against a parameter tree into manifest bytes.
pub trait Renderer {
    fn render(&self, req: &RenderRequest<'_>) -> ConvertResult<Vec<u8>>;
}

/// Cooperative cancellation handle.
///
/// The engine checks the token before each renderer invocation and
/// between pipeline stages; on cancellation it returns
/// [`ConvertError::Cancelled`](crate::ConvertError::Cancelled) and drops
/// its scratch state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

static JSON_MODE: AtomicBool = AtomicBool::new(false);

pub fn init(json: bool) {
    JSON_MODE.store(json, Ordering::Relaxed);
}

pub fn is_json() -> bool {
    JSON_MODE.load(Ordering::Relaxed)
}

/// Print a structured result on stdout (always JSON for now; the flag is
/// kept for parity with future text summaries).
pub fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let s = serde_json::to_string_pretty(value)?;
    println!("{s}");
    Ok(())
}

pub fn warn_line(msg: &str) {
    let mut stream = StandardStream::stderr(ColorChoice::Auto);
    let _ = stream.set_color(ColorSpec::new().set_fg(Some(Color::Yellow)));
    let _ = writeln!(stream, "warning: {msg}");
    let _ = stream.reset();
}

pub fn error_line(msg: &str) {
    let mut stream = StandardStream::stderr(ColorChoice::Auto);
    let _ = stream.set_color(ColorSpec::new().set_fg(Some(Color::Red)));
    let _ = writeln!(stream, "error: {msg}");
    let _ = stream.reset();
}

/// Write failure at the output boundary; mapped to exit code 6.
#[derive(Debug, thiserror::Error)]
#[error("failed to write {path}: {source}")]
pub struct OutputWriteError {
    pub path: String,
    #[source]
    pub source: std::io::Error,
}

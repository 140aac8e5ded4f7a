//! Helm-exec renderer.
//!
//! Implements the core's renderer boundary by shelling out to
//! `helm template`. Values are written to a temporary file per invocation;
//! a caller-supplied deadline kills the process and surfaces as a render
//! timeout.

use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use chart2rgd_core::render::{RenderRequest, Renderer};
use chart2rgd_core::{ConvertError, ConvertResult};

pub struct HelmRenderer {
    helm_bin: String,
    chart_dir: PathBuf,
}

impl HelmRenderer {
    pub fn new(helm_bin: impl Into<String>, chart_dir: impl Into<PathBuf>) -> Self {
        Self {
            helm_bin: helm_bin.into(),
            chart_dir: chart_dir.into(),
        }
    }
}

impl Renderer for HelmRenderer {
    fn render(&self, req: &RenderRequest<'_>) -> ConvertResult<Vec<u8>> {
        let values_yaml = serde_yaml::to_string(req.values)
            .map_err(|e| ConvertError::RenderFailed(format!("encoding values: {e}")))?;
        let values_file = write_temp_values(&values_yaml)?;

        let mut cmd = Command::new(&self.helm_bin);
        cmd.arg("template")
            .arg(req.release_name)
            .arg(&self.chart_dir)
            .arg("--values")
            .arg(&values_file);
        if let Some(ns) = req.namespace {
            cmd.arg("--namespace").arg(ns);
        }
        if req.strict {
            cmd.arg("--strict");
        }

        let output = match req.timeout_ms {
            Some(ms) => run_with_deadline(cmd, ms)?,
            None => cmd
                .output()
                .map_err(|e| ConvertError::RenderFailed(format!("spawning helm: {e}")))?,
        };

        let _ = std::fs::remove_file(&values_file);

        if !output.status.success() {
            return Err(ConvertError::RenderFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

fn write_temp_values(yaml: &str) -> ConvertResult<PathBuf> {
    let path = std::env::temp_dir().join(format!(
        "chart2rgd-values-{}.yaml",
        std::process::id()
    ));
    std::fs::write(&path, yaml)
        .map_err(|e| ConvertError::RenderFailed(format!("writing values file: {e}")))?;
    Ok(path)
}

/// Run the command, killing it when the deadline passes.
///
/// Output pipes are drained on separate threads so a chatty renderer
/// cannot block on a full pipe while we poll for exit.
fn run_with_deadline(mut cmd: Command, timeout_ms: u64) -> ConvertResult<Output> {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    let mut child = cmd
        .spawn()
        .map_err(|e| ConvertError::RenderFailed(format!("spawning helm: {e}")))?;

    let mut stdout_pipe = child.stdout.take();
    let mut stderr_pipe = child.stderr.take();
    let stdout_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });
    let stderr_thread = std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + Duration::from_millis(timeout_ms);
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ConvertError::RenderTimeout(timeout_ms));
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => {
                return Err(ConvertError::RenderFailed(format!("waiting for helm: {e}")))
            }
        }
    };

    let stdout = stdout_thread.join().unwrap_or_default();
    let stderr = stderr_thread.join().unwrap_or_default();
    Ok(Output {
        status,
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_kills_slow_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_deadline(cmd, 50).err().unwrap();
        assert!(matches!(err, ConvertError::RenderTimeout(50)));
    }

    #[test]
    fn fast_process_completes() {
        let cmd = Command::new("true");
        let out = run_with_deadline(cmd, 5_000).unwrap();
        assert!(out.status.success());
    }
}

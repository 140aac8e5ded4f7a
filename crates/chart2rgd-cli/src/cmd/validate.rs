use std::io::Read;

use anyhow::{Context, Result};
use serde::Serialize;

use chart2rgd_core::validate::{validate_document, FindingLevel};
use chart2rgd_core::ConvertError;

use crate::output;

#[derive(Debug, Serialize)]
pub struct ValidateOut {
    pub file: String,
    pub ok: bool,
    pub errors: usize,
    pub warnings: usize,
}

pub fn run(file: &str) -> Result<()> {
    let text = if file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {file}"))?
    };

    let doc: serde_yaml::Value = serde_yaml::from_str(&text)
        .map_err(|e| ConvertError::ParseFailed(format!("{file}: {e}")))?;

    let report = validate_document(&doc);
    let mut errors = 0;
    let mut warnings = 0;
    for finding in &report.findings {
        match finding.level {
            FindingLevel::Error => {
                errors += 1;
                output::error_line(&format!("[{}] {}", finding.code, finding.message));
            }
            FindingLevel::Warning => {
                warnings += 1;
                output::warn_line(&format!("[{}] {}", finding.code, finding.message));
            }
        }
    }

    output::print(&ValidateOut {
        file: file.to_string(),
        ok: report.ok(),
        errors,
        warnings,
    })?;

    if !report.ok() {
        return Err(ConvertError::ValidationFailed(errors).into());
    }
    Ok(())
}

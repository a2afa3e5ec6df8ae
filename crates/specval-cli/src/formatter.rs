use std::process::ExitCode;

use serde::Serialize;
use specval::{Severity, ValidationError, ValidationResult};

use crate::error::{CliError, ExitStatus};

pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct JsonReport<'a> {
    root: String,
    #[serde(flatten)]
    result: &'a ValidationResult,
}

/// Prints the report and maps it onto an exit code: any error-severity
/// diagnostic makes the run fail with `EX_DATAERR`.
pub fn emit_result(
    root: &std::path::Path,
    result: &ValidationResult,
    format: OutputFormat,
) -> Result<ExitCode, CliError> {
    match format {
        OutputFormat::Text => print_text(result),
        OutputFormat::Json => {
            let report = JsonReport {
                root: root.display().to_string(),
                result,
            };
            let json = serde_json::to_string_pretty(&report)
                .map_err(|err| CliError::new(err.to_string(), ExitStatus::Software))?;
            println!("{json}");
        }
    }
    let status = if result.success {
        ExitStatus::Ok
    } else {
        ExitStatus::Data
    };
    Ok(status.into())
}

fn print_text(result: &ValidationResult) {
    for diagnostic in result.all() {
        println!("{}", render_diagnostic(diagnostic));
    }
    if let Some(report) = &result.traceability {
        println!(
            "Traceability: {} of {} modules covered by tests ({} files scanned)",
            report.coverage.len(),
            report.coverage.len() + report.untested.len(),
            report.files_scanned
        );
    }

    let status = if result.success { "PASS" } else { "FAIL" };
    println!(
        "Validation {status}: {} documents, {} references, {} errors, {} warnings, {} info",
        result.documents_validated,
        result.references_validated,
        result.errors.len(),
        result.warnings.len(),
        result.infos.len()
    );
}

fn render_diagnostic(diagnostic: &ValidationError) -> String {
    let marker = match diagnostic.severity {
        Severity::Error => "[ERR]",
        Severity::Warning => "[WARN]",
        Severity::Info => "[INFO]",
    };
    format!("{marker} {diagnostic}")
}

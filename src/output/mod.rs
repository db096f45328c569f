/// Rendering of run reports.
pub mod summary;

use crate::error::AppError;
use crate::report::RunReport;

pub use summary::{CsvFormatter, JsonFormatter, TextFormatter};

/// Turns a finished run into printable output.
pub trait Formatter {
    fn format(&self, report: &RunReport) -> Result<String, AppError>;
}

/// Write the JSON summary consumed by external reporting tools.
pub fn export_summary(report: &RunReport, path: &std::path::Path) -> Result<(), AppError> {
    let json = JsonFormatter.format(report)?;
    std::fs::write(path, json)?;
    tracing::info!(path = %path.display(), "summary exported");
    Ok(())
}

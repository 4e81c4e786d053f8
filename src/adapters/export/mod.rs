//! Export Adapters
//!
//! JSON for downstream tooling, CSV for spreadsheets. The output file's
//! extension picks one unless a format is given explicitly.

mod csv;
mod json;

pub use self::csv::{CsvExporter, CSV_COLUMNS};
pub use self::json::{JsonExporter, DEFAULT_EXPORT_FILE};

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::ports::export::LeadExporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    /// `.csv` files are CSV; everything else is JSON
    pub fn from_path(path: &str) -> Self {
        match Path::new(path).extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Json,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(format!("unknown export format '{}' (expected json or csv)", other)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Csv => write!(f, "csv"),
        }
    }
}

/// Exporter for `output`; an explicit `format` wins over the extension
pub fn exporter_for(output: &str, format: Option<ExportFormat>) -> Arc<dyn LeadExporter> {
    match format.unwrap_or_else(|| ExportFormat::from_path(output)) {
        ExportFormat::Json => Arc::new(JsonExporter::new(output)),
        ExportFormat::Csv => Arc::new(CsvExporter::new(output)),
    }
}

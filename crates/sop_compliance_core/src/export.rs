//! crates/sop_compliance_core/src/export.rs
//!
//! File export of report rows. Only CSV is produced here; spreadsheet and PDF
//! encoders are declared so callers can offer them, but they fail explicitly.

use serde::Serialize;
use serde_json::Value;

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("{0} export is not implemented")]
    NotImplemented(&'static str),
    #[error("Export rows must serialize to JSON objects")]
    NotAnObject,
    #[error("Failed to serialize export row: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Failed to write CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to flush CSV: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExportError> for PortError {
    fn from(e: ExportError) -> Self {
        match e {
            ExportError::NotImplemented(format) => {
                PortError::NotImplemented(format!("{} export", format))
            }
            other => PortError::Unexpected(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
    Pdf,
}

impl ExportFormat {
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "excel" | "xlsx" => Some(Self::Excel),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Fails for formats that have no encoder.
    pub fn ensure_supported(&self) -> Result<(), ExportError> {
        match self {
            Self::Csv => Ok(()),
            Self::Excel => Err(ExportError::NotImplemented("Excel")),
            Self::Pdf => Err(ExportError::NotImplemented("PDF")),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Excel => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            Self::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "xlsx",
            Self::Pdf => "pdf",
        }
    }
}

/// Encodes `rows` in the requested format.
pub fn export_rows<T: Serialize>(rows: &[T], format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    format.ensure_supported()?;
    to_csv(rows)
}

/// Header row from the first row's keys, then one record per row.
/// An empty slice produces an empty document.
pub fn to_csv<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, ExportError> {
    let mut objects = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::to_value(row)? {
            Value::Object(map) => objects.push(map),
            _ => return Err(ExportError::NotAnObject),
        }
    }

    let Some(first) = objects.first() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = first.keys().cloned().collect();

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    writer.write_record(&headers)?;
    for object in &objects {
        writer.write_record(headers.iter().map(|h| cell_text(object.get(h))))?;
    }
    writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

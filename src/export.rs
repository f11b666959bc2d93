//! Serialization of a finished analysis into a downloadable artifact.
//!
//! The shell owns the actual download/share mechanics; the core only
//! produces the bytes. Detections are embedded verbatim in their normalized
//! form so consumers never need to know more than "top-left origin,
//! unit-normalized".

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::history::HistoryEntry;
use crate::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl ExportFormat {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Csv => "text/csv",
        }
    }

    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }
}

/// A file the shell can hand to the browser for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub file_name: String,
    pub mime_type: String,
    #[serde(with = "serde_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Error)]
pub enum ExportError {
    #[error("failed to serialize export: {0}")]
    Serialize(String),
}

impl From<ExportError> for AppError {
    fn from(e: ExportError) -> Self {
        AppError::new(ErrorKind::Serialization, e.to_string())
    }
}

/// Renders one analysis into the requested format.
///
/// # Errors
///
/// Returns [`ExportError`] when JSON encoding fails.
pub fn render_export(
    entry: &HistoryEntry,
    format: ExportFormat,
) -> Result<ExportPayload, ExportError> {
    let data = match format {
        ExportFormat::Json => serde_json::to_vec_pretty(entry)
            .map_err(|e| ExportError::Serialize(e.to_string()))?,
        ExportFormat::Csv => render_csv(entry).into_bytes(),
    };

    Ok(ExportPayload {
        file_name: format!(
            "detection-results-{}.{}",
            entry.captured_at.as_millis(),
            format.extension()
        ),
        mime_type: format.mime_type().to_string(),
        data,
    })
}

fn render_csv(entry: &HistoryEntry) -> String {
    let mut out = String::from("class,confidence,x,y,width,height\n");

    for detection in &entry.detections {
        out.push_str(&csv_field(&detection.class_label));
        out.push(',');
        out.push_str(&format!("{:.6}", detection.confidence));

        match &detection.bbox {
            Some(bbox) => {
                out.push_str(&format!(
                    ",{:.6},{:.6},{:.6},{:.6}\n",
                    bbox.x, bbox.y, bbox.width, bbox.height
                ));
            }
            None => out.push_str(",,,,\n"),
        }
    }

    out
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

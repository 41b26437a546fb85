use html_escape::encode_text;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::converter::{ConvertError, Converter};
use crate::history::{COLUMNS, HistoryView};
use crate::saving::StoreError;

/// Intermediate HTML report written next to the generated proposals
pub const HISTORY_HTML: &str = "historico.html";
/// PDF produced from [`HISTORY_HTML`]
pub const HISTORY_PDF: &str = "historico_propostas.pdf";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to serialize history: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Download formats offered on the history screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
    Pdf,
    Xlsx,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Xlsx => "xlsx",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Json => "application/json",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
        }
    }

    /// Name offered to the browser for the downloaded file
    pub fn file_name(&self) -> String {
        match self {
            ExportFormat::Pdf => HISTORY_PDF.to_string(),
            other => format!("historico.{}", other.extension()),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            "pdf" => Ok(ExportFormat::Pdf),
            "xlsx" => Ok(ExportFormat::Xlsx),
            other => Err(format!("unsupported export format: {}", other)),
        }
    }
}

/// Serialize `view` in `format`.
///
/// PDF export writes [`HISTORY_HTML`] and [`HISTORY_PDF`] into `work_dir`.
pub fn export(
    view: &HistoryView,
    format: ExportFormat,
    converter: &dyn Converter,
    work_dir: &Path,
) -> Result<Vec<u8>, ExportError> {
    let bytes = match format {
        ExportFormat::Csv => to_csv(view).into_bytes(),
        ExportFormat::Json => to_json(view)?.into_bytes(),
        ExportFormat::Xlsx => to_xlsx(view)?,
        ExportFormat::Pdf => {
            let pdf = to_pdf(view, converter, work_dir)?;
            fs::read(&pdf).map_err(|source| ExportError::Io { path: pdf, source })?
        }
    };
    info!("Exported {} history rows as {}", view.len(), format);
    Ok(bytes)
}

/// Convert the history view to CSV format
///
/// The first line holds the column names; an empty view yields only that line.
/// Fields containing commas, quotes or newlines are quoted.
pub fn to_csv(view: &HistoryView) -> String {
    let mut csv_content = COLUMNS.join(",");
    csv_content.push('\n');

    for record in view.records() {
        let line = record
            .columns()
            .iter()
            .map(|value| csv_field(value))
            .collect::<Vec<_>>()
            .join(",");
        csv_content.push_str(&line);
        csv_content.push('\n');
    }

    csv_content
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Pretty-printed JSON array of records, `[]` when empty
pub fn to_json(view: &HistoryView) -> Result<String, serde_json::Error> {
    let records: Vec<_> = view.records().collect();
    serde_json::to_string_pretty(&records)
}

/// Standalone HTML page holding the history table
pub fn to_html(view: &HistoryView) -> String {
    let mut html = String::from(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Histórico de Propostas</title></head>\n<body>\n<h2>Histórico de Propostas</h2>\n<table border=\"1\">\n<thead><tr>",
    );
    for column in COLUMNS {
        html.push_str(&format!("<th>{}</th>", column));
    }
    html.push_str("</tr></thead>\n<tbody>\n");

    for record in view.records() {
        html.push_str("<tr>");
        for value in record.columns() {
            html.push_str(&format!("<td>{}</td>", encode_text(&value)));
        }
        html.push_str("</tr>\n");
    }

    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

/// Render the HTML report into `work_dir` and convert it to PDF; returns the PDF path.
pub fn to_pdf(
    view: &HistoryView,
    converter: &dyn Converter,
    work_dir: &Path,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(work_dir).map_err(|source| ExportError::Io {
        path: work_dir.to_path_buf(),
        source,
    })?;

    let html_path = work_dir.join(HISTORY_HTML);
    fs::write(&html_path, to_html(view)).map_err(|source| ExportError::Io {
        path: html_path.clone(),
        source,
    })?;

    let pdf_path = work_dir.join(HISTORY_PDF);
    converter.convert(&html_path, &pdf_path)?;
    Ok(pdf_path)
}

/// Convert the history view to XLSX format
///
/// One worksheet with a bold header row followed by one row per record.
pub fn to_xlsx(view: &HistoryView) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let mut worksheet = Worksheet::new();
    let header = Format::new().set_bold();

    for (c, column) in COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, c as u16, *column, &header)?;
    }

    for (r, record) in view.records().enumerate() {
        for (c, value) in record.columns().iter().enumerate() {
            worksheet.write_string((r + 1) as u32, c as u16, value.as_str())?;
        }
    }

    workbook.push_worksheet(worksheet);
    let buffer = workbook.save_to_buffer()?;

    Ok(buffer)
}

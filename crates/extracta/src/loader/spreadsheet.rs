use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Reader};
use serde_json::{json, Map};

use crate::error::LoaderError;
use crate::loader::{read_bytes, ContentLoader, LoadResult};

const SPREADSHEET_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-excel",
    "application/vnd.ms-excel.sheet.macroenabled.12",
    "application/vnd.ms-excel.sheet.binary.macroenabled.12",
    "application/vnd.oasis.opendocument.spreadsheet",
    "text/csv",
];

/// Name given to the only sheet of a CSV file.
pub const CSV_SHEET_NAME: &str = "Sheet1";

/// Renders every sheet of a workbook (or a CSV file) as a Markdown table.
///
/// The format is sniffed from the leading bytes: ZIP containers (xlsx, xlsm,
/// xlsb, ods) and OLE compound files (xls) go through calamine, anything else
/// is parsed as CSV. The file name plays no part.
pub struct SpreadsheetLoader;

impl SpreadsheetLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SpreadsheetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentLoader for SpreadsheetLoader {
    fn name(&self) -> &'static str {
        "spreadsheet"
    }

    fn supports(&self, mime_type: &str) -> bool {
        SPREADSHEET_TYPES.contains(&mime_type)
    }

    fn load(&self, path: &Path) -> Result<LoadResult, LoaderError> {
        let bytes = read_bytes(path)?;
        let sheets = if is_workbook(&bytes) {
            read_workbook(bytes)?
        } else {
            vec![(CSV_SHEET_NAME.to_string(), read_csv(&bytes)?)]
        };

        let content = sheets
            .iter()
            .map(|(name, rows)| render_sheet(name, rows))
            .collect::<Vec<_>>()
            .join("\n\n");

        let mut metadata = Map::new();
        metadata.insert("sheets".to_string(), json!(sheets.len()));

        Ok(LoadResult::with_metadata(content, metadata))
    }
}

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

fn is_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC)
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, LoaderError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(|cell| cell.to_string()).collect())
                .map_err(|e| LoaderError::Spreadsheet(format!("Invalid CSV: {}", e)))
        })
        .collect()
}

fn read_workbook(bytes: Vec<u8>) -> Result<Vec<(String, Vec<Vec<String>>)>, LoaderError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| LoaderError::Spreadsheet(format!("Failed to open workbook: {}", e)))?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| LoaderError::Spreadsheet(format!("Failed to read sheet '{}': {}", name, e)))?;

        let rows = range
            .rows()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect();
        sheets.push((name, rows));
    }

    Ok(sheets)
}

/// `# <name>` followed by a Markdown table whose first row is the header.
pub fn render_sheet(name: &str, rows: &[Vec<String>]) -> String {
    let mut output = format!("# {}", name);

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return output;
    }

    output.push_str("\n\n");
    for (index, row) in rows.iter().enumerate() {
        output.push_str(&render_row(row, width));
        output.push('\n');
        if index == 0 {
            output.push_str(&render_row(&vec!["---".to_string(); width], width));
            output.push('\n');
        }
    }

    output.trim_end().to_string()
}

fn render_row(row: &[String], width: usize) -> String {
    let cells: Vec<String> = (0..width)
        .map(|i| row.get(i).map(|cell| escape_cell(cell)).unwrap_or_default())
        .collect();
    format!("| {} |", cells.join(" | "))
}

fn escape_cell(cell: &str) -> String {
    cell.replace('|', "\\|")
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

//! XLSX workbook writer.

use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};

use peereval_core::report::{CellValue, RoundReport, SheetTable};

/// MIME type of the generated workbook.
pub const XLSX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

const MIN_COLUMN_WIDTH: usize = 10;
const MAX_COLUMN_WIDTH: usize = 60;

/// Longest text Excel accepts in one cell, in characters.
pub const MAX_CELL_CHARS: usize = 32_767;

/// Clip `text` to what fits in a cell, on a char boundary.
fn cell_text(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => Cow::Owned(text[..end].to_string()),
        None => Cow::Borrowed(text),
    }
}

fn column_width(table: &SheetTable, col: usize) -> f64 {
    let widest = table
        .rows
        .iter()
        .filter_map(|row| match row.get(col) {
            Some(CellValue::Text(s)) => Some(s.chars().count()),
            Some(CellValue::Number(_)) => Some(8),
            _ => None,
        })
        .chain(std::iter::once(table.headers[col].chars().count()))
        .max()
        .unwrap_or(0);
    (widest + 2).clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH) as f64
}

fn write_sheet(sheet: &mut Worksheet, table: &SheetTable, header: &Format) -> Result<(), XlsxError> {
    sheet.set_name(&table.name)?;

    for (col, title) in table.headers.iter().enumerate() {
        let col = col as u16;
        sheet.write_string_with_format(0, col, title, header)?;
    }
    for col in 0..table.headers.len() {
        sheet.set_column_width(col as u16, column_width(table, col))?;
    }
    sheet.set_freeze_panes(1, 0)?;

    for (r, row) in table.rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let col = col as u16;
            match cell {
                CellValue::Text(s) => {
                    let text = cell_text(s);
                    if let Cow::Owned(_) = text {
                        let column = table.headers.get(col as usize).map_or("", String::as_str);
                        tracing::warn!(
                            sheet = %table.name,
                            row = r,
                            column,
                            chars = s.chars().count(),
                            "cell text truncated to {MAX_CELL_CHARS} characters"
                        );
                    }
                    sheet.write_string(r, col, text.as_ref())?;
                }
                CellValue::Number(n) => {
                    sheet.write_number(r, col, *n)?;
                }
                CellValue::Empty => {}
            }
        }
    }
    Ok(())
}

fn build_workbook(report: &RoundReport) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();

    for table in &report.sheets {
        let sheet = workbook.add_worksheet();
        write_sheet(sheet, table, &header)
            .with_context(|| format!("failed to write sheet {}", table.name))?;
    }
    Ok(workbook)
}

/// Render the report as an in-memory `.xlsx` file.
pub fn workbook_bytes(report: &RoundReport) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(report)?;
    workbook
        .save_to_buffer()
        .context("failed to serialize workbook")
}

/// Write the report as an `.xlsx` file.
pub fn write_workbook(report: &RoundReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    let mut workbook = build_workbook(report)?;
    workbook
        .save(path)
        .with_context(|| format!("failed to write workbook to {}", path.display()))?;
    tracing::info!(path = %path.display(), sheets = report.sheets.len(), "workbook written");
    Ok(())
}

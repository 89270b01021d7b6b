//! Report sinks: `.xlsx` via rust_xlsxwriter, `.csv` via csv, JSON via serde.
//!
//! Written files carry a bold header row and no index column. Any file this
//! module writes can be read back with `read_table` / `read_report`.

use std::path::{Path, PathBuf};

use anyhow::Context;
use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use thiserror::Error;

use crate::config::ExportFormat;
use crate::report::{Cell, ReportRow, Tabular, BETA_COLUMNS};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("failed to read {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("{path}: unexpected header {found:?}, expected {expected:?}")]
    Header {
        path: PathBuf,
        found: Vec<String>,
        expected: Vec<String>,
    },

    #[error("{path} row {row}: bad {column} value '{value}'")]
    Value {
        path: PathBuf,
        row: usize,
        column: &'static str,
        value: String,
    },

    #[error(transparent)]
    Format(#[from] crate::config::ConfigError),
}

fn write_err(path: &Path, reason: impl ToString) -> ExportError {
    ExportError::Write {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_err(path: &Path, reason: impl ToString) -> ExportError {
    ExportError::Read {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Write a table with the writer matching `format`.
pub fn write_table(
    table: &dyn Tabular,
    path: &Path,
    format: ExportFormat,
) -> Result<(), ExportError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| write_err(path, e))?;
    }
    let written = match format {
        ExportFormat::Xlsx => write_xlsx(table, path),
        ExportFormat::Csv => write_csv(table, path),
    };
    written?;
    tracing::info!(path = %path.display(), rows = table.cells().len(), "report written");
    Ok(())
}

fn write_xlsx(table: &dyn Tabular, path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let bold = Format::new().set_bold();

    for (col, name) in table.columns().iter().enumerate() {
        sheet
            .write_string_with_format(0, col as u16, *name, &bold)
            .map_err(|e| write_err(path, e))?;
    }
    for (i, row) in table.cells().iter().enumerate() {
        let r = (i + 1) as u32;
        for (col, cell) in row.iter().enumerate() {
            let c = col as u16;
            let written = match cell {
                Cell::Text(s) => sheet.write_string(r, c, s.as_str()),
                Cell::Number(n) => sheet.write_number(r, c, *n),
            };
            written.map_err(|e| write_err(path, e))?;
        }
    }
    workbook.save(path).map_err(|e| write_err(path, e))
}

fn write_csv(table: &dyn Tabular, path: &Path) -> Result<(), ExportError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| write_err(path, e))?;
    wtr.write_record(table.columns())
        .map_err(|e| write_err(path, e))?;
    for row in table.cells() {
        wtr.write_record(row.iter().map(Cell::render))
            .map_err(|e| write_err(path, e))?;
    }
    wtr.flush().map_err(|e| write_err(path, e))
}

/// Header and rows of a previously written table, as text.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Read a table back; the format comes from the extension.
pub fn read_table(path: &Path) -> Result<Table, ExportError> {
    let mut lines = match ExportFormat::from_path(path)? {
        ExportFormat::Xlsx => read_xlsx(path)?,
        ExportFormat::Csv => read_csv(path)?,
    }
    .into_iter();
    let header = lines.next().unwrap_or_default();
    Ok(Table {
        header,
        rows: lines.collect(),
    })
}

fn read_xlsx(path: &Path) -> Result<Vec<Vec<String>>, ExportError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| read_err(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| read_err(path, "workbook has no worksheets"))?
        .map_err(|e| read_err(path, e))?;
    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

fn read_csv(path: &Path) -> Result<Vec<Vec<String>>, ExportError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| read_err(path, e))?;
    rdr.records()
        .map(|rec| {
            rec.map(|r| r.iter().map(str::to_string).collect())
                .map_err(|e| read_err(path, e))
        })
        .collect()
}

/// Read a beta report written by `write_table` back into rows.
pub fn read_report(path: &Path) -> Result<Vec<ReportRow>, ExportError> {
    let table = read_table(path)?;
    let expected: Vec<String> = BETA_COLUMNS.iter().map(|c| c.to_string()).collect();
    if table.header != expected {
        return Err(ExportError::Header {
            path: path.to_path_buf(),
            found: table.header,
            expected,
        });
    }

    table
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            let line = i + 2;
            let field = |idx: usize| row.get(idx).map(String::as_str).unwrap_or_default();
            let number = |idx: usize| -> Result<f64, ExportError> {
                field(idx).parse::<f64>().map_err(|_| ExportError::Value {
                    path: path.to_path_buf(),
                    row: line,
                    column: BETA_COLUMNS[idx],
                    value: field(idx).to_string(),
                })
            };
            let obs = number(4)?;
            if obs < 0.0 || obs.fract() != 0.0 {
                return Err(ExportError::Value {
                    path: path.to_path_buf(),
                    row: line,
                    column: BETA_COLUMNS[4],
                    value: field(4).to_string(),
                });
            }
            Ok(ReportRow {
                ticker: field(0).to_string(),
                beta: number(1)?,
                r_squared: number(2)?,
                p_value: field(3).to_string(),
                observations: obs as u64,
            })
        })
        .collect()
}

/// Pretty JSON of a whole report, diagnostics included.
pub fn export_json<R: Serialize>(report: &R) -> anyhow::Result<String> {
    serde_json::to_string_pretty(report).context("failed to serialize report to JSON")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rows(Vec<ReportRow>);

    impl Tabular for Rows {
        fn columns(&self) -> &[&'static str] {
            &BETA_COLUMNS
        }

        fn cells(&self) -> Vec<Vec<Cell>> {
            self.0
                .iter()
                .map(|r| {
                    vec![
                        Cell::Text(r.ticker.clone()),
                        Cell::Number(r.beta),
                        Cell::Number(r.r_squared),
                        Cell::Text(r.p_value.clone()),
                        Cell::Number(r.observations as f64),
                    ]
                })
                .collect()
        }
    }

    fn rows() -> Vec<ReportRow> {
        vec![
            ReportRow {
                ticker: "BBB".into(),
                beta: 1.234,
                r_squared: 0.567,
                p_value: "0.000012345678901".into(),
                observations: 23,
            },
            ReportRow {
                ticker: "AAA".into(),
                beta: -0.5,
                r_squared: 0.1,
                p_value: "0.9".into(),
                observations: 23,
            },
        ]
    }

    #[test]
    fn csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/betas.csv");
        write_table(&Rows(rows()), &path, ExportFormat::Csv).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "Ticker,Beta,R-squared,P-value,Obs.\nBBB,1.234,0.567,0.000012345678901,23\n"
        ));
        assert_eq!(read_report(&path).unwrap(), rows());
    }

    #[test]
    fn xlsx_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("betas.xlsx");
        write_table(&Rows(rows()), &path, ExportFormat::Xlsx).unwrap();
        assert_eq!(read_report(&path).unwrap(), rows());
    }

    #[test]
    fn empty_report_keeps_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.xlsx");
        write_table(&Rows(Vec::new()), &path, ExportFormat::Xlsx).unwrap();
        let table = read_table(&path).unwrap();
        assert_eq!(table.header, BETA_COLUMNS);
        assert!(table.rows.is_empty());
    }

    #[test]
    fn wrong_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();
        assert!(matches!(read_report(&path), Err(ExportError::Header { .. })));
    }

    #[test]
    fn unwritable_path_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let path = blocker.join("betas.csv");
        let err = write_table(&Rows(rows()), &path, ExportFormat::Csv).unwrap_err();
        assert!(err.to_string().contains("betas.csv"));
    }
}

//! Ticker universe: where the list of equities comes from.
//!
//! Either an explicit list or a file whose first column holds one symbol per
//! row (no header). Spreadsheets are read with `calamine`; `.csv`/`.txt`
//! with `csv`. Order is preserved and duplicates keep their first occurrence.

use calamine::{open_workbook_auto, Data, Reader};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SPREADSHEET_EXTS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];
const DELIMITED_EXTS: [&str; 2] = ["csv", "txt"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickerSource {
    File(PathBuf),
    List(Vec<String>),
}

#[derive(Debug, Error)]
pub enum UniverseError {
    #[error("unsupported ticker source: {0}")]
    UnsupportedSource(String),

    #[error("cannot read tickers from {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("ticker universe is empty")]
    Empty,
}

impl TickerSource {
    /// Pick the variant from a path's extension, rejecting unknown types early.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, UniverseError> {
        let path = path.into();
        file_kind(&path)?;
        Ok(TickerSource::File(path))
    }
}

enum FileKind {
    Spreadsheet,
    Delimited,
}

fn file_kind(path: &Path) -> Result<FileKind, UniverseError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if SPREADSHEET_EXTS.contains(&ext.as_str()) {
        Ok(FileKind::Spreadsheet)
    } else if DELIMITED_EXTS.contains(&ext.as_str()) {
        Ok(FileKind::Delimited)
    } else {
        Err(UniverseError::UnsupportedSource(format!(
            "'{}' (expected one of: {}, {})",
            path.display(),
            SPREADSHEET_EXTS.join(", "),
            DELIMITED_EXTS.join(", ")
        )))
    }
}

/// Resolve a source into an ordered, de-duplicated, non-empty ticker list,
/// truncated to `max_tickers` when given.
pub fn resolve(
    source: &TickerSource,
    max_tickers: Option<usize>,
) -> Result<Vec<String>, UniverseError> {
    let raw = match source {
        TickerSource::List(list) => list.clone(),
        TickerSource::File(path) => match file_kind(path)? {
            FileKind::Spreadsheet => read_spreadsheet(path)?,
            FileKind::Delimited => read_delimited(path)?,
        },
    };

    let mut seen = HashSet::new();
    let mut tickers: Vec<String> = raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.clone()))
        .collect();

    if let Some(cap) = max_tickers {
        if tickers.len() > cap {
            tracing::info!(total = tickers.len(), cap, "truncating ticker universe");
            tickers.truncate(cap);
        }
    }
    if tickers.is_empty() {
        return Err(UniverseError::Empty);
    }
    tracing::debug!(count = tickers.len(), "resolved ticker universe");
    Ok(tickers)
}

fn read_error(path: &Path, reason: impl ToString) -> UniverseError {
    UniverseError::Read {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Column A of the first worksheet.
fn read_spreadsheet(path: &Path) -> Result<Vec<String>, UniverseError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| read_error(path, e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| read_error(path, "workbook has no worksheets"))?
        .map_err(|e| read_error(path, e))?;

    let (Some((first_row, first_col)), Some((last_row, _))) = (range.start(), range.end()) else {
        return Ok(Vec::new());
    };
    if first_col > 0 {
        return Ok(Vec::new());
    }
    Ok((first_row..=last_row)
        .filter_map(|row| range.get_value((row, 0)).and_then(cell_symbol))
        .collect())
}

fn cell_symbol(cell: &Data) -> Option<String> {
    match cell {
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// First field of each record.
fn read_delimited(path: &Path) -> Result<Vec<String>, UniverseError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| read_error(path, e))?;
    let mut out = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(|e| read_error(path, e))?;
        if let Some(field) = record.get(0) {
            out.push(field.to_string());
        }
    }
    Ok(out)
}

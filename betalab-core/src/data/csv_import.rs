//! Offline provider backed by a directory of per-symbol CSV files.
//!
//! Layout: `<dir>/<SYMBOL>.csv`, one header row, at least the columns
//! `date` and `adj_close`. Optional `open`, `high`, `low`, `close`, `volume`.
//! `date` is `yyyy-mm-dd` or `yyyy-mm-dd HH:MM:SS`. Empty cells are missing
//! prices. Used for reproducible runs and for tests.

use super::provider::{DataError, DataProvider, DataSource, FetchResult, FetchWindow, RawBar};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const REQUIRED_COLUMNS: [&str; 2] = ["date", "adj_close"];

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: String,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    #[serde(default)]
    close: Option<f64>,
    #[serde(default)]
    volume: Option<u64>,
    adj_close: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CsvProvider {
    dir: PathBuf,
}

impl CsvProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn symbol_path(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn read_bars(&self, symbol: &str, path: &Path) -> Result<Vec<RawBar>, DataError> {
        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| DataError::Io(format!("{}: {e}", path.display())))?;

        let headers = rdr
            .headers()
            .map_err(|e| DataError::ResponseFormatChanged(format!("{}: {e}", path.display())))?;
        if let Some(missing) = REQUIRED_COLUMNS
            .iter()
            .find(|col| !headers.iter().any(|h| h == **col))
        {
            return Err(DataError::ResponseFormatChanged(format!(
                "{}: missing required column '{missing}'",
                path.display()
            )));
        }

        let mut bars = Vec::new();
        for (line, row) in rdr.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| {
                DataError::ResponseFormatChanged(format!("{symbol}.csv row {}: {e}", line + 2))
            })?;
            let timestamp = parse_timestamp(&row.date).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!(
                    "{symbol}.csv row {}: bad date '{}'",
                    line + 2,
                    row.date
                ))
            })?;
            let close = row.close.unwrap_or(f64::NAN);
            bars.push(RawBar {
                timestamp,
                open: row.open.unwrap_or(close),
                high: row.high.unwrap_or(close),
                low: row.low.unwrap_or(close),
                close,
                volume: row.volume.unwrap_or(0),
                adj_close: row.adj_close.unwrap_or(f64::NAN),
            });
        }
        Ok(bars)
    }
}

impl DataProvider for CsvProvider {
    fn name(&self) -> &str {
        "csv_directory"
    }

    fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<FetchResult, DataError> {
        let path = self.symbol_path(symbol);
        if !path.is_file() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        let bars: Vec<RawBar> = self
            .read_bars(symbol, &path)?
            .into_iter()
            .filter(|b| window.contains(b.timestamp))
            .collect();
        if bars.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::CsvImport,
        })
    }

    fn is_available(&self) -> bool {
        self.dir.is_dir()
    }
}

fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::default()))
        })
}

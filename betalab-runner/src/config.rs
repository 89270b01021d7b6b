//! Run configuration: TOML file or CLI flags, validated into a typed plan.
//!
//! Raw values stay as strings in `RunConfig` so that every validation error
//! can name the parameter it came from. `RunConfig::validate` runs before any
//! network access.

use betalab_core::data::{Interval, PriceField, TickerSource, UniverseError};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Content hash of a configuration.
pub type RunId = String;

pub const DEFAULT_INTERVAL: &str = "1mo";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TOP: usize = 10;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.025;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {reason}")]
    Io { path: PathBuf, reason: String },

    #[error("malformed config: {0}")]
    Parse(String),

    #[error("missing required parameter '{0}'")]
    Missing(&'static str),

    #[error("invalid {param} '{value}': {reason}")]
    Invalid {
        param: &'static str,
        value: String,
        reason: String,
    },

    #[error("unsupported ticker source: {0}")]
    UnsupportedTickerSource(String),

    #[error(transparent)]
    Universe(#[from] UniverseError),
}

impl ConfigError {
    fn invalid(param: &'static str, value: impl fmt::Display, reason: impl fmt::Display) -> Self {
        ConfigError::Invalid {
            param,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Raw, serializable run configuration.
///
/// ```toml
/// tickers = "universe.xlsx"          # or ["AAPL", "MSFT"]
/// benchmark = "^GSPC"
/// years = 2                          # or start = "2022-01-01"
/// interval = "1mo"
/// output_mode = "E"
/// output_path = "betas.xlsx"
///
/// [fetch]
/// timeout_secs = 120
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// A file path string or an array of symbols.
    #[serde(default)]
    pub tickers: Option<toml::Value>,
    #[serde(default)]
    pub benchmark: Option<String>,
    /// `yyyy-mm-dd`, inclusive.
    #[serde(default)]
    pub start: Option<String>,
    /// `yyyy-mm-dd`, exclusive. Defaults to today.
    #[serde(default)]
    pub end: Option<String>,
    /// Lookback from `end`, used when `start` is absent.
    #[serde(default)]
    pub years: Option<u32>,
    #[serde(default)]
    pub interval: Option<String>,
    #[serde(default)]
    pub price_field: Option<String>,
    /// `E` (export) or `T` (table). Defaults to `T`.
    #[serde(default)]
    pub output_mode: Option<String>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default)]
    pub max_tickers: Option<usize>,
    #[serde(default)]
    pub fetch: FetchSettings,
    #[serde(default)]
    pub sharpe: SharpeSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SharpeSettings {
    /// Annual risk-free rate as a decimal.
    pub risk_free_rate: f64,
    pub top: usize,
}

impl Default for SharpeSettings {
    fn default() -> Self {
        Self {
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            top: DEFAULT_TOP,
        }
    }
}

/// Report delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputMode {
    /// Write a spreadsheet.
    E,
    /// Return the in-memory table.
    T,
}

impl FromStr for OutputMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "E" => Ok(OutputMode::E),
            "T" => Ok(OutputMode::T),
            other => Err(ConfigError::invalid(
                "output mode",
                other,
                "expected 'E' (export) or 'T' (table)",
            )),
        }
    }
}

/// Writer picked from the output file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportFormat {
    Xlsx,
    Csv,
}

impl ExportFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("xlsx") => Ok(ExportFormat::Xlsx),
            Some("csv") => Ok(ExportFormat::Csv),
            _ => Err(ConfigError::invalid(
                "output path",
                path.display(),
                "extension must be .xlsx or .csv",
            )),
        }
    }
}

/// Where the report goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Table,
    File { path: PathBuf, format: ExportFormat },
}

/// Validated configuration, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub source: TickerSource,
    pub benchmark: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub interval: Interval,
    pub price_field: PriceField,
    pub output: OutputTarget,
    pub max_tickers: Option<usize>,
    pub timeout: Duration,
    pub max_retries: u32,
    pub sharpe: SharpeSettings,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Deterministic BLAKE3 hash of the configuration.
    pub fn run_id(&self) -> RunId {
        let bytes = serde_json::to_vec(self).unwrap_or_else(|_| format!("{self:?}").into_bytes());
        blake3::hash(&bytes).to_hex().to_string()
    }

    /// Check every parameter and resolve defaults. `today` is the default end date.
    pub fn validate(&self, today: NaiveDate) -> Result<RunPlan, ConfigError> {
        let source = ticker_source(self.tickers.as_ref())?;

        let benchmark = self
            .benchmark
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .ok_or(ConfigError::Missing("benchmark"))?
            .to_string();

        let end = match &self.end {
            Some(s) => parse_date("end", s)?,
            None => today,
        };
        let start = match (&self.start, self.years) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::invalid(
                    "years",
                    self.years.unwrap_or_default(),
                    "give either 'start' or 'years', not both",
                ))
            }
            (Some(s), None) => parse_date("start", s)?,
            (None, Some(0)) => return Err(ConfigError::invalid("years", 0, "must be at least 1")),
            (None, Some(years)) => end
                .checked_sub_months(Months::new(years.saturating_mul(12)))
                .ok_or_else(|| ConfigError::invalid("years", years, "window starts before year 1"))?,
            (None, None) => return Err(ConfigError::Missing("start")),
        };
        if start >= end {
            return Err(ConfigError::invalid(
                "start",
                start,
                format!("must be before end date {end}"),
            ));
        }

        let interval_raw = self.interval.as_deref().unwrap_or(DEFAULT_INTERVAL);
        let interval = interval_raw
            .parse::<Interval>()
            .map_err(|e| ConfigError::invalid("interval", interval_raw, e))?;

        let price_field = match &self.price_field {
            Some(raw) => raw
                .parse::<PriceField>()
                .map_err(|e| ConfigError::invalid("price field", raw, e))?,
            None => PriceField::default(),
        };

        let mode = match &self.output_mode {
            Some(raw) => raw.parse::<OutputMode>()?,
            None => OutputMode::T,
        };
        let output = match mode {
            OutputMode::T => OutputTarget::Table,
            OutputMode::E => {
                let path = self
                    .output_path
                    .clone()
                    .ok_or(ConfigError::Missing("output path"))?;
                let format = ExportFormat::from_path(&path)?;
                OutputTarget::File { path, format }
            }
        };

        if self.max_tickers == Some(0) {
            return Err(ConfigError::invalid("max tickers", 0, "must be at least 1"));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::invalid("fetch timeout", 0, "must be at least 1 second"));
        }
        if !self.sharpe.risk_free_rate.is_finite() {
            return Err(ConfigError::invalid(
                "risk-free rate",
                self.sharpe.risk_free_rate,
                "must be a finite number",
            ));
        }
        if self.sharpe.top == 0 {
            return Err(ConfigError::invalid("top", 0, "must be at least 1"));
        }

        Ok(RunPlan {
            source,
            benchmark,
            start,
            end,
            interval,
            price_field,
            output,
            max_tickers: self.max_tickers,
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            max_retries: self.fetch.max_retries,
            sharpe: self.sharpe.clone(),
        })
    }
}

/// Symbols as a TOML array, or a path string pointing at a spreadsheet/CSV.
fn ticker_source(value: Option<&toml::Value>) -> Result<TickerSource, ConfigError> {
    match value {
        None => Err(ConfigError::Missing("tickers")),
        Some(toml::Value::String(path)) => Ok(TickerSource::from_path(path.as_str())?),
        Some(toml::Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                toml::Value::String(s) => Ok(s.clone()),
                other => Err(ConfigError::UnsupportedTickerSource(format!(
                    "ticker list entries must be strings, found {}",
                    other.type_str()
                ))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(TickerSource::List),
        Some(other) => Err(ConfigError::UnsupportedTickerSource(format!(
            "'tickers' must be a file path or a list of symbols, found {}",
            other.type_str()
        ))),
    }
}

fn parse_date(param: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| ConfigError::invalid(param, raw, format!("expected yyyy-mm-dd ({e})")))
}

//! Sampling intervals and price-field selection.
//!
//! The interval set mirrors what the Yahoo chart API accepts. Sub-daily
//! intervals are only served for a recent lookback window, which the
//! fetcher checks before sending any request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::provider::RawBar;

/// Bar sampling interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Interval {
    Minute1,
    Minute2,
    Minute5,
    Minute15,
    Minute30,
    Minute60,
    Minute90,
    Hour1,
    Day1,
    Day5,
    Week1,
    Month1,
    Month3,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown interval '{0}' (valid: 1m, 2m, 5m, 15m, 30m, 60m, 90m, 1h, 1d, 5d, 1wk, 1mo, 3mo)")]
pub struct UnknownInterval(pub String);

impl Interval {
    pub const ALL: [Interval; 13] = [
        Interval::Minute1,
        Interval::Minute2,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Minute30,
        Interval::Minute60,
        Interval::Minute90,
        Interval::Hour1,
        Interval::Day1,
        Interval::Day5,
        Interval::Week1,
        Interval::Month1,
        Interval::Month3,
    ];

    /// Provider wire code (`1m`, `1d`, `1mo`, ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute2 => "2m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Minute60 => "60m",
            Interval::Minute90 => "90m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
            Interval::Day5 => "5d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
            Interval::Month3 => "3mo",
        }
    }

    /// True for sub-daily intervals.
    pub fn is_intraday(self) -> bool {
        matches!(
            self,
            Interval::Minute1
                | Interval::Minute2
                | Interval::Minute5
                | Interval::Minute15
                | Interval::Minute30
                | Interval::Minute60
                | Interval::Minute90
                | Interval::Hour1
        )
    }

    /// Oldest start date the provider will serve, in days before today.
    ///
    /// `None` for daily and coarser intervals, which have no such limit.
    pub fn max_lookback_days(self) -> Option<i64> {
        match self {
            Interval::Minute1 => Some(7),
            Interval::Minute2
            | Interval::Minute5
            | Interval::Minute15
            | Interval::Minute30
            | Interval::Minute90 => Some(60),
            Interval::Minute60 | Interval::Hour1 => Some(730),
            _ => None,
        }
    }

    /// Number of bars in a year, used to annualise per-bar statistics.
    ///
    /// Intraday counts assume a 6.5 hour US session and 252 sessions.
    pub fn periods_per_year(self) -> f64 {
        const SESSIONS: f64 = 252.0;
        match self {
            Interval::Minute1 => 390.0 * SESSIONS,
            Interval::Minute2 => 195.0 * SESSIONS,
            Interval::Minute5 => 78.0 * SESSIONS,
            Interval::Minute15 => 26.0 * SESSIONS,
            Interval::Minute30 => 13.0 * SESSIONS,
            Interval::Minute60 | Interval::Hour1 => 7.0 * SESSIONS,
            Interval::Minute90 => 5.0 * SESSIONS,
            Interval::Day1 => SESSIONS,
            Interval::Day5 => SESSIONS / 5.0,
            Interval::Week1 => 52.0,
            Interval::Month1 => 12.0,
            Interval::Month3 => 4.0,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s.trim())
            .ok_or_else(|| UnknownInterval(s.to_string()))
    }
}

impl TryFrom<String> for Interval {
    type Error = UnknownInterval;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.as_str().to_string()
    }
}

/// Which price column feeds the return calculation.
///
/// Only the adjusted close gives a meaningful beta (splits and dividends
/// would otherwise show up as spurious returns), so it is the one accepted
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PriceField {
    #[default]
    AdjClose,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported price field '{0}' (only adjusted close is supported: adj_close)")]
pub struct UnsupportedPriceField(pub String);

impl PriceField {
    pub fn as_str(self) -> &'static str {
        match self {
            PriceField::AdjClose => "adj_close",
        }
    }

    /// Pick this field out of a bar.
    pub fn select(self, bar: &RawBar) -> f64 {
        match self {
            PriceField::AdjClose => bar.adj_close,
        }
    }
}

impl fmt::Display for PriceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceField {
    type Err = UnsupportedPriceField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "adjclose" | "adjustedclose" => Ok(PriceField::AdjClose),
            _ => Err(UnsupportedPriceField(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_code() {
        for code in [
            "1m", "2m", "5m", "15m", "30m", "60m", "90m", "1h", "1d", "5d", "1wk", "1mo", "3mo",
        ] {
            let interval: Interval = code.parse().unwrap();
            assert_eq!(interval.as_str(), code);
        }
    }

    #[test]
    fn rejects_unknown_interval() {
        assert!("2h".parse::<Interval>().is_err());
        assert!("monthly".parse::<Interval>().is_err());
    }

    #[test]
    fn only_sub_daily_has_lookback_limit() {
        for interval in Interval::ALL {
            assert_eq!(interval.is_intraday(), interval.max_lookback_days().is_some());
        }
        assert_eq!(Interval::Minute5.max_lookback_days(), Some(60));
    }

    #[test]
    fn monthly_annualises_by_twelve() {
        assert_eq!(Interval::Month1.periods_per_year(), 12.0);
        assert_eq!(Interval::Day1.periods_per_year(), 252.0);
    }

    #[test]
    fn price_field_aliases() {
        assert_eq!("Adj Close".parse::<PriceField>().unwrap(), PriceField::AdjClose);
        assert_eq!("adj_close".parse::<PriceField>().unwrap(), PriceField::AdjClose);
        assert_eq!("adjclose".parse::<PriceField>().unwrap(), PriceField::AdjClose);
        assert!("Close".parse::<PriceField>().is_err());
        assert!("volume".parse::<PriceField>().is_err());
    }
}

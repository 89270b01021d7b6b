//! Yahoo Finance data provider.
//!
//! Fetches bars from Yahoo's v8 chart API at any supported interval. Handles
//! rate limiting, bounded retries with exponential backoff, the overall fetch
//! deadline, response parsing, and the circuit breaker.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes. The CSV directory provider is the fallback when Yahoo is
//! unavailable.

use super::circuit_breaker::CircuitBreaker;
use super::interval::Interval;
use super::provider::{DataError, DataProvider, DataSource, FetchResult, FetchWindow, RawBar};
use chrono::{DateTime, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

const CHART_BASE: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

const SECONDS_PER_DAY: i64 = 86_400;

/// Upper bound on a single backoff sleep.
const MAX_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Yahoo Finance v8 chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
    request_timeout: Duration,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let request_timeout = Duration::from_secs(30);
        let client = reqwest::blocking::Client::builder()
            .timeout(request_timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            base_url: CHART_BASE.to_string(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            request_timeout,
        })
    }

    /// Override the retry budget. At least one retry is always kept.
    pub fn with_retry(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_delay = base_delay;
        self
    }

    /// Point the client at another chart endpoint (mirrors, local fixtures).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the chart API URL for a symbol and window.
    ///
    /// `period1` starts a day early: exchanges east of UTC stamp the bar for
    /// their local `start` date on the previous UTC day. The fetch step trims
    /// back to `[start, end)` after the dates are normalised.
    fn chart_url(&self, symbol: &str, window: &FetchWindow) -> String {
        let start_ts = window.start.and_time(NaiveTime::default()).and_utc().timestamp()
            - SECONDS_PER_DAY;
        let end_ts = window.end.and_time(NaiveTime::default()).and_utc().timestamp();
        format!(
            "{}/{}?period1={start_ts}&period2={end_ts}&interval={}\
             &includeAdjustedClose=true&events=div%2Csplits",
            self.base_url,
            encode_symbol(symbol),
            window.interval
        )
    }

    /// Parse the chart API response into RawBars.
    fn parse_response(
        symbol: &str,
        interval: Interval,
        resp: ChartResponse,
    ) -> Result<Vec<RawBar>, DataError> {
        let result = resp.chart.result.ok_or_else(|| match resp.chart.error {
            Some(err) => chart_error(symbol, 200, err),
            None => DataError::ResponseFormatChanged("empty result with no error".into()),
        })?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        let gmtoffset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);

        // A listed symbol with no trades in the window has no timestamp array.
        let Some(timestamps) = data.timestamp else {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        // Intraday responses carry no adjclose block; the raw close is the
        // adjusted close at that granularity.
        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let timestamp = bar_timestamp(ts, gmtoffset, interval).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();
            let adj_close = match &adj_closes {
                Some(v) => v.get(i).copied().flatten(),
                None => close,
            };

            // Skip rows where everything is null (holidays, halted sessions)
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
                && adj_close.is_none()
            {
                continue;
            }

            bars.push(RawBar {
                timestamp,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0),
                adj_close: adj_close.unwrap_or(f64::NAN),
            });
        }

        if bars.is_empty() {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        Ok(bars)
    }

    /// Execute the chart request with retry, deadline, and circuit breaker logic.
    ///
    /// The breaker counts one failure per exhausted symbol, not per attempt.
    /// If it opens mid-retry (shared with another client), the last provider
    /// error is returned rather than the breaker state.
    fn fetch_with_retry(&self, symbol: &str, window: &FetchWindow) -> Result<Vec<RawBar>, DataError> {
        let started = Instant::now();
        let url = self.chart_url(symbol, window);
        let mut last_error: Option<DataError> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                if !self.circuit_breaker.is_allowed() {
                    break;
                }
                let delay = retry_delay(self.base_delay, attempt);
                if let Some(deadline) = window.deadline {
                    if Instant::now() + delay >= deadline {
                        return Err(timeout_error(started));
                    }
                }
                tracing::warn!(symbol, attempt, delay_ms = delay.as_millis() as u64, "retrying chart request");
                std::thread::sleep(delay);
            }

            let request_timeout = match window.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(timeout_error(started));
                    }
                    remaining.min(self.request_timeout)
                }
                None => self.request_timeout,
            };

            if !self.circuit_breaker.is_allowed() {
                return Err(last_error.unwrap_or_else(|| self.tripped()));
            }

            tracing::debug!(symbol, %url, "chart request");
            let err = match self.client.get(&url).timeout(request_timeout).send() {
                Ok(resp) => match self.handle_response(symbol, window.interval, resp) {
                    Ok(bars) => {
                        self.circuit_breaker.record_success();
                        return Ok(bars);
                    }
                    Err(e) => e,
                },
                Err(e) if e.is_timeout() => {
                    if window.deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(timeout_error(started));
                    }
                    DataError::NetworkUnreachable(e.to_string())
                }
                Err(e) if e.is_connect() => DataError::NetworkUnreachable(e.to_string()),
                Err(e) => return Err(DataError::NetworkUnreachable(e.to_string())),
            };

            if !err.is_transient() {
                return Err(err);
            }
            last_error = Some(err);
        }

        self.circuit_breaker.record_failure();
        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }

    /// Map one HTTP response onto bars or a classified error.
    fn handle_response(
        &self,
        symbol: &str,
        interval: Interval,
        resp: reqwest::blocking::Response,
    ) -> Result<Vec<RawBar>, DataError> {
        let status = resp.status();

        if status == reqwest::StatusCode::FORBIDDEN {
            // IP ban: stop everything
            self.circuit_breaker.trip();
            return Err(self.tripped());
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }

        if status.is_server_error() {
            return Err(DataError::ServerError {
                status: status.as_u16(),
            });
        }

        if !status.is_success() {
            // 4xx bodies still carry a chart.error with the reason
            return Err(match resp.json::<ChartResponse>() {
                Ok(ChartResponse {
                    chart: ChartResult {
                        error: Some(err), ..
                    },
                }) => chart_error(symbol, status.as_u16(), err),
                _ if status == reqwest::StatusCode::NOT_FOUND => DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                },
                _ => DataError::Rejected {
                    status: status.as_u16(),
                    message: format!("HTTP {status} for {symbol}"),
                },
            });
        }

        let chart: ChartResponse = resp.json().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;

        Self::parse_response(symbol, interval, chart)
    }

    fn tripped(&self) -> DataError {
        DataError::CircuitBreakerTripped {
            remaining_secs: self.circuit_breaker.remaining_cooldown().as_secs(),
        }
    }
}

impl DataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(&self, symbol: &str, window: &FetchWindow) -> Result<FetchResult, DataError> {
        let bars = self.fetch_with_retry(symbol, window)?;
        Ok(FetchResult {
            symbol: symbol.to_string(),
            bars,
            source: DataSource::YahooFinance,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

fn chart_error(symbol: &str, status: u16, err: ChartError) -> DataError {
    if err.code == "Not Found" {
        DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        }
    } else {
        DataError::Rejected {
            status,
            message: format!("{}: {}", err.code, err.description),
        }
    }
}

/// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)`, capped.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

fn timeout_error(started: Instant) -> DataError {
    DataError::Timeout {
        elapsed_secs: started.elapsed().as_secs(),
    }
}

/// Bar timestamp on the panel axis.
///
/// Daily and coarser bars collapse to the exchange-local calendar date at
/// midnight; intraday bars keep their UTC instant.
fn bar_timestamp(ts: i64, gmtoffset: i64, interval: Interval) -> Option<NaiveDateTime> {
    if interval.is_intraday() {
        DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc())
    } else {
        DateTime::from_timestamp(ts + gmtoffset, 0)
            .map(|dt| dt.naive_utc().date().and_time(NaiveTime::default()))
    }
}

/// Percent-encode a symbol for use as a URL path segment (`^GSPC`, `EURUSD=X`).
fn encode_symbol(symbol: &str) -> String {
    let mut out = String::with_capacity(symbol.len());
    for b in symbol.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn parse(json: &str) -> ChartResponse {
        serde_json::from_str(json).unwrap()
    }

    const DAILY: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "gmtoffset": -18000 },
                "timestamp": [1704205800, 1704292200, 1704378600],
                "indicators": {
                    "quote": [{
                        "open": [100.0, null, 102.0],
                        "high": [101.0, null, 103.0],
                        "low": [99.0, null, 101.0],
                        "close": [100.5, null, 102.5],
                        "volume": [1000, null, 1200]
                    }],
                    "adjclose": [{ "adjclose": [99.5, null, 101.5] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn parses_daily_bars_and_skips_null_rows() {
        let bars = YahooProvider::parse_response("SPY", Interval::Day1, parse(DAILY)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].adj_close, 99.5);
        assert_eq!(bars[1].adj_close, 101.5);
        // 2024-01-02 14:30 UTC at UTC-5 is still 2024-01-02 locally
        assert_eq!(
            bars[0].timestamp,
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn intraday_falls_back_to_close_without_adjclose() {
        let json = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1704205800, 1704206100],
                    "indicators": {
                        "quote": [{
                            "open": [1.0, 2.0], "high": [1.0, 2.0], "low": [1.0, 2.0],
                            "close": [1.5, 2.5], "volume": [10, 20]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let bars = YahooProvider::parse_response("SPY", Interval::Minute5, parse(json)).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].adj_close, 2.5);
        assert_ne!(bars[0].timestamp, bars[1].timestamp);
    }

    #[test]
    fn not_found_maps_to_symbol_not_found() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        let err = YahooProvider::parse_response("ZZZZ", Interval::Day1, parse(json)).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { ref symbol } if symbol == "ZZZZ"));
    }

    #[test]
    fn other_chart_errors_are_rejections() {
        let json = r#"{"chart":{"result":null,"error":{"code":"Unprocessable Entity","description":"5m data not available for startTime"}}}"#;
        let err = YahooProvider::parse_response("SPY", Interval::Minute5, parse(json)).unwrap_err();
        assert!(matches!(err, DataError::Rejected { .. }));
        assert!(!err.is_transient());
    }

    fn provider() -> YahooProvider {
        YahooProvider::new(Arc::new(CircuitBreaker::default_provider())).unwrap()
    }

    fn month_window() -> FetchWindow {
        FetchWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            Interval::Month1,
        )
    }

    #[test]
    fn url_encodes_index_symbols_and_interval() {
        let url = provider().chart_url("^GSPC", &month_window());
        assert!(url.starts_with(CHART_BASE));
        assert!(url.contains("/chart/%5EGSPC?"));
        assert!(url.contains("interval=1mo"));
        // one day before 2024-01-01 00:00 UTC
        assert!(url.contains("period1=1703980800"));
        assert!(url.contains("period2=1706745600"));
    }

    #[test]
    fn window_reaches_back_for_exchanges_east_of_utc() {
        // Tokyo (UTC+9) stamps its 2024-01-01 session at 2023-12-31 15:00 UTC
        let bar_ts = 1704034800;
        let url = provider().chart_url("7203.T", &month_window());
        let period1: i64 = url
            .split("period1=")
            .nth(1)
            .and_then(|rest| rest.split('&').next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(period1 <= bar_ts);
        assert_eq!(
            bar_timestamp(bar_ts, 32_400, Interval::Day1).unwrap().date(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
        );
    }

    #[test]
    fn base_url_is_configurable() {
        let url = provider()
            .with_base_url("http://127.0.0.1:9/chart/")
            .chart_url("SPY", &month_window());
        assert!(url.starts_with("http://127.0.0.1:9/chart/SPY?"));
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(retry_delay(base, 1), Duration::from_millis(500));
        assert_eq!(retry_delay(base, 2), Duration::from_millis(1000));
        assert_eq!(retry_delay(base, 3), Duration::from_millis(2000));
        assert_eq!(retry_delay(base, 40), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(base, u32::MAX), MAX_RETRY_DELAY);
    }

    mod http {
        use super::*;
        use std::io::{Read, Write};
        use std::net::TcpListener;
        use std::sync::atomic::{AtomicUsize, Ordering};

        /// Answers one connection per canned `(status, body)`, in order, and
        /// counts the requests it saw.
        fn serve(responses: Vec<(u16, &'static str)>) -> (String, Arc<AtomicUsize>) {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = listener.local_addr().unwrap();
            let hits = Arc::new(AtomicUsize::new(0));
            let counter = Arc::clone(&hits);
            std::thread::spawn(move || {
                for (status, body) in responses {
                    let Ok((mut stream, _)) = listener.accept() else {
                        return;
                    };
                    counter.fetch_add(1, Ordering::SeqCst);
                    let mut buf = [0u8; 8192];
                    let _ = stream.read(&mut buf);
                    let reply = format!(
                        "HTTP/1.1 {status} Canned\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = stream.write_all(reply.as_bytes());
                }
            });
            (format!("http://{addr}/chart"), hits)
        }

        fn local(base: &str, retries: u32, breaker: &Arc<CircuitBreaker>) -> YahooProvider {
            YahooProvider::new(Arc::clone(breaker))
                .unwrap()
                .with_base_url(base)
                .with_retry(retries, Duration::from_millis(5))
        }

        #[test]
        fn server_errors_spend_the_whole_retry_budget() {
            let (base, hits) = serve(vec![(503, "{}"); 6]);
            let breaker = Arc::new(CircuitBreaker::default_provider());
            let err = local(&base, 3, &breaker)
                .fetch_with_retry("SPY", &month_window())
                .unwrap_err();

            assert_eq!(hits.load(Ordering::SeqCst), 4);
            assert!(matches!(err, DataError::ServerError { status: 503 }), "{err}");
            // one failed symbol is one breaker failure
            assert!(breaker.is_allowed());
        }

        #[test]
        fn not_found_is_not_retried() {
            let (base, hits) = serve(vec![(404, "{}"); 3]);
            let breaker = Arc::new(CircuitBreaker::default_provider());
            let err = local(&base, 3, &breaker)
                .fetch_with_retry("ZZZZ", &month_window())
                .unwrap_err();

            assert_eq!(hits.load(Ordering::SeqCst), 1);
            assert!(matches!(err, DataError::SymbolNotFound { ref symbol } if symbol == "ZZZZ"));
        }

        #[test]
        fn rate_limit_then_success_returns_bars() {
            let (base, hits) = serve(vec![(429, "{}"), (200, DAILY)]);
            let breaker = Arc::new(CircuitBreaker::default_provider());
            let bars = local(&base, 3, &breaker)
                .fetch_with_retry("SPY", &month_window())
                .unwrap();

            assert_eq!(hits.load(Ordering::SeqCst), 2);
            assert_eq!(bars.len(), 2);
            assert_eq!(bars[0].adj_close, 99.5);
        }

        #[test]
        fn repeated_failed_symbols_open_the_breaker() {
            let (base, hits) = serve(vec![(500, "{}"); 8]);
            let breaker = Arc::new(CircuitBreaker::new(Duration::from_secs(60), 3));
            let provider = local(&base, 1, &breaker);

            for symbol in ["AAA", "BBB", "CCC"] {
                let err = provider.fetch_with_retry(symbol, &month_window()).unwrap_err();
                assert!(matches!(err, DataError::ServerError { status: 500 }), "{err}");
            }
            assert_eq!(hits.load(Ordering::SeqCst), 6);

            let err = provider.fetch_with_retry("DDD", &month_window()).unwrap_err();
            assert!(matches!(err, DataError::CircuitBreakerTripped { .. }), "{err}");
            assert_eq!(hits.load(Ordering::SeqCst), 6);
            assert!(!provider.is_available());
        }
    }
}

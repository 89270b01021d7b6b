//! End-to-end data path: CSV directory provider → fetch → align → fit.

use chrono::NaiveDate;
use std::fmt::Write as _;
use std::path::Path;
use betalab_core::data::{
    align_prices, fetch_prices, CsvProvider, DataError, FetchError, FetchRequest, Interval,
    LogProgress, PriceField, ReturnPanel,
};
use betalab_core::stats::fit;

fn month(i: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2022 + (i / 12) as i32, i % 12 + 1, 1).unwrap()
}

fn write_series(dir: &Path, symbol: &str, prices: &[(u32, f64)]) {
    let mut body = String::from("date,adj_close\n");
    for (i, px) in prices {
        writeln!(body, "{},{px}", month(*i)).unwrap();
    }
    std::fs::write(dir.join(format!("{symbol}.csv")), body).unwrap();
}

fn index_level(i: u32) -> f64 {
    100.0 * (1.0 + 0.03 * ((i as f64) * 1.3).sin())
}

fn request(tickers: &[&str]) -> FetchRequest {
    FetchRequest {
        tickers: tickers.iter().map(|s| s.to_string()).collect(),
        benchmark: "IDX".into(),
        start: month(0),
        end: month(24),
        interval: Interval::Month1,
        price_field: PriceField::AdjClose,
        timeout: None,
        today: month(30),
    }
}

fn fixture() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let idx: Vec<(u32, f64)> = (0..24).map(|i| (i, index_level(i))).collect();
    write_series(dir.path(), "IDX", &idx);
    // AAA tracks the index squared: log-return beta of exactly 2
    let aaa: Vec<(u32, f64)> = idx.iter().map(|(i, p)| (*i, p * p / 100.0)).collect();
    write_series(dir.path(), "AAA", &aaa);
    let bbb: Vec<(u32, f64)> = (0..24)
        .map(|i| (i, 50.0 + 2.0 * ((i as f64) * 0.7).cos() + i as f64 * 0.1))
        .collect();
    write_series(dir.path(), "BBB", &bbb);
    let ccc: Vec<(u32, f64)> = (0..24).filter(|i| *i != 10).map(|i| (i, 20.0 + i as f64)).collect();
    write_series(dir.path(), "CCC", &ccc);
    dir
}

#[test]
fn twenty_four_monthly_prices_give_twenty_three_observations() {
    let dir = fixture();
    let provider = CsvProvider::new(dir.path());
    let prices = fetch_prices(&provider, &request(&["AAA", "BBB"]), &LogProgress).unwrap();
    let panel = ReturnPanel::from_prices(&align_prices(&prices)).unwrap();

    assert_eq!(panel.tickers().collect::<Vec<_>>(), ["AAA", "BBB"]);
    assert_eq!(panel.nobs(), 23);

    let aaa = fit(&panel.columns["AAA"], &panel.benchmark).unwrap();
    assert!((aaa.beta - 2.0).abs() < 1e-9);
    assert!((aaa.r_squared - 1.0).abs() < 1e-9);
    assert_eq!(aaa.nobs, 23);
}

#[test]
fn missing_month_drops_ccc_and_leaves_others_unchanged() {
    let dir = fixture();
    let provider = CsvProvider::new(dir.path());

    let without = fetch_prices(&provider, &request(&["AAA", "BBB"]), &LogProgress).unwrap();
    let with = fetch_prices(&provider, &request(&["AAA", "CCC", "BBB"]), &LogProgress).unwrap();
    let a = ReturnPanel::from_prices(&align_prices(&without)).unwrap();
    let b = ReturnPanel::from_prices(&align_prices(&with)).unwrap();

    assert_eq!(b.tickers().collect::<Vec<_>>(), ["AAA", "BBB"]);
    assert_eq!(b.dropped[0].symbol, "CCC");
    assert_eq!(a.nobs(), b.nobs());
    for t in ["AAA", "BBB"] {
        let fa = fit(&a.columns[t], &a.benchmark).unwrap();
        let fb = fit(&b.columns[t], &b.benchmark).unwrap();
        assert_eq!(fa, fb);
    }
}

#[test]
fn unknown_ticker_is_a_retrieval_error() {
    let dir = fixture();
    let provider = CsvProvider::new(dir.path());
    let err = fetch_prices(&provider, &request(&["AAA", "NOPE"]), &LogProgress).unwrap_err();
    match err {
        FetchError::Symbol { symbol, interval, source, .. } => {
            assert_eq!(symbol, "NOPE");
            assert_eq!(interval, Interval::Month1);
            assert!(matches!(source, DataError::SymbolNotFound { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }
}

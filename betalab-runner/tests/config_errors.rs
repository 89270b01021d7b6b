//! Configuration problems surface before any request is sent.

mod common;

use betalab_core::data::DataError;
use betalab_runner::{run_beta_as_of, ConfigError, RunError, RunConfig};
use common::{as_of, config, standard_provider};

fn assert_config_error(cfg: &RunConfig, needle: &str) {
    let provider = standard_provider();
    let err = run_beta_as_of(cfg, &provider, as_of()).unwrap_err();
    assert!(matches!(err, RunError::Config(_)), "{err}");
    assert!(err.to_string().contains(needle), "'{err}' should mention '{needle}'");
    assert_eq!(provider.calls(), 0, "no request may be sent");
}

#[test]
fn bad_output_mode() {
    let mut cfg = config(&["AAA"]);
    cfg.output_mode = Some("X".into());
    assert_config_error(&cfg, "output mode");
}

#[test]
fn export_without_path() {
    let mut cfg = config(&["AAA"]);
    cfg.output_mode = Some("E".into());
    assert_config_error(&cfg, "output path");
}

#[test]
fn export_with_unknown_extension() {
    let mut cfg = config(&["AAA"]);
    cfg.output_mode = Some("E".into());
    cfg.output_path = Some("report.pdf".into());
    assert_config_error(&cfg, "report.pdf");
}

#[test]
fn unsupported_ticker_source_type() {
    let mut cfg = config(&["AAA"]);
    cfg.tickers = Some(toml::Value::Boolean(true));
    assert_config_error(&cfg, "tickers");

    let mut cfg = config(&["AAA"]);
    cfg.tickers = Some(toml::Value::String("tickers.parquet".into()));
    assert_config_error(&cfg, "tickers.parquet");
}

#[test]
fn missing_ticker_file() {
    let mut cfg = config(&["AAA"]);
    cfg.tickers = Some(toml::Value::String("/definitely/not/here.xlsx".into()));
    assert_config_error(&cfg, "/definitely/not/here.xlsx");
}

#[test]
fn empty_ticker_list() {
    let cfg = config(&[]);
    assert_config_error(&cfg, "empty");
}

#[test]
fn bad_interval_and_dates() {
    let mut cfg = config(&["AAA"]);
    cfg.interval = Some("7d".into());
    assert_config_error(&cfg, "interval");

    let mut cfg = config(&["AAA"]);
    cfg.end = Some("2021-12-31".into());
    assert_config_error(&cfg, "start");

    let mut cfg = config(&["AAA"]);
    cfg.price_field = Some("Volume".into());
    assert_config_error(&cfg, "price field");
}

#[test]
fn stale_intraday_window_fails_before_any_request() {
    let provider = standard_provider();
    let mut cfg = config(&["AAA"]);
    cfg.interval = Some("15m".into());
    let err = run_beta_as_of(&cfg, &provider, as_of()).unwrap_err();
    match &err {
        RunError::Retrieval(e) => assert!(matches!(
            e.data_error(),
            DataError::IntradayLookbackExceeded { max_days: 60, .. }
        )),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("15m"));
    assert_eq!(provider.calls(), 0);
}

#[test]
fn toml_file_errors_name_the_file() {
    let err = RunConfig::from_file(std::path::Path::new("/no/such/run.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("run.toml"));
}

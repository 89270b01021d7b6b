//! betalab runner: configuration, orchestration, and report export.
//!
//! This crate builds on `betalab-core` to provide:
//! - TOML/flag run configuration validated into a typed plan
//! - Parallel per-ticker beta estimation
//! - Beta report and Sharpe ranking
//! - `.xlsx` / `.csv` sinks with read-back, JSON and polars views

pub mod config;
pub mod engine;
pub mod export;
pub mod report;
pub mod runner;
pub mod sharpe;

pub use config::{
    ConfigError, ExportFormat, FetchSettings, OutputMode, OutputTarget, RunConfig, RunId, RunPlan,
    SharpeSettings,
};
pub use engine::{estimate_betas, Estimates, FitFailure};
pub use export::{export_json, read_report, read_table, write_table, ExportError, Table};
pub use report::{BetaReport, Cell, ReportMeta, ReportRow, Tabular, BETA_COLUMNS};
pub use runner::{run_beta, run_beta_as_of, run_sharpe, run_sharpe_as_of, RunError, RunOutput};
pub use sharpe::{rank_sharpe, sharpe_ratio, SharpeReport, SharpeRow, SHARPE_COLUMNS};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn reports_are_send_sync() {
        assert_send::<BetaReport>();
        assert_sync::<BetaReport>();
        assert_send::<SharpeReport>();
        assert_sync::<SharpeReport>();
    }

    #[test]
    fn config_types_are_send_sync() {
        assert_send::<RunConfig>();
        assert_sync::<RunConfig>();
        assert_send::<RunPlan>();
        assert_sync::<RunPlan>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<RunError>();
        assert_sync::<RunError>();
    }
}

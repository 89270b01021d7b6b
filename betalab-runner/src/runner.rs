//! Pipeline orchestration: validate, resolve, fetch, align, fit, emit.
//!
//! Two entry points share the same front half:
//! - `run_beta()`: per-ticker OLS beta against the benchmark.
//! - `run_sharpe()`: annualised Sharpe ranking of the surviving tickers.
//!
//! Everything that can be checked without the network (parameters, output
//! path, ticker file) is checked before the first request.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use betalab_core::data::{
    align_prices, fetch_prices, resolve, AlignError, DataProvider, FetchError, FetchRequest,
    LogProgress, ReturnPanel,
};

use crate::config::{ConfigError, OutputTarget, RunConfig, RunPlan};
use crate::engine::estimate_betas;
use crate::export::{write_table, ExportError};
use crate::report::{BetaReport, ReportMeta, Tabular};
use crate::sharpe::{rank_sharpe, SharpeReport};

/// Fatal errors from a run. Per-ticker fit failures are not here: they are
/// recorded inside the report.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("retrieval error: {0}")]
    Retrieval(#[from] FetchError),
    #[error("data error: {0}")]
    Data(#[from] AlignError),
    #[error("sink error: {0}")]
    Sink(#[from] ExportError),
}

/// What a run produced.
#[derive(Debug, Clone)]
pub enum RunOutput<R> {
    /// Mode `T`: the in-memory table.
    Table(R),
    /// Mode `E`: the file that was written, plus the report behind it.
    Written { path: PathBuf, report: R },
}

impl<R> RunOutput<R> {
    pub fn report(&self) -> &R {
        match self {
            RunOutput::Table(report) | RunOutput::Written { report, .. } => report,
        }
    }

    pub fn into_report(self) -> R {
        match self {
            RunOutput::Table(report) | RunOutput::Written { report, .. } => report,
        }
    }
}

/// Aligned data and metadata, ready for estimation.
struct Prepared {
    plan: RunPlan,
    panel: ReturnPanel,
    meta: ReportMeta,
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Beta report with today as the default end date.
pub fn run_beta(
    config: &RunConfig,
    provider: &dyn DataProvider,
) -> Result<RunOutput<BetaReport>, RunError> {
    run_beta_as_of(config, provider, today())
}

/// Beta report with an explicit reference date (default end, intraday lookback).
pub fn run_beta_as_of(
    config: &RunConfig,
    provider: &dyn DataProvider,
    today: NaiveDate,
) -> Result<RunOutput<BetaReport>, RunError> {
    let Prepared { plan, panel, meta } = prepare(config, provider, today)?;

    let estimates = estimate_betas(&panel);
    let report = BetaReport::compile(meta, &panel, estimates);
    tracing::info!(
        rows = report.rows.len(),
        failures = report.failures.len(),
        dropped = report.dropped.len(),
        nobs = report.nobs,
        "beta report compiled"
    );
    emit(report, &plan.output)
}

/// Sharpe ranking with today as the default end date.
pub fn run_sharpe(
    config: &RunConfig,
    provider: &dyn DataProvider,
) -> Result<RunOutput<SharpeReport>, RunError> {
    run_sharpe_as_of(config, provider, today())
}

pub fn run_sharpe_as_of(
    config: &RunConfig,
    provider: &dyn DataProvider,
    today: NaiveDate,
) -> Result<RunOutput<SharpeReport>, RunError> {
    let Prepared { plan, panel, meta } = prepare(config, provider, today)?;

    let report = rank_sharpe(
        meta,
        &panel,
        plan.interval.periods_per_year(),
        plan.sharpe.risk_free_rate,
        plan.sharpe.top,
    );
    tracing::info!(
        rows = report.rows.len(),
        failures = report.failures.len(),
        "sharpe ranking compiled"
    );
    emit(report, &plan.output)
}

fn prepare(
    config: &RunConfig,
    provider: &dyn DataProvider,
    today: NaiveDate,
) -> Result<Prepared, RunError> {
    let run_id = config.run_id();
    let plan = config.validate(today)?;
    let tickers = resolve(&plan.source, plan.max_tickers).map_err(ConfigError::from)?;
    tracing::info!(
        run_id = %&run_id[..12],
        tickers = tickers.len(),
        benchmark = %plan.benchmark,
        interval = %plan.interval,
        start = %plan.start,
        end = %plan.end,
        "starting run"
    );

    let request = FetchRequest {
        tickers,
        benchmark: plan.benchmark.clone(),
        start: plan.start,
        end: plan.end,
        interval: plan.interval,
        price_field: plan.price_field,
        timeout: Some(plan.timeout),
        today,
    };
    let prices = fetch_prices(provider, &request, &LogProgress)?;
    let panel = ReturnPanel::from_prices(&align_prices(&prices))?;
    if panel.is_empty() {
        tracing::warn!("no ticker has complete data over the window");
    }

    let meta = ReportMeta {
        benchmark: plan.benchmark.clone(),
        interval: plan.interval.to_string(),
        start: plan.start,
        end: plan.end,
        run_id,
    };
    Ok(Prepared { plan, panel, meta })
}

fn emit<R: Tabular>(report: R, output: &OutputTarget) -> Result<RunOutput<R>, RunError> {
    match output {
        OutputTarget::Table => Ok(RunOutput::Table(report)),
        OutputTarget::File { path, format } => {
            write_table(&report, path, *format)?;
            Ok(RunOutput::Written {
                path: path.clone(),
                report,
            })
        }
    }
}

//! betalab CLI: beta and Sharpe commands.
//!
//! Commands:
//! - `beta`: OLS beta of each ticker against a benchmark, as a table or a file
//! - `sharpe`: annualised Sharpe ranking of the same universe
//!
//! Every run parameter can come from a TOML file (`--config`), from flags, or
//! both; flags win.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use betalab_core::data::{CircuitBreaker, CsvProvider, DataProvider, YahooProvider};
use betalab_runner::{
    export_json, run_beta, run_sharpe, BetaReport, Cell, RunConfig, RunOutput, SharpeReport,
    Tabular,
};

const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(
    name = "betalab",
    version,
    about = "betalab: market beta and Sharpe ranking against a benchmark"
)]
struct Cli {
    /// Log filter, e.g. `betalab_core=debug`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate each ticker's beta against the benchmark.
    Beta {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Rank tickers by annualised Sharpe ratio.
    Sharpe {
        #[command(flatten)]
        run: RunArgs,

        /// Annual risk-free rate as a decimal (default 0.025).
        #[arg(long, allow_hyphen_values = true)]
        rf: Option<f64>,

        /// Number of tickers to keep (default 10).
        #[arg(long)]
        top: Option<usize>,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// TOML run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Symbols, space- or comma-separated (e.g. AAPL MSFT).
    #[arg(long, num_args = 1.., value_delimiter = ',', conflicts_with = "tickers_file")]
    tickers: Vec<String>,

    /// Spreadsheet or CSV with one symbol per row in the first column.
    #[arg(long)]
    tickers_file: Option<PathBuf>,

    /// Benchmark symbol (e.g. ^GSPC).
    #[arg(long)]
    benchmark: Option<String>,

    /// Start date (YYYY-MM-DD), inclusive.
    #[arg(long, conflicts_with = "years")]
    start: Option<String>,

    /// End date (YYYY-MM-DD), exclusive. Defaults to today.
    #[arg(long)]
    end: Option<String>,

    /// Look back this many years from the end date.
    #[arg(long)]
    years: Option<u32>,

    /// Bar interval: 1m 2m 5m 15m 30m 60m 90m 1h 1d 5d 1wk 1mo 3mo.
    #[arg(long)]
    interval: Option<String>,

    /// Price field to regress on.
    #[arg(long)]
    price_field: Option<String>,

    /// Output mode: E (export to --output) or T (print a table).
    #[arg(long)]
    mode: Option<String>,

    /// Export file, .xlsx or .csv.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Keep only the first N tickers.
    #[arg(long)]
    max_tickers: Option<usize>,

    /// Budget for the whole fetch step, in seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Retries per symbol on transient provider errors.
    #[arg(long)]
    max_retries: Option<u32>,

    /// Read `<SYMBOL>.csv` bar files from this directory instead of the network.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Also print the full report as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl RunArgs {
    /// Config file (if any) with flags layered on top.
    fn to_config(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::from_file(path)?,
            None => RunConfig::default(),
        };

        if !self.tickers.is_empty() {
            cfg.tickers = Some(toml::Value::Array(
                self.tickers
                    .iter()
                    .map(|t| toml::Value::String(t.clone()))
                    .collect(),
            ));
        }
        if let Some(path) = &self.tickers_file {
            cfg.tickers = Some(toml::Value::String(path.display().to_string()));
        }
        if self.start.is_some() {
            cfg.start = self.start.clone();
            cfg.years = None;
        }
        if self.years.is_some() {
            cfg.years = self.years;
            cfg.start = None;
        }
        override_with(&mut cfg.benchmark, &self.benchmark);
        override_with(&mut cfg.end, &self.end);
        override_with(&mut cfg.interval, &self.interval);
        override_with(&mut cfg.price_field, &self.price_field);
        override_with(&mut cfg.output_mode, &self.mode);
        override_with(&mut cfg.output_path, &self.output);
        override_with(&mut cfg.max_tickers, &self.max_tickers);
        if let Some(secs) = self.timeout_secs {
            cfg.fetch.timeout_secs = secs;
        }
        if let Some(retries) = self.max_retries {
            cfg.fetch.max_retries = retries;
        }
        Ok(cfg)
    }
}

fn override_with<T: Clone>(slot: &mut Option<T>, flag: &Option<T>) {
    if flag.is_some() {
        slot.clone_from(flag);
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    match cli.command {
        Commands::Beta { run } => run_beta_cmd(&run),
        Commands::Sharpe { run, rf, top } => run_sharpe_cmd(&run, rf, top),
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => tracing_subscriber::EnvFilter::new(f),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "betalab_core=info,betalab_runner=info".into()),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_provider(args: &RunArgs, cfg: &RunConfig) -> Result<Box<dyn DataProvider>> {
    if let Some(dir) = &args.data_dir {
        return Ok(Box::new(CsvProvider::new(dir.clone())));
    }
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    let provider = YahooProvider::new(circuit_breaker)
        .context("cannot start the Yahoo Finance client")?
        .with_retry(cfg.fetch.max_retries, RETRY_BASE_DELAY);
    Ok(Box::new(provider))
}

fn run_beta_cmd(args: &RunArgs) -> Result<()> {
    let cfg = args.to_config()?;
    let provider = build_provider(args, &cfg)?;

    let output = run_beta(&cfg, provider.as_ref())?;
    deliver(&output, args.json)?;

    let report: &BetaReport = output.report();
    print_notes(&report.dropped);
    for failure in &report.failures {
        println!("WARNING: no beta for {}: {}", failure.ticker, failure.reason);
    }
    Ok(())
}

fn run_sharpe_cmd(args: &RunArgs, rf: Option<f64>, top: Option<usize>) -> Result<()> {
    let mut cfg = args.to_config()?;
    if let Some(rf) = rf {
        cfg.sharpe.risk_free_rate = rf;
    }
    if let Some(top) = top {
        cfg.sharpe.top = top;
    }
    let provider = build_provider(args, &cfg)?;

    let output = run_sharpe(&cfg, provider.as_ref())?;
    deliver(&output, args.json)?;

    let report: &SharpeReport = output.report();
    print_notes(&report.dropped);
    for failure in &report.failures {
        println!("WARNING: no Sharpe ratio for {}: {}", failure.ticker, failure.reason);
    }
    Ok(())
}

/// Print the table or confirm the export, then the JSON dump if asked.
fn deliver<R: Tabular + Serialize>(output: &RunOutput<R>, json: bool) -> Result<()> {
    match output {
        RunOutput::Table(report) => print_table(report),
        RunOutput::Written { path, report } => {
            println!("Wrote {} row(s) to {}", report.cells().len(), path.display());
        }
    }
    if json {
        println!("{}", export_json(output.report())?);
    }
    Ok(())
}

fn print_notes(dropped: &[String]) {
    if !dropped.is_empty() {
        println!("WARNING: dropped for incomplete data: {}", dropped.join(", "));
    }
}

fn print_table(table: &dyn Tabular) {
    let header = table.columns();
    let rows: Vec<Vec<String>> = table
        .cells()
        .iter()
        .map(|row| row.iter().map(Cell::render).collect())
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.len());
        }
    }

    println!();
    let line: Vec<String> = header
        .iter()
        .zip(&widths)
        .map(|(h, w)| format!("{h:<w$}"))
        .collect();
    println!("{}", line.join("  "));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .enumerate()
            .map(|(i, (cell, w))| {
                if i == 0 {
                    format!("{cell:<w$}")
                } else {
                    format!("{cell:>w$}")
                }
            })
            .collect();
        println!("{}", line.join("  "));
    }
    if rows.is_empty() {
        println!("(no rows)");
    }
    println!();
}

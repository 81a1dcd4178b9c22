//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::adapters::csv_adapter::{CsvAdapter, write_equity_curve};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as engine, BacktestConfig, BacktestResult, RiskConfig, RiskReport};
use crate::domain::config_validation::{
    config_tickers, parse_date, parse_periods, portfolio_weights, validate_config,
};
use crate::domain::error::PortsimError;
use crate::domain::price::PriceMap;
use crate::domain::projection::{BandLevel, DEFAULT_SIMULATION_SEED};
use crate::domain::rates::{DEFAULT_BORROW_SPREAD, RiskFreeRate};
use crate::domain::risk::Confidence;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::{DataPort, data_coverage, fetch_price_map};
use crate::ports::rate_port::RatePort;

#[derive(Parser, Debug)]
#[command(name = "portsim", about = "Portfolio backtest and risk engine")]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Simulate the configured allocation over its date range
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the equity curve to this CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Risk metrics and value projections over the lookback window
    Risk {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

impl Cli {
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();
        // a subscriber may already be installed when embedded
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest { config, output } => run_backtest(&config, output.as_deref()),
        Command::Risk { config } => run_risk(&config),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = PortsimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_validated(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    validate_config(&adapter).map_err(|e| report(&e))?;
    Ok(adapter)
}

fn report(err: &PortsimError) -> ExitCode {
    eprintln!("error: {err}");
    err.into()
}

fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, PortsimError> {
    let dir = config
        .get_string("data", "directory")
        .ok_or_else(|| PortsimError::ConfigMissing {
            section: "data".into(),
            key: "directory".into(),
        })?;
    Ok(CsvAdapter::new(PathBuf::from(dir.trim())))
}

/// Fixed rate from `[rates] risk_free_rate`, else the rate port average over
/// `[start, end]`, else the flagged default.
pub fn resolve_risk_free_rate(
    config: &dyn ConfigPort,
    rates: Option<&dyn RatePort>,
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
) -> RiskFreeRate {
    if config.get_string("rates", "risk_free_rate").is_some() {
        return RiskFreeRate::fixed(config.get_double("rates", "risk_free_rate", 0.0));
    }
    match config.get_string("rates", "rate_series") {
        Some(series) => RiskFreeRate::resolve(rates, series.trim(), start, end),
        None => RiskFreeRate::default_rate(),
    }
}

pub fn build_backtest_config(
    config: &dyn ConfigPort,
    rates: Option<&dyn RatePort>,
) -> Result<BacktestConfig, PortsimError> {
    let tickers = config_tickers(config)?;
    let start_date = parse_date(config, "portfolio", "start_date")?;
    let end_date = parse_date(config, "portfolio", "end_date")?;

    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_capital: config.get_double("portfolio", "initial_capital", 100.0),
        weights: portfolio_weights(config, &tickers)?,
        leverage: config.get_double("portfolio", "leverage", 1.0),
        periods: parse_periods(config, &tickers)?,
        risk_free_rate: resolve_risk_free_rate(config, rates, start_date, end_date),
        borrow_spread: config.get_double("rates", "borrow_spread", DEFAULT_BORROW_SPREAD),
    })
}

/// The lookback ends at `[portfolio] end_date`; the risk-free rate is
/// averaged over that same window.
pub fn build_risk_config(
    config: &dyn ConfigPort,
    rates: Option<&dyn RatePort>,
) -> Result<RiskConfig, PortsimError> {
    let tickers = config_tickers(config)?;
    let end_date = parse_date(config, "portfolio", "end_date")?;
    let lookback_days = config.get_int("risk", "lookback_days", 365).max(1) as u64;
    let start = end_date
        .checked_sub_days(chrono::Days::new(lookback_days))
        .unwrap_or(chrono::NaiveDate::MIN);

    Ok(RiskConfig {
        weights: portfolio_weights(config, &tickers)?,
        leverage: config.get_double("portfolio", "leverage", 1.0),
        lookback_days,
        portfolio_value: config.get_double("risk", "portfolio_value", 10_000.0),
        risk_free_rate: resolve_risk_free_rate(config, rates, start, end_date),
        simulation_paths: config.get_int("risk", "simulation_paths", 0).max(0) as usize,
        simulation_seed: config
            .get_int("risk", "simulation_seed", DEFAULT_SIMULATION_SEED as i64)
            .max(0) as u64,
        rolling_window: config
            .get_string("risk", "rolling_window")
            .map(|_| config.get_int("risk", "rolling_window", 0).max(0) as usize),
        as_of: Some(end_date),
    })
}

/// Every ticker named by the global allocation or any period override.
fn all_tickers(config: &BacktestConfig) -> Vec<String> {
    let mut tickers: Vec<String> = config.weights.tickers().map(str::to_string).collect();
    for period in &config.periods {
        for t in period.weights.tickers() {
            if !tickers.iter().any(|x| x == t) {
                tickers.push(t.to_string());
            }
        }
    }
    tickers
}

fn load_prices(
    data: &dyn DataPort,
    tickers: &[String],
    start: chrono::NaiveDate,
    end: chrono::NaiveDate,
) -> Result<PriceMap, PortsimError> {
    eprintln!("Loading prices for {} tickers, {} to {}", tickers.len(), start, end);
    let (prices, skipped) = fetch_price_map(data, tickers, start, end);
    for t in &skipped {
        eprintln!("warning: skipping {t} (no data)");
    }
    if prices.is_empty() {
        return Err(PortsimError::no_overlap("no price data for any configured ticker"));
    }
    Ok(prices)
}

fn run_backtest(config_path: &Path, output_path: Option<&Path>) -> ExitCode {
    // Stage 1: load and validate config
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data = match data_adapter(&adapter) {
        Ok(d) => d,
        Err(e) => return report(&e),
    };

    // Stage 2: build the backtest config
    let bt_config = match build_backtest_config(&adapter, Some(&data as &dyn RatePort)) {
        Ok(c) => c,
        Err(e) => return report(&e),
    };

    // Stage 3: load prices and run
    let tickers = all_tickers(&bt_config);
    let prices = match load_prices(&data, &tickers, bt_config.start_date, bt_config.end_date) {
        Ok(p) => p,
        Err(e) => return report(&e),
    };
    let period_count = match bt_config.schedule() {
        Ok(s) => s.len(),
        Err(e) => return report(&e),
    };
    eprintln!(
        "Running backtest: {} periods, {} to {}",
        period_count, bt_config.start_date, bt_config.end_date
    );
    let result = match engine::run_backtest(&prices, &bt_config) {
        Ok(r) => r,
        Err(e) => return report(&e),
    };

    print_backtest(&result);

    // Stage 4: optional equity curve export
    if let Some(path) = output_path {
        if let Err(e) = write_equity_curve(path, &result.curve) {
            return report(&e);
        }
        eprintln!("\nEquity curve written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn print_backtest(result: &BacktestResult) {
    let m = &result.metrics;
    println!("=== Backtest Results ===");
    if let (Some(start), Some(end)) = (m.start_date, m.end_date) {
        println!("Period:           {start} to {end}");
    }
    println!("Start Value:      {:.2}", result.curve.initial_value());
    println!("End Value:        {:.2}", result.curve.final_value());
    println!("Total Return:     {:.2}%", m.total_return * 100.0);
    println!("CAGR:             {:.2}%", m.cagr * 100.0);
    println!("Volatility:       {:.2}%", m.annualized_volatility * 100.0);
    println!(
        "Sharpe Ratio:     {:.2} (rf {:.2}%{})",
        m.sharpe_ratio,
        result.risk_free_rate.rate * 100.0,
        if result.risk_free_rate.used_default { ", default" } else { "" }
    );
    println!("Max Drawdown:     {:.2}%", m.max_drawdown * 100.0);

    if !m.drawdowns.is_empty() {
        println!("\n=== Top Drawdowns ===");
        for dd in &m.drawdowns {
            let recovery = dd
                .recovery_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "not recovered".to_string());
            println!(
                "  {:>7.2}%  peak {}  trough {}  recovery {}",
                dd.drawdown * 100.0,
                dd.peak_date,
                dd.trough_date,
                recovery
            );
        }
    }

    if result.curve.periods.len() > 1 {
        println!("\n=== Periods ===");
        for p in &result.curve.periods {
            let weights: Vec<String> = p
                .weights
                .iter()
                .map(|(t, w)| format!("{t} {:.0}%", w * 100.0))
                .collect();
            println!(
                "  {} to {}  {}x  {}{}  {:+.2}% over {} days",
                p.start_date,
                p.end_date,
                p.leverage,
                weights.join(", "),
                if p.is_override { " (override)" } else { "" },
                p.period_return * 100.0,
                p.trading_days
            );
        }
        if !result.curve.rebalance_dates.is_empty() {
            let dates: Vec<String> = result
                .curve
                .rebalance_dates
                .iter()
                .map(|d| d.to_string())
                .collect();
            println!("Rebalanced on:    {}", dates.join(", "));
        }
    }

    if !result.curve.skipped_tickers.is_empty() {
        eprintln!(
            "\nwarning: no data for {}",
            result.curve.skipped_tickers.join(", ")
        );
    }
}

fn run_risk(config_path: &Path) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data = match data_adapter(&adapter) {
        Ok(d) => d,
        Err(e) => return report(&e),
    };
    let risk_config = match build_risk_config(&adapter, Some(&data as &dyn RatePort)) {
        Ok(c) => c,
        Err(e) => return report(&e),
    };

    let tickers: Vec<String> = risk_config.weights.tickers().map(str::to_string).collect();
    let end = risk_config.as_of.unwrap_or(chrono::NaiveDate::MAX);
    let start = end
        .checked_sub_days(chrono::Days::new(risk_config.lookback_days))
        .unwrap_or(chrono::NaiveDate::MIN);
    let prices = match load_prices(&data, &tickers, start, end) {
        Ok(p) => p,
        Err(e) => return report(&e),
    };

    let report_data = match engine::run_risk(&prices, &risk_config) {
        Ok(r) => r,
        Err(e) => return report(&e),
    };
    print_risk(&report_data);
    ExitCode::SUCCESS
}

fn print_risk(report: &RiskReport) {
    let m = &report.metrics;
    println!("=== Risk Metrics ===");
    println!(
        "Window:           {} to {} ({} days)",
        m.window_start, m.window_end, m.observations
    );
    println!("Leverage:         {}x", m.leverage);
    println!("Daily Return:     {:.4}%", m.daily_return * 100.0);
    println!("Annual Return:    {:.2}%", m.annualized_return * 100.0);
    println!("Daily Volatility: {:.4}%", m.daily_volatility * 100.0);
    println!("Annual Vol:       {:.2}%", m.annualized_volatility * 100.0);
    println!(
        "Sharpe Ratio:     {:.2} (rf {:.2}%{})",
        m.sharpe_ratio,
        m.risk_free_rate.rate * 100.0,
        if m.risk_free_rate.used_default { ", default" } else { "" }
    );

    println!("\n=== Value at Risk ({:.2}) ===", m.portfolio_value);
    for confidence in [Confidence::P95, Confidence::P99] {
        let cells: Vec<String> = m
            .value_at_risk
            .iter()
            .filter(|v| v.confidence == confidence)
            .map(|v| format!("{}d {:.2} ({:.2}%)", v.horizon_days, v.amount, v.fraction * 100.0))
            .collect();
        println!("  {confidence}:  {}", cells.join("  "));
    }

    if m.correlation.len() > 1 {
        println!("\n=== Correlation ===");
        print!("{:>8}", "");
        for t in &m.correlation.tickers {
            print!("{t:>8}");
        }
        println!();
        for (t, row) in m.correlation.tickers.iter().zip(&m.correlation.values) {
            print!("{t:>8}");
            for v in row {
                print!("{v:>8.3}");
            }
            println!();
        }
    }

    if !report.asset_stats.is_empty() {
        println!("\n=== Assets ===");
        for a in &report.asset_stats {
            println!(
                "  {:<8} vol {:>6.2}%  exp. return {:>7.2}%  {} points",
                a.ticker,
                a.annualized_volatility * 100.0,
                a.expected_return * 100.0,
                a.data_points
            );
        }
    }

    if let Some(rolling) = &report.rolling {
        println!("\n=== Rolling ({} days, latest) ===", rolling.window);
        if let (Some(vol), Some(ret)) = (rolling.volatility.last(), rolling.expected_return.last()) {
            for (t, v) in &vol.values {
                let r = ret.values.get(t).copied().unwrap_or(0.0);
                println!("  {t:<8} vol {:>6.2}%  exp. return {:>7.2}%  ({})", v * 100.0, r * 100.0, vol.date);
            }
        } else {
            println!("  not enough aligned history");
        }
    }

    println!("\n=== Projections (closed-form) ===");
    for p in &report.projections {
        print_projection(p);
    }
    if let Some(first) = report.simulated.first() {
        println!("\n=== Projections ({}) ===", first.method);
        for p in &report.simulated {
            print_projection(p);
        }
    }

    if !m.skipped_tickers.is_empty() {
        eprintln!("\nwarning: no data for {}", m.skipped_tickers.join(", "));
    }
}

fn print_projection(p: &crate::domain::projection::Projection) {
    let bands: Vec<String> = BandLevel::ALL
        .iter()
        .filter_map(|&l| p.band(l))
        .map(|b| format!("{} {:.2}..{:.2}", b.level.label(), b.lower, b.upper))
        .collect();
    println!(
        "  {:>3}d  expected {:.2}  sd {:.2}  {}",
        p.horizon_days,
        p.expected_value,
        p.standard_deviation,
        bands.join("  ")
    );
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_validated(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // schedule problems only surface once overrides are resolved
    let bt_config = match build_backtest_config(&adapter, None) {
        Ok(c) => c,
        Err(e) => return report(&e),
    };
    let schedule = match bt_config.schedule() {
        Ok(s) => s,
        Err(e) => return report(&e),
    };

    eprintln!("\nSchedule:");
    for p in schedule.periods() {
        eprintln!(
            "  {} to {}  {}x{}",
            p.start_date,
            p.end_date,
            p.leverage,
            if p.is_override { "  (override)" } else { "" }
        );
    }
    print_coverage(&adapter, &bt_config);
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

/// Stored history per ticker. Gaps are reported, not fatal: backtests skip
/// tickers without data.
fn print_coverage(adapter: &FileConfigAdapter, bt_config: &BacktestConfig) {
    let data = match data_adapter(adapter) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("warning: {e}");
            return;
        }
    };
    let (coverage, missing) = data_coverage(&data, &all_tickers(bt_config));

    eprintln!("\nData coverage:");
    for c in &coverage {
        eprintln!(
            "  {:<8} {} to {}  {} bars{}",
            c.ticker,
            c.first_date,
            c.last_date,
            c.bars,
            if c.spans(bt_config.start_date, bt_config.end_date) {
                ""
            } else {
                "  (partial)"
            }
        );
    }
    for t in &missing {
        eprintln!("  {t:<8} no data");
    }
}

//! Backtest and risk pipelines.
//!
//! `run_backtest` turns prices plus a [`BacktestConfig`] into an equity curve
//! with performance metrics. `run_risk` turns a lookback window of prices
//! plus a [`RiskConfig`] into risk metrics and value projections.

use crate::domain::equity::{EquityCurve, EquityCurveBuilder, PeriodOutcome};
use crate::domain::error::PortsimError;
use crate::domain::metrics::PerformanceMetrics;
use crate::domain::period::{Period, PeriodSchedule};
use crate::domain::price::{PriceMap, slice_prices};
use crate::domain::projection::{CURVE_HORIZON, PROJECTION_HORIZONS, Projection, ValueProjector};
use crate::domain::rates::{BorrowingCost, DEFAULT_BORROW_SPREAD, RiskFreeRate};
use crate::domain::returns::aligned_returns;
use crate::domain::risk::{AssetStats, RiskAnalyzer, RiskMetrics};
use crate::domain::rolling::{RollingStats, rolling_stats};
use crate::domain::weights::WeightVector;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub weights: WeightVector,
    pub leverage: f64,
    /// Sub-period overrides; empty for a flat backtest.
    pub periods: Vec<Period>,
    pub risk_free_rate: RiskFreeRate,
    pub borrow_spread: f64,
}

impl BacktestConfig {
    pub fn flat(start_date: NaiveDate, end_date: NaiveDate, weights: WeightVector) -> Self {
        Self {
            start_date,
            end_date,
            initial_capital: 100.0,
            weights,
            leverage: 1.0,
            periods: Vec::new(),
            risk_free_rate: RiskFreeRate::default(),
            borrow_spread: DEFAULT_BORROW_SPREAD,
        }
    }

    pub fn schedule(&self) -> Result<PeriodSchedule, PortsimError> {
        if self.periods.is_empty() {
            PeriodSchedule::flat(
                self.start_date,
                self.end_date,
                self.weights.clone(),
                self.leverage,
            )
        } else {
            PeriodSchedule::with_overrides(
                self.start_date,
                self.end_date,
                &self.weights,
                self.leverage,
                &self.periods,
            )
        }
    }

    pub fn borrowing(&self) -> BorrowingCost {
        BorrowingCost::new(self.risk_free_rate, self.borrow_spread)
    }
}

/// Metrics for one period's slice of the curve, rebased to 100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodAnalysis {
    pub index: usize,
    pub metrics: PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub curve: EquityCurve,
    pub metrics: PerformanceMetrics,
    pub period_analysis: Vec<PeriodAnalysis>,
    pub risk_free_rate: RiskFreeRate,
}

pub fn run_backtest(prices: &PriceMap, config: &BacktestConfig) -> Result<BacktestResult, PortsimError> {
    let schedule = config.schedule()?;
    debug!(
        periods = schedule.len(),
        start = %config.start_date,
        end = %config.end_date,
        "running backtest"
    );

    let window = slice_prices(prices, config.start_date, config.end_date);
    let builder = EquityCurveBuilder::new(&window, config.borrowing(), config.initial_capital);
    let curve = builder.build(&schedule)?;

    let rf = config.risk_free_rate.rate;
    let metrics = PerformanceMetrics::compute(&curve.points, rf);
    let period_analysis = curve
        .periods
        .iter()
        .filter_map(|outcome| {
            let (start, end) = period_window(&curve, outcome)?;
            let metrics = PerformanceMetrics::for_window(&curve.points, start, end, rf)?;
            Some(PeriodAnalysis {
                index: outcome.index,
                metrics,
            })
        })
        .collect();

    Ok(BacktestResult {
        curve,
        metrics,
        period_analysis,
        risk_free_rate: config.risk_free_rate,
    })
}

/// From the point the period starts from to its last trading date.
fn period_window(curve: &EquityCurve, outcome: &PeriodOutcome) -> Option<(NaiveDate, NaiveDate)> {
    let first = outcome.first_trading_date?;
    let last = outcome.last_trading_date?;
    let idx = curve.points.iter().position(|p| p.date == first)?;
    let start = curve.points[idx.saturating_sub(1)].date;
    Some((start, last))
}

#[derive(Debug, Clone)]
pub struct RiskConfig {
    pub weights: WeightVector,
    pub leverage: f64,
    /// Calendar days before the latest price date.
    pub lookback_days: u64,
    pub portfolio_value: f64,
    pub risk_free_rate: RiskFreeRate,
    /// Paths for the simulated projection; 0 skips it.
    pub simulation_paths: usize,
    pub simulation_seed: u64,
    /// Rolling statistics window in trading days; `None` skips them.
    pub rolling_window: Option<usize>,
    /// Window end; the latest price date of the weighted tickers if unset.
    pub as_of: Option<NaiveDate>,
}

impl RiskConfig {
    pub fn new(weights: WeightVector) -> Self {
        Self {
            weights,
            leverage: 1.0,
            lookback_days: 365,
            portfolio_value: 10_000.0,
            risk_free_rate: RiskFreeRate::default(),
            simulation_paths: 0,
            simulation_seed: crate::domain::projection::DEFAULT_SIMULATION_SEED,
            rolling_window: None,
            as_of: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub metrics: RiskMetrics,
    pub projections: Vec<Projection>,
    pub projection_curve: Vec<Projection>,
    pub simulated: Vec<Projection>,
    pub asset_stats: Vec<AssetStats>,
    pub rolling: Option<RollingStats>,
}

/// `(end - lookback_days, end)` where `end` defaults to the latest bar date
/// among the weighted tickers.
pub fn lookback_window(
    prices: &PriceMap,
    weights: &WeightVector,
    lookback_days: u64,
    as_of: Option<NaiveDate>,
) -> Option<(NaiveDate, NaiveDate)> {
    let end = match as_of {
        Some(d) => d,
        None => weights
            .tickers()
            .filter_map(|t| prices.get(t)?.last().map(|b| b.date))
            .max()?,
    };
    let start = end.checked_sub_days(Days::new(lookback_days)).unwrap_or(NaiveDate::MIN);
    Some((start, end))
}

pub fn run_risk(prices: &PriceMap, config: &RiskConfig) -> Result<RiskReport, PortsimError> {
    let (start, end) = lookback_window(prices, &config.weights, config.lookback_days, config.as_of)
        .ok_or_else(|| PortsimError::no_overlap("no price data for any weighted ticker"))?;
    debug!(%start, %end, "risk lookback window");

    let window_prices = slice_prices(prices, start, end);
    let analyzer = RiskAnalyzer::new(&window_prices);
    let metrics = analyzer.analyze(
        &config.weights,
        config.leverage,
        config.portfolio_value,
        config.risk_free_rate,
    )?;

    let projector = ValueProjector::from_risk(&metrics, config.portfolio_value);
    let projections = projector.project_horizons(&PROJECTION_HORIZONS);
    let projection_curve = projector.curve(CURVE_HORIZON);
    let simulated = if config.simulation_paths > 0 {
        projector.simulate(
            &PROJECTION_HORIZONS,
            config.simulation_paths,
            config.simulation_seed,
        )?
    } else {
        Vec::new()
    };

    let rolling = match config.rolling_window {
        Some(window) => {
            let tickers: Vec<&str> =
                metrics.correlation.tickers.iter().map(String::as_str).collect();
            let aligned = aligned_returns(&window_prices, &tickers);
            Some(rolling_stats(&aligned, &metrics.correlation.tickers, window)?)
        }
        None => None,
    };

    Ok(RiskReport {
        metrics,
        projections,
        projection_curve,
        simulated,
        asset_stats: analyzer.asset_stats(),
        rolling,
    })
}

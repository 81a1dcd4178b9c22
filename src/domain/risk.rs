//! Forward-looking risk: annualized return and volatility, Sharpe ratio,
//! parametric VaR and pairwise correlation.
//!
//! Base statistics come from the unlevered portfolio return series. The
//! levered figures are the base figures times the leverage, so the Sharpe
//! ratio (computed on the base) does not depend on leverage.

use crate::domain::composition::PortfolioReturnCompositor;
use crate::domain::error::PortsimError;
use crate::domain::price::PriceMap;
use crate::domain::rates::{BorrowingCost, RiskFreeRate};
use crate::domain::returns::{ReturnSeries, aligned_returns, compute_all};
use crate::domain::stats::{TRADING_DAYS_PER_YEAR, mean, pearson, sample_std};
use crate::domain::weights::WeightVector;
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Aligned portfolio returns needed before any statistic is reported.
pub const MIN_RISK_OBSERVATIONS: usize = 2;

/// Horizons (trading days) reported in [`RiskMetrics::value_at_risk`].
pub const VAR_HORIZONS: [u32; 2] = [1, 30];

/// Confidence levels reported in [`RiskMetrics::value_at_risk`].
pub const VAR_CONFIDENCES: [Confidence; 2] = [Confidence::P95, Confidence::P99];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Confidence {
    P90,
    P95,
    P99,
}

impl Confidence {
    /// One-sided standard normal quantile.
    pub fn z_score(self) -> f64 {
        match self {
            Confidence::P90 => 1.282,
            Confidence::P95 => 1.645,
            Confidence::P99 => 2.326,
        }
    }

    pub fn level(self) -> f64 {
        match self {
            Confidence::P90 => 0.90,
            Confidence::P95 => 0.95,
            Confidence::P99 => 0.99,
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}%", self.level() * 100.0)
    }
}

/// value * daily_volatility * sqrt(horizon_days) * z(confidence).
///
/// Assumes i.i.d. normal daily returns.
pub fn parametric_var(value: f64, daily_volatility: f64, horizon_days: u32, confidence: Confidence) -> f64 {
    value.abs() * daily_volatility.abs() * (horizon_days as f64).sqrt() * confidence.z_score()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence: Confidence,
    pub horizon_days: u32,
    /// Loss in currency units, never negative.
    pub amount: f64,
    /// `amount` as a fraction of the portfolio value.
    pub fraction: f64,
}

/// Symmetric Pearson correlation matrix over a fixed ticker order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub tickers: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    /// Each pair is aligned on its own shared price dates, so assets with
    /// different coverage still correlate over everything they share. Pairs
    /// are evaluated in parallel.
    pub fn compute(prices: &PriceMap, tickers: &[String]) -> Self {
        let n = tickers.len();
        let pairs: Vec<(usize, usize)> = (0..n)
            .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
            .collect();

        let computed: Vec<((usize, usize), f64)> = pairs
            .into_par_iter()
            .map(|(i, j)| {
                let pair = aligned_returns(prices, &[tickers[i].as_str(), tickers[j].as_str()]);
                let rho = match (pair.get(&tickers[i]), pair.get(&tickers[j])) {
                    (Some(a), Some(b)) => pairwise_correlation(a, b),
                    _ => 0.0,
                };
                ((i, j), rho)
            })
            .collect();

        let mut values = vec![vec![0.0; n]; n];
        for (i, row) in values.iter_mut().enumerate() {
            row[i] = 1.0;
        }
        for ((i, j), rho) in computed {
            values[i][j] = rho;
            values[j][i] = rho;
        }

        CorrelationMatrix {
            tickers: tickers.to_vec(),
            values,
        }
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.tickers.iter().position(|t| t == a)?;
        let j = self.tickers.iter().position(|t| t == b)?;
        Some(self.values[i][j])
    }

    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Pearson correlation over the dates both series have.
pub fn pairwise_correlation(a: &ReturnSeries, b: &ReturnSeries) -> f64 {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .points
        .iter()
        .filter_map(|p| Some((p.simple_return, b.get(p.date)?)))
        .unzip();
    pearson(&xs, &ys)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetStats {
    pub ticker: String,
    pub annualized_volatility: f64,
    /// (1 + mean daily return)^252 - 1.
    pub expected_return: f64,
    pub data_points: usize,
}

impl AssetStats {
    pub fn from_series(ticker: &str, series: &ReturnSeries) -> Self {
        let values = series.values();
        let expected_return = if values.is_empty() {
            0.0
        } else {
            (1.0 + mean(&values)).powf(TRADING_DAYS_PER_YEAR) - 1.0
        };
        AssetStats {
            ticker: ticker.to_string(),
            annualized_volatility: sample_std(&values) * TRADING_DAYS_PER_YEAR.sqrt(),
            expected_return,
            data_points: values.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub leverage: f64,
    pub portfolio_value: f64,
    /// Unlevered mean and sample std of the daily portfolio return.
    pub base_daily_return: f64,
    pub base_daily_volatility: f64,
    pub daily_return: f64,
    pub annualized_return: f64,
    pub daily_volatility: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    pub risk_free_rate: RiskFreeRate,
    pub observations: usize,
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub value_at_risk: Vec<VarEstimate>,
    pub correlation: CorrelationMatrix,
    pub skipped_tickers: Vec<String>,
}

impl RiskMetrics {
    pub fn var(&self, confidence: Confidence, horizon_days: u32) -> Option<&VarEstimate> {
        self.value_at_risk
            .iter()
            .find(|v| v.confidence == confidence && v.horizon_days == horizon_days)
    }

    /// VaR for any confidence and horizon from the levered daily volatility.
    pub fn var_for(&self, confidence: Confidence, horizon_days: u32) -> f64 {
        parametric_var(self.portfolio_value, self.daily_volatility, horizon_days, confidence)
    }
}

/// Risk statistics over one lookback window of prices.
pub struct RiskAnalyzer<'a> {
    prices: &'a PriceMap,
    /// Each ticker on its own calendar, for the per-asset summary.
    series: BTreeMap<String, ReturnSeries>,
}

impl<'a> RiskAnalyzer<'a> {
    pub fn new(prices: &'a PriceMap) -> Self {
        Self {
            prices,
            series: compute_all(prices),
        }
    }

    pub fn analyze(
        &self,
        weights: &WeightVector,
        leverage: f64,
        portfolio_value: f64,
        risk_free_rate: RiskFreeRate,
    ) -> Result<RiskMetrics, PortsimError> {
        // Borrowing cost is a backtest concern; here leverage only scales.
        let tickers: Vec<&str> = weights.tickers().collect();
        let aligned = aligned_returns(self.prices, &tickers);
        let compositor = PortfolioReturnCompositor::new(&aligned, BorrowingCost::none());
        let composition = compositor.compose(weights, 1.0, NaiveDate::MIN, NaiveDate::MAX)?;

        let (Some(first), Some(last)) = (composition.returns.first(), composition.returns.last())
        else {
            return Err(PortsimError::no_overlap("risk lookback window"));
        };
        let (window_start, window_end) = (first.date, last.date);
        if composition.returns.len() < MIN_RISK_OBSERVATIONS {
            return Err(PortsimError::InsufficientData {
                ticker: "portfolio".to_string(),
                bars: composition.returns.len(),
                minimum: MIN_RISK_OBSERVATIONS,
            });
        }

        let values = composition.values();
        let base_daily_return = mean(&values);
        let base_daily_volatility = sample_std(&values);

        let base_annual_return = base_daily_return * TRADING_DAYS_PER_YEAR;
        let base_annual_volatility = base_daily_volatility * TRADING_DAYS_PER_YEAR.sqrt();
        let sharpe_ratio = if base_annual_volatility > 0.0 {
            (base_annual_return - risk_free_rate.rate) / base_annual_volatility
        } else {
            0.0
        };

        let daily_return = base_daily_return * leverage;
        let daily_volatility = base_daily_volatility * leverage.abs();

        let value_at_risk = VAR_CONFIDENCES
            .iter()
            .flat_map(|&confidence| {
                VAR_HORIZONS.iter().map(move |&horizon_days| {
                    let amount =
                        parametric_var(portfolio_value, daily_volatility, horizon_days, confidence);
                    VarEstimate {
                        confidence,
                        horizon_days,
                        amount,
                        fraction: if portfolio_value != 0.0 {
                            amount / portfolio_value.abs()
                        } else {
                            0.0
                        },
                    }
                })
            })
            .collect();

        let (present, _) = compositor.partition_tickers(weights);
        let present: Vec<String> = present.into_iter().map(str::to_string).collect();
        let correlation = CorrelationMatrix::compute(self.prices, &present);

        Ok(RiskMetrics {
            leverage,
            portfolio_value,
            base_daily_return,
            base_daily_volatility,
            daily_return,
            annualized_return: daily_return * TRADING_DAYS_PER_YEAR,
            daily_volatility,
            annualized_volatility: daily_volatility * TRADING_DAYS_PER_YEAR.sqrt(),
            sharpe_ratio,
            risk_free_rate,
            observations: values.len(),
            window_start,
            window_end,
            value_at_risk,
            correlation,
            skipped_tickers: composition.skipped,
        })
    }

    /// Per-asset summary for every ticker with at least one return.
    pub fn asset_stats(&self) -> Vec<AssetStats> {
        self.series
            .iter()
            .filter(|(_, s)| !s.is_empty())
            .map(|(t, s)| AssetStats::from_series(t, s))
            .collect()
    }
}

//! Performance metrics and drawdown episodes for an equity curve.

use super::equity::EquityPoint;
use super::stats::{TRADING_DAYS_PER_YEAR, sample_std};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

const DAYS_PER_YEAR: f64 = 365.25;

/// A fall below the running peak opens an episode only past this fraction.
pub const DRAWDOWN_TRIGGER: f64 = 0.01;

/// Episodes kept in [`PerformanceMetrics::drawdowns`].
pub const TOP_DRAWDOWNS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEpisode {
    pub peak_date: NaiveDate,
    pub peak_value: f64,
    pub trough_date: NaiveDate,
    pub trough_value: f64,
    /// First date the curve is back at or above the peak; `None` while open.
    pub recovery_date: Option<NaiveDate>,
    /// trough / peak - 1, always negative.
    pub drawdown: f64,
}

impl DrawdownEpisode {
    pub fn is_recovered(&self) -> bool {
        self.recovery_date.is_some()
    }

    /// Calendar days from peak to recovery, or to `last_date` when open.
    pub fn length_days(&self, last_date: NaiveDate) -> i64 {
        (self.recovery_date.unwrap_or(last_date) - self.peak_date).num_days()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub cagr: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    /// Deepest fall below the running peak, as a negative fraction.
    pub max_drawdown: f64,
    pub drawdowns: Vec<DrawdownEpisode>,
    pub risk_free_rate: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl PerformanceMetrics {
    pub fn compute(curve: &[EquityPoint], risk_free_rate: f64) -> Self {
        let (Some(first), Some(last)) = (curve.first(), curve.last()) else {
            return Self::empty(risk_free_rate);
        };

        let growth = if first.value != 0.0 {
            last.value / first.value
        } else {
            1.0
        };
        let total_return = growth - 1.0;

        let days_elapsed = (last.date - first.date).num_days() as f64;
        // A curve that reaches zero or below has lost everything.
        let cagr = if days_elapsed <= 0.0 {
            0.0
        } else if growth <= 0.0 {
            -1.0
        } else {
            growth.powf(DAYS_PER_YEAR / days_elapsed) - 1.0
        };

        let returns = daily_returns(curve);
        let annualized_volatility = sample_std(&returns) * TRADING_DAYS_PER_YEAR.sqrt();

        let sharpe_ratio = if annualized_volatility > 0.0 {
            (cagr - risk_free_rate) / annualized_volatility
        } else {
            0.0
        };

        let (max_drawdown, mut drawdowns) = compute_drawdowns(curve);
        drawdowns.sort_by(|a, b| a.drawdown.total_cmp(&b.drawdown));
        drawdowns.truncate(TOP_DRAWDOWNS);

        PerformanceMetrics {
            total_return,
            cagr,
            annualized_volatility,
            sharpe_ratio,
            max_drawdown,
            drawdowns,
            risk_free_rate,
            start_date: Some(first.date),
            end_date: Some(last.date),
        }
    }

    /// Metrics for the part of `curve` within `[start, end]`, rebased to 100.
    pub fn for_window(
        curve: &[EquityPoint],
        start: NaiveDate,
        end: NaiveDate,
        risk_free_rate: f64,
    ) -> Option<Self> {
        let window: Vec<EquityPoint> = curve
            .iter()
            .filter(|p| p.date >= start && p.date <= end)
            .copied()
            .collect();
        let base = window.first()?.value;
        if base == 0.0 {
            return None;
        }
        let rebased: Vec<EquityPoint> = window
            .iter()
            .map(|p| EquityPoint {
                date: p.date,
                value: p.value / base * 100.0,
            })
            .collect();
        Some(Self::compute(&rebased, risk_free_rate))
    }

    fn empty(risk_free_rate: f64) -> Self {
        PerformanceMetrics {
            total_return: 0.0,
            cagr: 0.0,
            annualized_volatility: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            drawdowns: Vec::new(),
            risk_free_rate,
            start_date: None,
            end_date: None,
        }
    }
}

fn daily_returns(curve: &[EquityPoint]) -> Vec<f64> {
    curve
        .windows(2)
        .filter(|w| w[0].value != 0.0)
        .map(|w| w[1].value / w[0].value - 1.0)
        .collect()
}

/// Max drawdown plus every episode in chronological order.
///
/// An episode opens once the value is more than [`DRAWDOWN_TRIGGER`] below
/// the running peak and closes on the first point back at or above that
/// peak. The recorded depth is the full trough, not just the excess over
/// the trigger.
fn compute_drawdowns(curve: &[EquityPoint]) -> (f64, Vec<DrawdownEpisode>) {
    let Some(first) = curve.first() else {
        return (0.0, Vec::new());
    };

    let mut peak = first.value;
    let mut peak_date = first.date;
    let mut max_dd = 0.0_f64;
    let mut open: Option<DrawdownEpisode> = None;
    let mut episodes = Vec::new();

    for point in curve {
        if point.value >= peak {
            if let Some(mut episode) = open.take() {
                episode.recovery_date = Some(point.date);
                episodes.push(episode);
                peak_date = point.date;
            }
            if point.value > peak {
                peak = point.value;
                peak_date = point.date;
            }
            continue;
        }

        if peak <= 0.0 {
            continue;
        }
        let dd = point.value / peak - 1.0;
        max_dd = max_dd.min(dd);

        match open.as_mut() {
            Some(episode) => {
                if point.value < episode.trough_value {
                    episode.trough_value = point.value;
                    episode.trough_date = point.date;
                    episode.drawdown = dd;
                }
            }
            None if dd < -DRAWDOWN_TRIGGER => {
                open = Some(DrawdownEpisode {
                    peak_date,
                    peak_value: peak,
                    trough_date: point.date,
                    trough_value: point.value,
                    recovery_date: None,
                    drawdown: dd,
                });
            }
            None => {}
        }
    }

    episodes.extend(open);
    (max_dd, episodes)
}

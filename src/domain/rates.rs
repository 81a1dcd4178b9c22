//! Risk-free rate resolution and leverage borrowing cost.

use crate::domain::stats::TRADING_DAYS_PER_YEAR;
use crate::ports::rate_port::RatePort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Annual risk-free rate used when no rate is configured or available.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.05;

/// Annual spread charged over the base rate on borrowed funds.
pub const DEFAULT_BORROW_SPREAD: f64 = 0.01;

/// An annual rate together with whether it is the hardcoded fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskFreeRate {
    pub rate: f64,
    pub used_default: bool,
}

impl RiskFreeRate {
    pub fn fixed(rate: f64) -> Self {
        Self {
            rate,
            used_default: false,
        }
    }

    pub fn default_rate() -> Self {
        Self {
            rate: DEFAULT_RISK_FREE_RATE,
            used_default: true,
        }
    }

    /// Average of `series` over the window from `port`, falling back to
    /// [`DEFAULT_RISK_FREE_RATE`] (flagged) when the port is missing, empty
    /// or failing.
    pub fn resolve(
        port: Option<&dyn RatePort>,
        series: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Self {
        let Some(port) = port else {
            return Self::default_rate();
        };
        match port.average_rate(series, start, end) {
            Ok(Some(rate)) if rate.is_finite() => Self::fixed(rate),
            Ok(_) => {
                warn!(series, %start, %end, "no rate observations, using default rate");
                Self::default_rate()
            }
            Err(e) => {
                warn!(series, error = %e, "rate lookup failed, using default rate");
                Self::default_rate()
            }
        }
    }
}

impl Default for RiskFreeRate {
    fn default() -> Self {
        Self::default_rate()
    }
}

/// Daily cost of financing the levered part of a position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BorrowingCost {
    pub base_rate: RiskFreeRate,
    pub spread: f64,
}

impl BorrowingCost {
    pub fn new(base_rate: RiskFreeRate, spread: f64) -> Self {
        Self { base_rate, spread }
    }

    pub fn none() -> Self {
        Self {
            base_rate: RiskFreeRate::fixed(0.0),
            spread: 0.0,
        }
    }

    pub fn annual_rate(&self) -> f64 {
        self.base_rate.rate + self.spread
    }

    /// (annual rate / 252) * (leverage - 1) when leverage > 1, else 0.
    pub fn daily_cost(&self, leverage: f64) -> f64 {
        if leverage > 1.0 {
            (leverage - 1.0) * self.annual_rate() / TRADING_DAYS_PER_YEAR
        } else {
            0.0
        }
    }
}

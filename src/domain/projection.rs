//! Forward value projections under a Gaussian random walk.
//!
//! Two methods: the closed-form approximation (compound expected growth with
//! a sqrt-time band) and an explicit simulation that samples daily shocks
//! per path and reads bands off the empirical distribution.

use crate::domain::error::PortsimError;
use crate::domain::risk::RiskMetrics;
use crate::domain::stats::{mean, percentile, sample_std};
use rand::{SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Discrete horizons in trading days, roughly 1, 3, 6 and 12 months.
pub const PROJECTION_HORIZONS: [u32; 4] = [21, 63, 126, 252];

/// Last day of the continuous projection curve.
pub const CURVE_HORIZON: u32 = 252;

pub const DEFAULT_SIMULATION_SEED: u64 = 42;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BandLevel {
    P68,
    P95,
    P99,
}

impl BandLevel {
    pub const ALL: [BandLevel; 3] = [BandLevel::P68, BandLevel::P95, BandLevel::P99];

    /// Standard deviations either side of the expected value.
    pub fn multiplier(self) -> f64 {
        match self {
            BandLevel::P68 => 1.0,
            BandLevel::P95 => 1.96,
            BandLevel::P99 => 2.576,
        }
    }

    /// Lower and upper percentiles for the empirical band.
    pub fn percentiles(self) -> (f64, f64) {
        match self {
            BandLevel::P68 => (16.0, 84.0),
            BandLevel::P95 => (2.5, 97.5),
            BandLevel::P99 => (0.5, 99.5),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BandLevel::P68 => "68%",
            BandLevel::P95 => "95%",
            BandLevel::P99 => "99%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBand {
    pub level: BandLevel,
    pub lower: f64,
    pub upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionMethod {
    ClosedForm,
    Simulated { paths: usize, seed: u64 },
}

impl std::fmt::Display for ProjectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectionMethod::ClosedForm => write!(f, "closed-form"),
            ProjectionMethod::Simulated { paths, seed } => {
                write!(f, "simulated ({paths} paths, seed {seed})")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub horizon_days: u32,
    pub method: ProjectionMethod,
    pub expected_value: f64,
    /// Only set by the simulated method.
    pub median_value: Option<f64>,
    pub standard_deviation: f64,
    pub bands: Vec<ConfidenceBand>,
}

impl Projection {
    pub fn band(&self, level: BandLevel) -> Option<&ConfidenceBand> {
        self.bands.iter().find(|b| b.level == level)
    }
}

/// Projects a starting capital forward from unlevered daily statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueProjector {
    pub capital: f64,
    pub base_daily_return: f64,
    pub base_daily_volatility: f64,
    pub leverage: f64,
}

impl ValueProjector {
    pub fn new(capital: f64, base_daily_return: f64, base_daily_volatility: f64, leverage: f64) -> Self {
        Self {
            capital,
            base_daily_return,
            base_daily_volatility,
            leverage,
        }
    }

    pub fn from_risk(metrics: &RiskMetrics, capital: f64) -> Self {
        Self::new(
            capital,
            metrics.base_daily_return,
            metrics.base_daily_volatility,
            metrics.leverage,
        )
    }

    pub fn daily_return(&self) -> f64 {
        self.base_daily_return * self.leverage
    }

    pub fn daily_volatility(&self) -> f64 {
        self.base_daily_volatility * self.leverage.abs()
    }

    /// E = C(1 + mu)^d, sd = E * sigma * sqrt(d), bands at E +/- k * sd.
    pub fn project(&self, horizon_days: u32) -> Projection {
        let d = horizon_days as f64;
        let expected_value = self.capital * (1.0 + self.daily_return()).powf(d);
        let standard_deviation = expected_value.abs() * self.daily_volatility() * d.sqrt();
        let bands = BandLevel::ALL
            .iter()
            .map(|&level| ConfidenceBand {
                level,
                lower: expected_value - level.multiplier() * standard_deviation,
                upper: expected_value + level.multiplier() * standard_deviation,
            })
            .collect();
        Projection {
            horizon_days,
            method: ProjectionMethod::ClosedForm,
            expected_value,
            median_value: None,
            standard_deviation,
            bands,
        }
    }

    pub fn project_horizons(&self, horizons: &[u32]) -> Vec<Projection> {
        horizons.iter().map(|&h| self.project(h)).collect()
    }

    /// Closed-form projection for every day `0..=max_days`.
    pub fn curve(&self, max_days: u32) -> Vec<Projection> {
        (0..=max_days).map(|d| self.project(d)).collect()
    }

    /// Samples `paths` independent daily-return paths and summarizes the
    /// value distribution at each horizon.
    ///
    /// Each path draws from its own generator seeded with `seed + path`, so
    /// results do not depend on thread scheduling. A path that hits zero
    /// stays at zero.
    pub fn simulate(
        &self,
        horizons: &[u32],
        paths: usize,
        seed: u64,
    ) -> Result<Vec<Projection>, PortsimError> {
        let method = ProjectionMethod::Simulated { paths, seed };
        let Some(&max_horizon) = horizons.iter().max() else {
            return Ok(Vec::new());
        };
        if paths == 0 {
            return Err(PortsimError::Data {
                reason: "simulation needs at least one path".to_string(),
            });
        }
        let normal = Normal::new(self.daily_return(), self.daily_volatility()).map_err(|e| {
            PortsimError::Data {
                reason: format!("invalid return distribution: {e}"),
            }
        })?;
        debug!(paths, seed, max_horizon, "simulating value paths");

        // samples[path][horizon index]
        let samples: Vec<Vec<f64>> = (0..paths)
            .into_par_iter()
            .map(|path| {
                let mut rng = StdRng::seed_from_u64(seed.wrapping_add(path as u64));
                let mut value = self.capital;
                let mut at_horizon = vec![0.0; horizons.len()];
                for day in 0..=max_horizon {
                    if day > 0 && value > 0.0 {
                        value = (value * (1.0 + normal.sample(&mut rng))).max(0.0);
                    }
                    for (slot, &h) in at_horizon.iter_mut().zip(horizons) {
                        if h == day {
                            *slot = value;
                        }
                    }
                }
                at_horizon
            })
            .collect();

        let projections = horizons
            .iter()
            .enumerate()
            .map(|(k, &horizon_days)| {
                let mut values: Vec<f64> = samples.iter().map(|s| s[k]).collect();
                values.sort_by(f64::total_cmp);
                let bands = BandLevel::ALL
                    .iter()
                    .map(|&level| {
                        let (lo, hi) = level.percentiles();
                        ConfidenceBand {
                            level,
                            lower: percentile(&values, lo),
                            upper: percentile(&values, hi),
                        }
                    })
                    .collect();
                Projection {
                    horizon_days,
                    method,
                    expected_value: mean(&values),
                    median_value: Some(percentile(&values, 50.0)),
                    standard_deviation: sample_std(&values),
                    bands,
                }
            })
            .collect();
        Ok(projections)
    }
}

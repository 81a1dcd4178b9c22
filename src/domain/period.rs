//! Allocation periods and the validated schedule a backtest runs over.

use crate::domain::error::PortsimError;
use crate::domain::weights::WeightVector;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A caller-supplied allocation override for part of a backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weights: WeightVector,
    /// Falls back to the global leverage when unset.
    pub leverage: Option<f64>,
    pub enabled: bool,
}

impl Period {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, weights: WeightVector) -> Self {
        Self {
            start_date,
            end_date,
            weights,
            leverage: None,
            enabled: true,
        }
    }

    pub fn with_leverage(mut self, leverage: f64) -> Self {
        self.leverage = Some(leverage);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// A period with every setting resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledPeriod {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weights: WeightVector,
    pub leverage: f64,
    /// True when the period came from an override rather than the globals.
    pub is_override: bool,
}

impl ScheduledPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Ordered, contiguous, non-overlapping periods.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodSchedule {
    periods: Vec<ScheduledPeriod>,
}

impl PeriodSchedule {
    /// One period with constant weights over `[start, end]`.
    pub fn flat(
        start: NaiveDate,
        end: NaiveDate,
        weights: WeightVector,
        leverage: f64,
    ) -> Result<Self, PortsimError> {
        Self::new(vec![ScheduledPeriod {
            start_date: start,
            end_date: end,
            weights,
            leverage,
            is_override: false,
        }])
    }

    /// Validate an explicit schedule. Each period must start the calendar
    /// day after the previous one ends.
    pub fn new(periods: Vec<ScheduledPeriod>) -> Result<Self, PortsimError> {
        if periods.is_empty() {
            return Err(PortsimError::schedule(
                0,
                NaiveDate::MIN,
                "schedule has no periods",
            ));
        }

        for (i, p) in periods.iter().enumerate() {
            if p.start_date > p.end_date {
                return Err(PortsimError::schedule(
                    i,
                    p.start_date,
                    format!("start {} is after end {}", p.start_date, p.end_date),
                ));
            }
            if !p.leverage.is_finite() || p.leverage < 0.0 {
                return Err(PortsimError::schedule(
                    i,
                    p.start_date,
                    format!("leverage {} must be a non-negative number", p.leverage),
                ));
            }
            if p.weights.is_empty() {
                return Err(PortsimError::schedule(i, p.start_date, "period has no weights"));
            }
        }

        for (i, pair) in periods.windows(2).enumerate() {
            let (prev, next) = (&pair[0], &pair[1]);
            let expected = next_day(prev.end_date);
            if next.start_date <= prev.end_date {
                return Err(PortsimError::schedule(
                    i + 1,
                    next.start_date,
                    format!("overlaps previous period ending {}", prev.end_date),
                ));
            }
            if Some(next.start_date) != expected {
                return Err(PortsimError::schedule(
                    i + 1,
                    next.start_date,
                    format!("gap after previous period ending {}", prev.end_date),
                ));
            }
        }

        Ok(Self { periods })
    }

    /// Global allocation over `[start, end]` with overrides applied.
    ///
    /// Disabled overrides are dropped, overrides are sorted by start date,
    /// and every range not covered by an override uses the global weights
    /// and leverage. Overlapping or out-of-range overrides are rejected.
    pub fn with_overrides(
        start: NaiveDate,
        end: NaiveDate,
        global_weights: &WeightVector,
        global_leverage: f64,
        overrides: &[Period],
    ) -> Result<Self, PortsimError> {
        if start > end {
            return Err(PortsimError::schedule(
                0,
                start,
                format!("backtest start {start} is after end {end}"),
            ));
        }

        let mut active: Vec<&Period> = overrides.iter().filter(|p| p.enabled).collect();
        active.sort_by_key(|p| p.start_date);

        let global = |from: NaiveDate, to: NaiveDate| ScheduledPeriod {
            start_date: from,
            end_date: to,
            weights: global_weights.clone(),
            leverage: global_leverage,
            is_override: false,
        };

        let mut periods = Vec::with_capacity(active.len() * 2 + 1);
        let mut cursor = Some(start);

        for (i, sp) in active.iter().enumerate() {
            if sp.start_date > sp.end_date {
                return Err(PortsimError::schedule(
                    i,
                    sp.start_date,
                    format!("override start {} is after end {}", sp.start_date, sp.end_date),
                ));
            }
            if sp.start_date < start || sp.end_date > end {
                return Err(PortsimError::schedule(
                    i,
                    sp.start_date,
                    format!("override {}..{} lies outside backtest range {start}..{end}", sp.start_date, sp.end_date),
                ));
            }
            let Some(current) = cursor else {
                return Err(PortsimError::schedule(
                    i,
                    sp.start_date,
                    "override begins after the schedule is already complete",
                ));
            };
            if sp.start_date < current {
                return Err(PortsimError::schedule(
                    i,
                    sp.start_date,
                    "override overlaps the previous override",
                ));
            }
            if sp.start_date > current {
                if let Some(gap_end) = sp.start_date.checked_sub_days(Days::new(1)) {
                    periods.push(global(current, gap_end));
                }
            }
            periods.push(ScheduledPeriod {
                start_date: sp.start_date,
                end_date: sp.end_date,
                weights: sp.weights.clone(),
                leverage: sp.leverage.unwrap_or(global_leverage),
                is_override: true,
            });
            cursor = next_day(sp.end_date).filter(|d| *d <= end);
        }

        if let Some(current) = cursor {
            periods.push(global(current, end));
        }

        Self::new(periods)
    }

    pub fn periods(&self) -> &[ScheduledPeriod] {
        &self.periods
    }

    pub fn start_date(&self) -> NaiveDate {
        self.periods[0].start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.periods[self.periods.len() - 1].end_date
    }

    /// Index of the period covering `date`.
    pub fn period_index(&self, date: NaiveDate) -> Option<usize> {
        // periods are sorted and contiguous
        let idx = self.periods.partition_point(|p| p.end_date < date);
        (idx < self.periods.len() && self.periods[idx].contains(date)).then_some(idx)
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}

//! Equity curve construction across one or more allocation periods.
//!
//! The curve starts at the initial capital on the anchor date, the first
//! date on which every weighted ticker of the covering period has a price.
//! Each later point compounds one portfolio return. At a period boundary the
//! ending value of one period is the starting value of the next: weight
//! changes reallocate existing equity, no cash moves in or out.

use crate::domain::composition::PortfolioReturnCompositor;
use crate::domain::error::PortsimError;
use crate::domain::period::PeriodSchedule;
use crate::domain::price::{PriceMap, common_price_dates};
use crate::domain::rates::BorrowingCost;
use crate::domain::returns::{ReturnPoint, ReturnSeries, aligned_returns};
use crate::domain::weights::WeightVector;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// What happened inside one scheduled period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodOutcome {
    pub index: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weights: WeightVector,
    pub leverage: f64,
    pub is_override: bool,
    pub first_trading_date: Option<NaiveDate>,
    pub last_trading_date: Option<NaiveDate>,
    pub trading_days: usize,
    pub start_value: f64,
    pub end_value: f64,
    pub period_return: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityCurve {
    pub points: Vec<EquityPoint>,
    /// Net portfolio return applied on each point after the first.
    pub daily_returns: Vec<ReturnPoint>,
    pub periods: Vec<PeriodOutcome>,
    /// First trading date of every period that follows an earlier active
    /// period, i.e. the days the allocation switches.
    pub rebalance_dates: Vec<NaiveDate>,
    pub skipped_tickers: Vec<String>,
}

impl EquityCurve {
    pub fn initial_value(&self) -> f64 {
        self.points.first().map(|p| p.value).unwrap_or(0.0)
    }

    pub fn final_value(&self) -> f64 {
        self.points.last().map(|p| p.value).unwrap_or(0.0)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

pub struct EquityCurveBuilder<'a> {
    prices: &'a PriceMap,
    borrowing: BorrowingCost,
    initial_capital: f64,
}

impl<'a> EquityCurveBuilder<'a> {
    pub fn new(prices: &'a PriceMap, borrowing: BorrowingCost, initial_capital: f64) -> Self {
        Self {
            prices,
            borrowing,
            initial_capital,
        }
    }

    pub fn build(&self, schedule: &PeriodSchedule) -> Result<EquityCurve, PortsimError> {
        // Each period's tickers share their own calendar.
        let period_series: Vec<BTreeMap<String, ReturnSeries>> = schedule
            .periods()
            .iter()
            .map(|period| {
                let tickers: Vec<&str> = period.weights.tickers().collect();
                aligned_returns(self.prices, &tickers)
            })
            .collect();
        let anchor = self.anchor_date(&period_series, schedule)?;
        debug!(%anchor, capital = self.initial_capital, "equity curve anchor");

        let mut points = vec![EquityPoint {
            date: anchor,
            value: self.initial_capital,
        }];
        let mut daily_returns = Vec::new();
        let mut outcomes = Vec::with_capacity(schedule.len());
        let mut rebalance_dates = Vec::new();
        let mut skipped = BTreeSet::new();
        let mut value = self.initial_capital;
        let first_return_day = anchor.checked_add_days(Days::new(1)).unwrap_or(anchor);

        let periods = schedule.periods().iter().zip(&period_series);
        for (index, (period, series)) in periods.enumerate() {
            let compositor = PortfolioReturnCompositor::new(series, self.borrowing);
            let from = period.start_date.max(first_return_day);
            let composition = compositor.compose(
                &period.weights,
                period.leverage,
                from,
                period.end_date,
            )?;
            skipped.extend(composition.skipped.iter().cloned());

            let start_value = value;
            for point in &composition.returns {
                value *= 1.0 + point.simple_return;
                points.push(EquityPoint {
                    date: point.date,
                    value,
                });
            }

            let first_trading_date = composition.returns.first().map(|p| p.date);
            if composition.is_empty() {
                if period.end_date > anchor {
                    warn!(
                        period = index,
                        start = %period.start_date,
                        end = %period.end_date,
                        "period has no aligned trading days"
                    );
                }
            } else if outcomes.iter().any(|o: &PeriodOutcome| o.trading_days > 0) {
                rebalance_dates.extend(first_trading_date);
            }

            debug!(
                period = index,
                days = composition.returns.len(),
                start_value,
                end_value = value,
                "period complete"
            );

            outcomes.push(PeriodOutcome {
                index,
                start_date: period.start_date,
                end_date: period.end_date,
                weights: period.weights.clone(),
                leverage: period.leverage,
                is_override: period.is_override,
                first_trading_date,
                last_trading_date: composition.returns.last().map(|p| p.date),
                trading_days: composition.returns.len(),
                start_value,
                end_value: value,
                period_return: if start_value != 0.0 {
                    value / start_value - 1.0
                } else {
                    0.0
                },
            });
            daily_returns.extend(composition.returns);
        }

        if daily_returns.is_empty() {
            return Err(PortsimError::no_overlap(format!(
                "no aligned trading days after {anchor} in {}..{}",
                schedule.start_date(),
                schedule.end_date()
            )));
        }

        Ok(EquityCurve {
            points,
            daily_returns,
            periods: outcomes,
            rebalance_dates,
            skipped_tickers: skipped.into_iter().collect(),
        })
    }

    /// First date, scanning periods in order, on which every weighted ticker
    /// with data in that period has a price bar.
    fn anchor_date(
        &self,
        period_series: &[BTreeMap<String, ReturnSeries>],
        schedule: &PeriodSchedule,
    ) -> Result<NaiveDate, PortsimError> {
        let mut any_ticker = false;
        for (period, series) in schedule.periods().iter().zip(period_series) {
            let present: Vec<&str> = series.keys().map(String::as_str).collect();
            if present.is_empty() {
                continue;
            }
            any_ticker = true;
            let dates =
                common_price_dates(self.prices, &present, period.start_date, period.end_date);
            if let Some(first) = dates.first() {
                return Ok(*first);
            }
        }

        if !any_ticker {
            return Err(PortsimError::no_overlap(
                "none of the scheduled tickers has price data",
            ));
        }
        Err(PortsimError::no_overlap(format!(
            "no common trading date in {}..{}",
            schedule.start_date(),
            schedule.end_date()
        )))
    }
}

//! Weighted, leveraged combination of per-asset daily returns.
//!
//! Alignment is by calendar date: a portfolio return exists only on dates
//! where every weighted ticker with data has a return. Callers feed series
//! built by [`aligned_returns`](crate::domain::returns::aligned_returns) so
//! that every return spans the same interval across tickers.

use crate::domain::error::PortsimError;
use crate::domain::rates::BorrowingCost;
use crate::domain::returns::{ReturnPoint, ReturnSeries};
use crate::domain::weights::WeightVector;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Output of one composition: the portfolio returns plus the weighted
/// tickers that had no return data and were left out.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Composition {
    pub returns: Vec<ReturnPoint>,
    pub skipped: Vec<String>,
}

impl Composition {
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.returns.iter().map(|p| p.simple_return).collect()
    }
}

/// Combines asset return series under one allocation.
#[derive(Debug, Clone, Copy)]
pub struct PortfolioReturnCompositor<'a> {
    series: &'a BTreeMap<String, ReturnSeries>,
    borrowing: BorrowingCost,
}

impl<'a> PortfolioReturnCompositor<'a> {
    pub fn new(series: &'a BTreeMap<String, ReturnSeries>, borrowing: BorrowingCost) -> Self {
        Self { series, borrowing }
    }

    /// Weighted tickers that have a return series, and those that do not.
    pub fn partition_tickers<'w>(
        &self,
        weights: &'w WeightVector,
    ) -> (Vec<&'w str>, Vec<&'w str>) {
        weights.tickers().partition(|t| self.series.contains_key(*t))
    }

    /// Return dates shared by every weighted ticker that has data, limited
    /// to `[from, to]`.
    pub fn aligned_dates(
        &self,
        weights: &WeightVector,
        from: NaiveDate,
        to: NaiveDate,
    ) -> BTreeSet<NaiveDate> {
        let (present, _) = self.partition_tickers(weights);
        let mut iter = present.iter().map(|t| &self.series[*t]);
        let Some(first) = iter.next() else {
            return BTreeSet::new();
        };
        let mut dates: BTreeSet<NaiveDate> =
            first.dates().filter(|d| *d >= from && *d <= to).collect();
        for s in iter {
            dates.retain(|d| s.date_index.contains_key(d));
        }
        dates
    }

    /// Portfolio daily returns for `[from, to]`:
    /// `leverage * sum(w_i * r_i) - borrow_cost(leverage)`.
    ///
    /// Weighted tickers without data are skipped with a warning. If none of
    /// the weighted tickers has data the result is `NoOverlappingData`; an
    /// empty date intersection yields an empty composition.
    pub fn compose(
        &self,
        weights: &WeightVector,
        leverage: f64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Composition, PortsimError> {
        let (present, missing) = self.partition_tickers(weights);
        for ticker in &missing {
            warn!(ticker = %ticker, "weighted ticker has no return data, skipping");
        }
        if present.is_empty() {
            return Err(PortsimError::no_overlap(format!(
                "none of the weighted tickers ({}) has data",
                weights.tickers().collect::<Vec<_>>().join(", ")
            )));
        }

        let daily_cost = self.borrowing.daily_cost(leverage);
        let returns = self
            .aligned_dates(weights, from, to)
            .into_iter()
            .map(|date| {
                let raw: f64 = present
                    .iter()
                    .filter_map(|t| {
                        let w = weights.get(t)?;
                        let r = self.series[*t].get(date)?;
                        Some(w * r)
                    })
                    .sum();
                ReturnPoint {
                    date,
                    simple_return: apply_leverage(raw, leverage, daily_cost),
                }
            })
            .collect();

        Ok(Composition {
            returns,
            skipped: missing.into_iter().map(str::to_string).collect(),
        })
    }
}

/// Unlevered returns pass through untouched so a leverage of one is exact.
fn apply_leverage(raw: f64, leverage: f64, daily_cost: f64) -> f64 {
    if leverage == 1.0 {
        raw
    } else {
        leverage * raw - daily_cost
    }
}

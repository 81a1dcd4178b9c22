//! Daily simple returns derived from adjusted closes.

use crate::domain::price::{PriceBar, PriceMap, common_price_dates};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub simple_return: f64,
}

/// Ordered return sequence for one ticker with a date lookup index.
#[derive(Debug, Clone, Default)]
pub struct ReturnSeries {
    pub points: Vec<ReturnPoint>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl ReturnSeries {
    /// r[t] = (adj[t] - adj[t-1]) / adj[t-1] for t >= 1.
    ///
    /// A day whose prior adjusted close is not positive is dropped. Fewer
    /// than two bars yield an empty series rather than an error.
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        let points: Vec<ReturnPoint> = bars
            .windows(2)
            .filter_map(|w| {
                let prev = w[0].adjusted_close;
                if prev > 0.0 {
                    Some(ReturnPoint {
                        date: w[1].date,
                        simple_return: (w[1].adjusted_close - prev) / prev,
                    })
                } else {
                    None
                }
            })
            .collect();
        Self::from_points(points)
    }

    pub fn from_points(points: Vec<ReturnPoint>) -> Self {
        let date_index = points
            .iter()
            .enumerate()
            .map(|(i, p)| (p.date, i))
            .collect();
        Self { points, date_index }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.date_index
            .get(&date)
            .map(|&i| self.points[i].simple_return)
    }

    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.points.iter().map(|p| p.date)
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.simple_return).collect()
    }
}

/// Return series for every ticker in `prices`, computed in parallel.
///
/// Tickers with fewer than two bars are logged and omitted, so callers
/// see them as tickers without data.
pub fn compute_all(prices: &PriceMap) -> BTreeMap<String, ReturnSeries> {
    prices
        .par_iter()
        .filter_map(|(ticker, bars)| {
            if bars.len() < 2 {
                warn!(ticker = %ticker, bars = bars.len(), "not enough bars for returns, skipping");
                return None;
            }
            Some((ticker.clone(), ReturnSeries::from_bars(bars)))
        })
        .collect()
}

/// Returns of `tickers` between consecutive dates on which all of them have
/// a bar. Every series lives on that shared calendar, so a move on a day one
/// ticker is missing folds into the next shared return instead of being lost.
///
/// Tickers with fewer than two bars are omitted.
pub fn aligned_returns(prices: &PriceMap, tickers: &[&str]) -> BTreeMap<String, ReturnSeries> {
    let usable: Vec<&str> = tickers
        .iter()
        .copied()
        .filter(|t| match prices.get(*t) {
            Some(bars) if bars.len() >= 2 => true,
            Some(bars) => {
                warn!(ticker = %t, bars = bars.len(), "not enough bars for returns, skipping");
                false
            }
            None => false,
        })
        .collect();
    let shared = common_price_dates(prices, &usable, NaiveDate::MIN, NaiveDate::MAX);

    usable
        .par_iter()
        .filter_map(|t| {
            let bars: Vec<PriceBar> = prices
                .get(*t)?
                .iter()
                .filter(|b| shared.contains(&b.date))
                .cloned()
                .collect();
            Some((t.to_string(), ReturnSeries::from_bars(&bars)))
        })
        .collect()
}

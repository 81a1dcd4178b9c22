//! Daily price bar and per-ticker price maps.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One trading day for one ticker. The ticker is the key of the [`PriceMap`]
/// the bar lives in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adjusted_close: f64,
    pub volume: i64,
}

impl PriceBar {
    /// Bar with every price field set to `price`.
    pub fn flat(date: NaiveDate, price: f64) -> Self {
        PriceBar {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adjusted_close: price,
            volume: 0,
        }
    }
}

/// Ticker -> bars sorted ascending by date, no duplicate dates.
pub type PriceMap = BTreeMap<String, Vec<PriceBar>>;

/// Dates on which every listed ticker has a bar within `[start, end]`.
/// Tickers absent from `prices` are ignored.
pub fn common_price_dates(
    prices: &PriceMap,
    tickers: &[&str],
    start: NaiveDate,
    end: NaiveDate,
) -> BTreeSet<NaiveDate> {
    let mut present = tickers.iter().filter_map(|t| prices.get(*t));
    let Some(first) = present.next() else {
        return BTreeSet::new();
    };
    let mut dates: BTreeSet<NaiveDate> = first
        .iter()
        .map(|b| b.date)
        .filter(|d| *d >= start && *d <= end)
        .collect();
    for bars in present {
        let other: BTreeSet<NaiveDate> = bars.iter().map(|b| b.date).collect();
        dates.retain(|d| other.contains(d));
    }
    dates
}

/// Restrict every ticker's bars to `[start, end]`.
pub fn slice_prices(prices: &PriceMap, start: NaiveDate, end: NaiveDate) -> PriceMap {
    prices
        .iter()
        .map(|(ticker, bars)| {
            let kept = bars
                .iter()
                .filter(|b| b.date >= start && b.date <= end)
                .cloned()
                .collect();
            (ticker.clone(), kept)
        })
        .collect()
}

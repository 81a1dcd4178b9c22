//! Price data access port.

use crate::domain::error::PortsimError;
use crate::domain::price::{PriceBar, PriceMap};
use chrono::NaiveDate;
use tracing::warn;

pub trait DataPort {
    /// Bars for `ticker` within `[start_date, end_date]`, ascending by date.
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortsimError>;

    /// First date, last date and bar count, or `None` when the ticker has
    /// no data at all.
    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortsimError>;
}

/// Stored history of one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct DataCoverage {
    pub ticker: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub bars: usize,
}

impl DataCoverage {
    pub fn spans(&self, start_date: NaiveDate, end_date: NaiveDate) -> bool {
        self.first_date <= start_date && self.last_date >= end_date
    }
}

/// Coverage for every ticker the port knows, plus the tickers it has no
/// data for or failed to describe.
pub fn data_coverage(
    port: &dyn DataPort,
    tickers: &[String],
) -> (Vec<DataCoverage>, Vec<String>) {
    let mut found = Vec::new();
    let mut missing = Vec::new();
    for ticker in tickers {
        match port.get_data_range(ticker) {
            Ok(Some((first_date, last_date, bars))) => found.push(DataCoverage {
                ticker: ticker.clone(),
                first_date,
                last_date,
                bars,
            }),
            Ok(None) => missing.push(ticker.clone()),
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "failed to read data range");
                missing.push(ticker.clone());
            }
        }
    }
    (found, missing)
}

/// Fetch every ticker into a [`PriceMap`].
///
/// A ticker that fails to load or has no bars is reported in the returned
/// skip list instead of aborting the whole fetch.
pub fn fetch_price_map(
    port: &dyn DataPort,
    tickers: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> (PriceMap, Vec<String>) {
    let mut prices = PriceMap::new();
    let mut skipped = Vec::new();
    for ticker in tickers {
        match port.fetch_prices(ticker, start_date, end_date) {
            Ok(bars) if !bars.is_empty() => {
                prices.insert(ticker.clone(), bars);
            }
            Ok(_) => {
                warn!(ticker = %ticker, "no price data in range, skipping");
                skipped.push(ticker.clone());
            }
            Err(e) => {
                warn!(ticker = %ticker, error = %e, "failed to load prices, skipping");
                skipped.push(ticker.clone());
            }
        }
    }
    (prices, skipped)
}

//! Shared test helpers for integration tests.

#![allow(dead_code)]

use chrono::{Datelike, Days, NaiveDate, Weekday};
use portsim::domain::error::PortsimError;
use portsim::domain::price::{PriceBar, PriceMap};
use portsim::ports::data_port::DataPort;
use portsim::ports::rate_port::RatePort;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(date_str: &str, price: f64) -> PriceBar {
    let d = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap();
    PriceBar::flat(d, price)
}

/// Bars on consecutive calendar days starting at `start`.
pub fn daily_bars(start: NaiveDate, prices: &[f64]) -> Vec<PriceBar> {
    prices
        .iter()
        .enumerate()
        .map(|(i, &p)| PriceBar::flat(start + Days::new(i as u64), p))
        .collect()
}

/// Monday to Friday dates in `[start, end]`.
pub fn weekdays(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Two years of weekday prices for SPY, AGG and GLD, 2020-01-01 to
/// 2021-12-31. Trend plus a ticker-specific oscillation, so every series has
/// drift, volatility and imperfect correlation with the others.
pub fn three_asset_fixture() -> PriceMap {
    let dates = weekdays(date(2020, 1, 1), date(2021, 12, 31));
    let series = |drift: f64, amp: f64, freq: f64, phase: f64| -> Vec<PriceBar> {
        dates
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let t = i as f64;
                let price = 100.0 * (1.0 + drift * t + amp * (freq * t + phase).sin());
                PriceBar::flat(*d, price)
            })
            .collect()
    };

    let mut prices = PriceMap::new();
    prices.insert("SPY".into(), series(0.0008, 0.03, 0.31, 0.0));
    prices.insert("AGG".into(), series(0.0001, 0.006, 0.53, 1.1));
    prices.insert("GLD".into(), series(0.0003, 0.02, 0.17, 2.3));
    prices
}

pub fn write_temp_ini(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

/// `{ticker}.csv` in `dir` with the price file header the CSV adapter reads.
pub fn write_price_csv(dir: &Path, ticker: &str, bars: &[PriceBar]) {
    let mut content = String::from("date,open,high,low,close,adj_close,volume\n");
    for b in bars {
        content.push_str(&format!(
            "{},{},{},{},{},{},{}\n",
            b.date, b.open, b.high, b.low, b.close, b.adjusted_close, b.volume
        ));
    }
    std::fs::write(dir.join(format!("{ticker}.csv")), content).unwrap();
}

pub fn write_fixture_csvs(dir: &Path) {
    for (ticker, bars) in three_asset_fixture() {
        write_price_csv(dir, &ticker, &bars);
    }
}

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, ticker: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(ticker.to_string(), bars);
        self
    }

    pub fn with_error(mut self, ticker: &str, reason: &str) -> Self {
        self.errors.insert(ticker.to_string(), reason.to_string());
        self
    }

    pub fn from_prices(prices: PriceMap) -> Self {
        let mut port = Self::new();
        port.data.extend(prices);
        port
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortsimError> {
        if let Some(reason) = self.errors.get(ticker) {
            return Err(PortsimError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(ticker)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortsimError> {
        Ok(self.data.get(ticker).and_then(|bars| {
            let first = bars.first()?;
            let last = bars.last()?;
            Some((first.date, last.date, bars.len()))
        }))
    }
}

/// Constant average rate per series; `None` for unknown series.
pub struct MockRatePort {
    pub rates: HashMap<String, f64>,
    pub failing: bool,
}

impl MockRatePort {
    pub fn new() -> Self {
        Self {
            rates: HashMap::new(),
            failing: false,
        }
    }

    pub fn with_rate(mut self, series: &str, rate: f64) -> Self {
        self.rates.insert(series.to_string(), rate);
        self
    }

    pub fn failing() -> Self {
        Self {
            rates: HashMap::new(),
            failing: true,
        }
    }
}

impl RatePort for MockRatePort {
    fn average_rate(
        &self,
        series: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Option<f64>, PortsimError> {
        if self.failing {
            return Err(PortsimError::Data {
                reason: "rate source unavailable".to_string(),
            });
        }
        Ok(self.rates.get(series).copied())
    }
}

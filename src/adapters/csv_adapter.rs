//! CSV directory adapter for price and rate data.
//!
//! Prices live in `{TICKER}.csv` with a `date,open,high,low,close,adj_close,volume`
//! header; rate series in `{SERIES}.csv` with `date,value`, values in percent.

use crate::domain::equity::EquityCurve;
use crate::domain::error::PortsimError;
use crate::domain::price::PriceBar;
use crate::ports::data_port::DataPort;
use crate::ports::rate_port::RatePort;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub struct CsvAdapter {
    base_path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct PriceRow {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    adj_close: Option<f64>,
    volume: Option<f64>,
}

impl From<PriceRow> for PriceBar {
    fn from(row: PriceRow) -> Self {
        PriceBar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            adjusted_close: row.adj_close.unwrap_or(row.close),
            volume: row.volume.unwrap_or(0.0) as i64,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RateRow {
    date: NaiveDate,
    value: Option<f64>,
}

#[derive(Debug, Serialize)]
struct CurveRow {
    date: NaiveDate,
    value: f64,
    daily_return: Option<f64>,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, name: &str) -> PathBuf {
        self.base_path.join(format!("{name}.csv"))
    }

    fn read(&self, name: &str) -> Result<Option<String>, PortsimError> {
        let path = self.csv_path(name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortsimError::Data {
                reason: format!("failed to read {}: {}", path.display(), e),
            }),
        }
    }

    fn load_bars(&self, ticker: &str) -> Result<Option<Vec<PriceBar>>, PortsimError> {
        let Some(content) = self.read(ticker)? else {
            return Ok(None);
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();
        for result in rdr.deserialize::<PriceRow>() {
            let row = result.map_err(|e| PortsimError::Data {
                reason: format!("{ticker}.csv: {e}"),
            })?;
            bars.push(PriceBar::from(row));
        }

        bars.sort_by_key(|b| b.date);
        if let Some(w) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(PortsimError::Data {
                reason: format!("{ticker}.csv: duplicate date {}", w[0].date),
            });
        }
        Ok(Some(bars))
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        ticker: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceBar>, PortsimError> {
        let bars = self.load_bars(ticker)?.ok_or_else(|| PortsimError::Data {
            reason: format!("no price file for {ticker} in {}", self.base_path.display()),
        })?;
        Ok(bars
            .into_iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .collect())
    }

    fn get_data_range(
        &self,
        ticker: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, PortsimError> {
        let Some(bars) = self.load_bars(ticker)? else {
            return Ok(None);
        };
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
            _ => None,
        })
    }
}

impl RatePort for CsvAdapter {
    /// Mean of the observations in range, converted from percent.
    fn average_rate(
        &self,
        series: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>, PortsimError> {
        let Some(content) = self.read(series)? else {
            return Ok(None);
        };

        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut sum = 0.0;
        let mut count = 0usize;
        for result in rdr.deserialize::<RateRow>() {
            let row = result.map_err(|e| PortsimError::Data {
                reason: format!("{series}.csv: {e}"),
            })?;
            if row.date < start || row.date > end {
                continue;
            }
            // blank values are missing observations
            if let Some(v) = row.value {
                sum += v;
                count += 1;
            }
        }

        Ok((count > 0).then(|| sum / count as f64 / 100.0))
    }
}

/// Write the curve as `date,value,daily_return`; the first row has no return.
pub fn write_equity_curve(path: &Path, curve: &EquityCurve) -> Result<(), PortsimError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| PortsimError::Data {
        reason: format!("failed to create {}: {}", path.display(), e),
    })?;
    for (i, point) in curve.points.iter().enumerate() {
        let daily_return = i
            .checked_sub(1)
            .and_then(|k| curve.daily_returns.get(k))
            .map(|r| r.simple_return);
        wtr.serialize(CurveRow {
            date: point.date,
            value: point.value,
            daily_return,
        })
        .map_err(|e| PortsimError::Data {
            reason: format!("failed to write {}: {}", path.display(), e),
        })?;
    }
    wtr.flush()?;
    Ok(())
}

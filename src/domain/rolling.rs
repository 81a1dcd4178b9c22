//! Rolling-window statistics over date-aligned asset returns.

use crate::domain::error::PortsimError;
use crate::domain::returns::ReturnSeries;
use crate::domain::stats::{TRADING_DAYS_PER_YEAR, mean, pearson, sample_std};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const MIN_ROLLING_WINDOW: usize = 5;

/// One value per ticker at the last date of a window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingPoint {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollingCorrelation {
    pub date: NaiveDate,
    pub first: String,
    pub second: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RollingStats {
    pub window: usize,
    pub tickers: Vec<String>,
    /// Annualized sample volatility.
    pub volatility: Vec<RollingPoint>,
    /// (1 + window mean)^252 - 1.
    pub expected_return: Vec<RollingPoint>,
    pub correlation: Vec<RollingCorrelation>,
}

/// Rolling statistics for `tickers` over the dates all of them share.
///
/// Tickers without a series are left out. Fewer aligned dates than `window`
/// gives empty output.
pub fn rolling_stats(
    series: &BTreeMap<String, ReturnSeries>,
    tickers: &[String],
    window: usize,
) -> Result<RollingStats, PortsimError> {
    if window < MIN_ROLLING_WINDOW {
        return Err(PortsimError::ConfigInvalid {
            section: "rolling".to_string(),
            key: "window".to_string(),
            reason: format!("window {window} must be at least {MIN_ROLLING_WINDOW} days"),
        });
    }

    let present: Vec<(&String, &ReturnSeries)> = tickers
        .iter()
        .filter_map(|t| series.get(t).map(|s| (t, s)))
        .collect();
    let mut stats = RollingStats {
        window,
        tickers: present.iter().map(|(t, _)| (*t).clone()).collect(),
        ..RollingStats::default()
    };

    let Some(((_, first), rest)) = present.split_first() else {
        return Ok(stats);
    };
    let mut dates: BTreeSet<NaiveDate> = first.dates().collect();
    for (_, s) in rest {
        dates.retain(|d| s.date_index.contains_key(d));
    }
    let dates: Vec<NaiveDate> = dates.into_iter().collect();
    if dates.len() < window {
        return Ok(stats);
    }

    // columns[k][i]: return of present[k] on dates[i]
    let columns: Vec<Vec<f64>> = present
        .iter()
        .map(|(_, s)| dates.iter().filter_map(|d| s.get(*d)).collect())
        .collect();

    for end in window..=dates.len() {
        let date = dates[end - 1];
        let start = end - window;

        let mut vol = BTreeMap::new();
        let mut ret = BTreeMap::new();
        for ((ticker, _), col) in present.iter().zip(&columns) {
            let slice = &col[start..end];
            vol.insert(
                (*ticker).clone(),
                sample_std(slice) * TRADING_DAYS_PER_YEAR.sqrt(),
            );
            ret.insert(
                (*ticker).clone(),
                (1.0 + mean(slice)).powf(TRADING_DAYS_PER_YEAR) - 1.0,
            );
        }
        stats.volatility.push(RollingPoint { date, values: vol });
        stats.expected_return.push(RollingPoint { date, values: ret });

        for i in 0..present.len() {
            for j in (i + 1)..present.len() {
                stats.correlation.push(RollingCorrelation {
                    date,
                    first: present[i].0.clone(),
                    second: present[j].0.clone(),
                    correlation: pearson(&columns[i][start..end], &columns[j][start..end]),
                });
            }
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::returns::ReturnPoint;
    use approx::assert_abs_diff_eq;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn series(values: &[(u32, f64)]) -> ReturnSeries {
        ReturnSeries::from_points(
            values
                .iter()
                .map(|&(day, r)| ReturnPoint {
                    date: d(day),
                    simple_return: r,
                })
                .collect(),
        )
    }

    fn fixture() -> BTreeMap<String, ReturnSeries> {
        let a: Vec<(u32, f64)> = (1..=8).map(|i| (i, 0.01 * i as f64)).collect();
        let b: Vec<(u32, f64)> = (1..=8).map(|i| (i, -0.02 * i as f64)).collect();
        let mut m = BTreeMap::new();
        m.insert("AAA".to_string(), series(&a));
        m.insert("BBB".to_string(), series(&b));
        m
    }

    fn tickers() -> Vec<String> {
        vec!["AAA".to_string(), "BBB".to_string()]
    }

    #[test]
    fn rejects_short_window() {
        let err = rolling_stats(&fixture(), &tickers(), 4).unwrap_err();
        assert!(matches!(err, PortsimError::ConfigInvalid { ref key, .. } if key == "window"));
    }

    #[test]
    fn one_point_per_full_window() {
        let stats = rolling_stats(&fixture(), &tickers(), 5).unwrap();
        assert_eq!(stats.volatility.len(), 4);
        assert_eq!(stats.expected_return.len(), 4);
        assert_eq!(stats.correlation.len(), 4);
        assert_eq!(stats.volatility[0].date, d(5));
        assert_eq!(stats.volatility[3].date, d(8));
    }

    #[test]
    fn window_values() {
        let stats = rolling_stats(&fixture(), &tickers(), 5).unwrap();
        let first: Vec<f64> = (1..=5).map(|i| 0.01 * i as f64).collect();
        assert_abs_diff_eq!(
            stats.volatility[0].values["AAA"],
            sample_std(&first) * 252.0_f64.sqrt(),
            epsilon = 1e-12
        );
        assert_abs_diff_eq!(
            stats.expected_return[0].values["AAA"],
            1.03_f64.powf(252.0) - 1.0,
            epsilon = 1e-6
        );
        assert_abs_diff_eq!(stats.correlation[0].correlation, -1.0, epsilon = 1e-12);
        assert_eq!(stats.correlation[0].first, "AAA");
    }

    #[test]
    fn too_little_history_is_empty() {
        let stats = rolling_stats(&fixture(), &tickers(), 20).unwrap();
        assert!(stats.volatility.is_empty());
        assert_eq!(stats.tickers.len(), 2);
    }

    #[test]
    fn unknown_tickers_are_ignored() {
        let ts = vec!["AAA".to_string(), "ZZZ".to_string()];
        let stats = rolling_stats(&fixture(), &ts, 5).unwrap();
        assert_eq!(stats.tickers, vec!["AAA".to_string()]);
        assert!(stats.correlation.is_empty());
        assert_eq!(stats.volatility.len(), 4);
    }
}

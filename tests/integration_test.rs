//! End-to-end tests of the backtest and risk pipelines against in-memory data.
//!
//! Tests cover:
//! - Performance metrics checked against reference computations
//! - Curve compounding and stitching across periods
//! - Drawdown episodes
//! - Missing-data handling and schedule validation errors
//! - Risk metrics, projections and simulation through `run_risk`
//! - Price loading through the data port

mod common;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use common::*;
use portsim::domain::backtest::{BacktestConfig, RiskConfig, run_backtest, run_risk};
use portsim::domain::error::PortsimError;
use portsim::domain::period::{Period, PeriodSchedule, ScheduledPeriod};
use portsim::domain::price::PriceMap;
use portsim::domain::projection::{BandLevel, CURVE_HORIZON, PROJECTION_HORIZONS};
use portsim::domain::rates::RiskFreeRate;
use portsim::domain::risk::Confidence;
use portsim::domain::weights::WeightVector;
use portsim::ports::data_port::{data_coverage, fetch_price_map};

fn fixture_weights() -> WeightVector {
    WeightVector::new()
        .with("SPY", 0.40)
        .with("AGG", 0.35)
        .with("GLD", 0.25)
}

fn fixture_config() -> BacktestConfig {
    let mut config = BacktestConfig::flat(date(2020, 1, 1), date(2021, 12, 31), fixture_weights());
    config.risk_free_rate = RiskFreeRate::fixed(0.02);
    config
}

fn single(ticker: &str, prices: &[f64]) -> PriceMap {
    let mut map = PriceMap::new();
    map.insert(ticker.to_string(), daily_bars(date(2024, 1, 1), prices));
    map
}

// ===========================================================================
// Performance metrics
// ===========================================================================

mod metrics_reference {
    use super::*;

    #[test]
    fn metrics_match_hand_computation() {
        let prices = [100.0, 102.0, 101.0, 105.0, 104.0, 108.0];
        let map = single("AAA", &prices);
        let mut config = BacktestConfig::flat(
            date(2024, 1, 1),
            date(2024, 1, 6),
            WeightVector::new().with("AAA", 1.0),
        );
        config.risk_free_rate = RiskFreeRate::fixed(0.02);

        let result = run_backtest(&map, &config).unwrap();

        let returns: Vec<f64> = prices.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
        let vol = var.sqrt() * 252f64.sqrt();
        let cagr = 1.08f64.powf(365.25 / 5.0) - 1.0;
        let sharpe = (cagr - 0.02) / vol;

        let m = &result.metrics;
        assert_relative_eq!(m.total_return, 0.08, max_relative = 1e-6);
        assert_relative_eq!(m.annualized_volatility, vol, max_relative = 1e-6);
        assert_relative_eq!(m.cagr, cagr, max_relative = 1e-6);
        assert_relative_eq!(m.sharpe_ratio, sharpe, max_relative = 1e-6);
        assert_eq!(m.start_date, Some(date(2024, 1, 1)));
        assert_eq!(m.end_date, Some(date(2024, 1, 6)));
    }

    #[test]
    fn curve_tracks_prices_scaled_to_capital() {
        let map = single("AAA", &[50.0, 55.0, 44.0]);
        let mut config =
            BacktestConfig::flat(date(2024, 1, 1), date(2024, 1, 3), WeightVector::new().with("AAA", 1.0));
        config.initial_capital = 1_000.0;

        let result = run_backtest(&map, &config).unwrap();
        let values = result.curve.values();
        assert_eq!(values.len(), 3);
        assert_relative_eq!(values[0], 1_000.0);
        assert_relative_eq!(values[1], 1_100.0, max_relative = 1e-12);
        assert_relative_eq!(values[2], 880.0, max_relative = 1e-12);
    }

    #[test]
    fn three_asset_metrics_match_reference() {
        let prices = three_asset_fixture();
        let result = run_backtest(&prices, &fixture_config()).unwrap();

        // Reference straight from the fixture: every ticker shares the
        // weekday calendar, so day i compounds sum(w * (p[i] / p[i-1] - 1)).
        let weights = [("SPY", 0.40), ("AGG", 0.35), ("GLD", 0.25)];
        let n = prices["SPY"].len();
        let returns: Vec<f64> = (1..n)
            .map(|i| {
                weights
                    .iter()
                    .map(|(t, w)| {
                        let bars = &prices[*t];
                        w * (bars[i].adjusted_close / bars[i - 1].adjusted_close - 1.0)
                    })
                    .sum()
            })
            .collect();
        let growth: f64 = returns.iter().map(|r| 1.0 + r).product();
        let days = (date(2021, 12, 31) - date(2020, 1, 1)).num_days() as f64;
        let cagr = growth.powf(365.25 / days) - 1.0;
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
            / (returns.len() - 1) as f64;
        let vol = var.sqrt() * 252f64.sqrt();
        let sharpe = (cagr - 0.02) / vol;

        let m = &result.metrics;
        assert_eq!(result.curve.len(), n);
        assert_relative_eq!(m.total_return, growth - 1.0, max_relative = 1e-6);
        assert_relative_eq!(m.cagr, cagr, max_relative = 1e-6);
        assert_relative_eq!(m.annualized_volatility, vol, max_relative = 1e-6);
        assert_relative_eq!(m.sharpe_ratio, sharpe, max_relative = 1e-6);
    }

    #[test]
    fn total_return_matches_asset_over_shared_dates() {
        let aaa = [100.0, 104.0, 97.0, 101.0, 130.0, 125.0, 90.0, 95.0, 112.0, 108.0];
        let mut map = single("AAA", &aaa);
        let mut bbb = daily_bars(date(2024, 1, 1), &[10.0; 10]);
        // BBB misses the first day, the last day and the jump on Jan 5
        bbb.remove(9);
        bbb.remove(4);
        bbb.remove(0);
        map.insert("BBB".into(), bbb);

        let weights = WeightVector::new().with("AAA", 1.0).with("BBB", 0.0);
        let config = BacktestConfig::flat(date(2024, 1, 1), date(2024, 1, 10), weights);
        let result = run_backtest(&map, &config).unwrap();

        assert_eq!(result.curve.points[0].date, date(2024, 1, 2));
        assert_eq!(result.curve.points.last().unwrap().date, date(2024, 1, 9));
        assert_eq!(result.curve.len(), 7);
        assert_relative_eq!(result.metrics.total_return, aaa[8] / aaa[1] - 1.0, max_relative = 1e-9);
    }

    #[test]
    fn wiped_out_portfolio_reports_full_loss() {
        let map = single("AAA", &[100.0, 50.0, 50.0]);
        let mut config =
            BacktestConfig::flat(date(2024, 1, 1), date(2024, 1, 3), WeightVector::new().with("AAA", 1.0));
        config.leverage = 2.0;
        let result = run_backtest(&map, &config).unwrap();

        assert!(result.curve.final_value() <= 0.0);
        assert!(result.metrics.total_return <= -1.0);
        assert_eq!(result.metrics.cagr, -1.0);
    }

    #[test]
    fn leverage_scales_daily_returns_net_of_borrowing() {
        let prices = three_asset_fixture();
        let unlevered = run_backtest(&prices, &fixture_config()).unwrap();
        let mut config = fixture_config();
        config.leverage = 2.0;
        let levered = run_backtest(&prices, &config).unwrap();

        // (0.02 + 0.01) / 252 on the borrowed half
        let daily_cost = 0.03 / 252.0;
        for (base, lev) in unlevered
            .curve
            .daily_returns
            .iter()
            .zip(&levered.curve.daily_returns)
        {
            assert_eq!(base.date, lev.date);
            assert_abs_diff_eq!(lev.simple_return, 2.0 * base.simple_return - daily_cost, epsilon = 1e-12);
        }
    }
}

// ===========================================================================
// Drawdowns
// ===========================================================================

mod drawdowns {
    use super::*;

    #[test]
    fn single_recovered_episode() {
        let map = single("AAA", &[100.0, 110.0, 95.0, 90.0, 105.0, 120.0]);
        let config =
            BacktestConfig::flat(date(2024, 1, 1), date(2024, 1, 6), WeightVector::new().with("AAA", 1.0));
        let result = run_backtest(&map, &config).unwrap();

        let m = &result.metrics;
        assert_relative_eq!(m.max_drawdown, 90.0 / 110.0 - 1.0, max_relative = 1e-9);
        assert_eq!(m.drawdowns.len(), 1);
        let dd = &m.drawdowns[0];
        assert_eq!(dd.peak_date, date(2024, 1, 2));
        assert_eq!(dd.trough_date, date(2024, 1, 4));
        assert_eq!(dd.recovery_date, Some(date(2024, 1, 6)));
        assert!(dd.is_recovered());
    }

    #[test]
    fn monotonic_curve_has_no_drawdown() {
        let map = single("AAA", &[100.0, 101.0, 102.0, 103.0]);
        let config =
            BacktestConfig::flat(date(2024, 1, 1), date(2024, 1, 4), WeightVector::new().with("AAA", 1.0));
        let result = run_backtest(&map, &config).unwrap();
        assert_eq!(result.metrics.max_drawdown, 0.0);
        assert!(result.metrics.drawdowns.is_empty());
    }

    #[test]
    fn fixture_drawdowns_are_sorted_deepest_first() {
        let result = run_backtest(&three_asset_fixture(), &fixture_config()).unwrap();
        let dds = &result.metrics.drawdowns;
        assert!(!dds.is_empty());
        assert!(dds.len() <= 5);
        assert_relative_eq!(dds[0].drawdown, result.metrics.max_drawdown, max_relative = 1e-12);
        for pair in dds.windows(2) {
            assert!(pair[0].drawdown <= pair[1].drawdown);
        }
    }
}

// ===========================================================================
// Period stitching
// ===========================================================================

mod stitching {
    use super::*;

    #[test]
    fn splitting_with_identical_weights_leaves_curve_unchanged() {
        let prices = three_asset_fixture();
        let flat = run_backtest(&prices, &fixture_config()).unwrap();

        let mut split = fixture_config();
        split.periods = vec![
            Period::new(date(2020, 1, 1), date(2020, 9, 30), fixture_weights()),
            Period::new(date(2021, 3, 1), date(2021, 6, 15), fixture_weights()),
        ];
        let stitched = run_backtest(&prices, &split).unwrap();

        assert_eq!(stitched.curve.periods.len(), 4);
        assert_eq!(flat.curve.len(), stitched.curve.len());
        for (a, b) in flat.curve.points.iter().zip(&stitched.curve.points) {
            assert_eq!(a.date, b.date);
            assert_relative_eq!(a.value, b.value, max_relative = 1e-12);
        }
    }

    #[test]
    fn no_capital_injection_at_boundaries() {
        let prices = three_asset_fixture();
        let mut config = fixture_config();
        config.periods = vec![
            Period::new(
                date(2021, 1, 1),
                date(2021, 12, 31),
                WeightVector::new().with("SPY", 0.8).with("AGG", 0.2),
            )
            .with_leverage(1.5),
        ];
        let result = run_backtest(&prices, &config).unwrap();
        let periods = &result.curve.periods;
        assert_eq!(periods.len(), 2);
        assert!(periods[1].is_override);
        assert_relative_eq!(periods[1].start_value, periods[0].end_value);

        let first = periods[1].first_trading_date.unwrap();
        let idx = result.curve.points.iter().position(|p| p.date == first).unwrap();
        let before = result.curve.points[idx - 1];
        let after = result.curve.points[idx];
        let r = result
            .curve
            .daily_returns
            .iter()
            .find(|p| p.date == first)
            .unwrap()
            .simple_return;
        assert_relative_eq!(after.value, before.value * (1.0 + r), max_relative = 1e-12);
        assert_eq!(result.curve.rebalance_dates, vec![first]);
    }

    #[test]
    fn period_analysis_covers_each_traded_period() {
        let prices = three_asset_fixture();
        let mut config = fixture_config();
        config.periods = vec![Period::new(
            date(2020, 7, 1),
            date(2020, 12, 31),
            WeightVector::new().with("GLD", 1.0),
        )];
        let result = run_backtest(&prices, &config).unwrap();
        assert_eq!(result.period_analysis.len(), 3);
        for (analysis, outcome) in result.period_analysis.iter().zip(&result.curve.periods) {
            assert_eq!(analysis.index, outcome.index);
            assert_abs_diff_eq!(
                analysis.metrics.total_return,
                outcome.period_return,
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn disabled_override_is_ignored() {
        let prices = three_asset_fixture();
        let flat = run_backtest(&prices, &fixture_config()).unwrap();
        let mut config = fixture_config();
        config.periods = vec![
            Period::new(date(2020, 6, 1), date(2020, 6, 30), WeightVector::new().with("GLD", 1.0))
                .disabled(),
        ];
        let result = run_backtest(&prices, &config).unwrap();
        assert_eq!(result.curve.periods.len(), 1);
        assert_relative_eq!(result.curve.final_value(), flat.curve.final_value());
    }
}

// ===========================================================================
// Errors and missing data
// ===========================================================================

mod errors {
    use super::*;

    #[test]
    fn missing_ticker_is_skipped() {
        let prices = three_asset_fixture();
        let mut config = fixture_config();
        config.weights = fixture_weights().with("XYZ", 0.1);
        let result = run_backtest(&prices, &config).unwrap();
        assert_eq!(result.curve.skipped_tickers, vec!["XYZ".to_string()]);
        assert!(result.curve.len() > 400);
    }

    #[test]
    fn all_tickers_missing_is_no_overlap() {
        let mut config = fixture_config();
        config.weights = WeightVector::new().with("XYZ", 1.0);
        let err = run_backtest(&three_asset_fixture(), &config).unwrap_err();
        assert!(matches!(err, PortsimError::NoOverlappingData { .. }));
    }

    #[test]
    fn disjoint_calendars_are_no_overlap() {
        let mut map = PriceMap::new();
        map.insert("AAA".into(), daily_bars(date(2024, 1, 1), &[1.0, 1.1, 1.2]));
        map.insert("BBB".into(), daily_bars(date(2024, 2, 1), &[1.0, 1.1, 1.2]));
        let config = BacktestConfig::flat(
            date(2024, 1, 1),
            date(2024, 2, 28),
            WeightVector::new().with("AAA", 0.5).with("BBB", 0.5),
        );
        let err = run_backtest(&map, &config).unwrap_err();
        assert!(matches!(err, PortsimError::NoOverlappingData { .. }));
    }

    #[test]
    fn overlapping_overrides_are_rejected() {
        let mut config = fixture_config();
        config.periods = vec![
            Period::new(date(2020, 3, 1), date(2020, 6, 30), fixture_weights()),
            Period::new(date(2020, 6, 1), date(2020, 8, 31), fixture_weights()),
        ];
        let err = run_backtest(&three_asset_fixture(), &config).unwrap_err();
        assert!(matches!(err, PortsimError::InvalidPeriodSchedule { .. }));
    }

    #[test]
    fn override_outside_range_is_rejected() {
        let mut config = fixture_config();
        config.periods = vec![Period::new(date(2019, 6, 1), date(2020, 2, 1), fixture_weights())];
        let err = run_backtest(&three_asset_fixture(), &config).unwrap_err();
        assert!(matches!(err, PortsimError::InvalidPeriodSchedule { period: 0, .. }));
    }

    #[test]
    fn explicit_schedule_with_gap_is_rejected() {
        let period = |start, end| ScheduledPeriod {
            start_date: start,
            end_date: end,
            weights: fixture_weights(),
            leverage: 1.0,
            is_override: false,
        };
        let err = PeriodSchedule::new(vec![
            period(date(2020, 1, 1), date(2020, 6, 30)),
            period(date(2020, 7, 2), date(2020, 12, 31)),
        ])
        .unwrap_err();
        match err {
            PortsimError::InvalidPeriodSchedule { period, date: d, .. } => {
                assert_eq!(period, 1);
                assert_eq!(d, date(2020, 7, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

// ===========================================================================
// Risk pipeline
// ===========================================================================

mod risk {
    use super::*;

    fn risk_config(leverage: f64) -> RiskConfig {
        let mut config = RiskConfig::new(fixture_weights());
        config.leverage = leverage;
        config.risk_free_rate = RiskFreeRate::fixed(0.02);
        config.as_of = Some(date(2021, 12, 31));
        config
    }

    #[test]
    fn leverage_scales_volatility_and_var_but_not_sharpe() {
        let prices = three_asset_fixture();
        let base = run_risk(&prices, &risk_config(1.0)).unwrap().metrics;
        let levered = run_risk(&prices, &risk_config(3.0)).unwrap().metrics;

        assert_relative_eq!(levered.daily_volatility, 3.0 * base.daily_volatility, max_relative = 1e-12);
        assert_relative_eq!(levered.daily_return, 3.0 * base.daily_return, max_relative = 1e-12);
        assert_relative_eq!(levered.sharpe_ratio, base.sharpe_ratio, max_relative = 1e-12);
        assert_relative_eq!(
            levered.var_for(Confidence::P99, 1),
            3.0 * base.var_for(Confidence::P99, 1),
            max_relative = 1e-12
        );
    }

    #[test]
    fn var_grows_with_confidence_and_horizon() {
        let metrics = run_risk(&three_asset_fixture(), &risk_config(1.0)).unwrap().metrics;
        let one_day_95 = metrics.var_for(Confidence::P95, 1);
        assert!(one_day_95 > 0.0);
        assert!(metrics.var_for(Confidence::P99, 1) > one_day_95);
        assert_relative_eq!(
            metrics.var_for(Confidence::P95, 30),
            one_day_95 * 30f64.sqrt(),
            max_relative = 1e-12
        );
        assert_relative_eq!(
            one_day_95,
            10_000.0 * metrics.daily_volatility * 1.645,
            max_relative = 1e-12
        );
        assert_eq!(metrics.value_at_risk.len(), 4);
    }

    #[test]
    fn lookback_window_limits_observations() {
        let metrics = run_risk(&three_asset_fixture(), &risk_config(1.0)).unwrap().metrics;
        assert!(metrics.window_start >= date(2020, 12, 31));
        assert_eq!(metrics.window_end, date(2021, 12, 31));
        // roughly one year of weekdays
        assert!((255..=262).contains(&metrics.observations));
    }

    #[test]
    fn correlation_matrix_is_symmetric_with_unit_diagonal() {
        let metrics = run_risk(&three_asset_fixture(), &risk_config(1.0)).unwrap().metrics;
        let corr = &metrics.correlation;
        assert_eq!(corr.len(), 3);
        for a in &corr.tickers {
            assert_relative_eq!(corr.get(a, a).unwrap(), 1.0);
            for b in &corr.tickers {
                let ab = corr.get(a, b).unwrap();
                assert_relative_eq!(ab, corr.get(b, a).unwrap());
                assert!((-1.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn projections_cover_horizons_and_curve() {
        let report = run_risk(&three_asset_fixture(), &risk_config(2.0)).unwrap();
        let horizons: Vec<u32> = report.projections.iter().map(|p| p.horizon_days).collect();
        assert_eq!(horizons, PROJECTION_HORIZONS.to_vec());
        assert_eq!(report.projection_curve.len(), CURVE_HORIZON as usize + 1);
        assert_relative_eq!(report.projection_curve[0].expected_value, 10_000.0);
        assert!(report.simulated.is_empty());
        assert!(report.rolling.is_none());

        for p in &report.projections {
            let inner = p.band(BandLevel::P68).unwrap();
            let outer = p.band(BandLevel::P99).unwrap();
            assert!(outer.lower < inner.lower);
            assert!(outer.upper > inner.upper);
        }
    }

    #[test]
    fn simulation_is_reproducible_for_a_seed() {
        let mut config = risk_config(1.5);
        config.simulation_paths = 200;
        config.simulation_seed = 7;
        let prices = three_asset_fixture();

        let first = run_risk(&prices, &config).unwrap().simulated;
        let second = run_risk(&prices, &config).unwrap().simulated;
        assert_eq!(first.len(), PROJECTION_HORIZONS.len());
        assert_eq!(first, second);
        for p in &first {
            assert!(p.median_value.unwrap() > 0.0);
            let band = p.band(BandLevel::P95).unwrap();
            assert!(band.lower <= band.upper);
        }
    }

    #[test]
    fn asset_stats_cover_every_loaded_ticker() {
        let report = run_risk(&three_asset_fixture(), &risk_config(1.0)).unwrap();
        let tickers: Vec<&str> = report.asset_stats.iter().map(|s| s.ticker.as_str()).collect();
        assert_eq!(tickers, vec!["AGG", "GLD", "SPY"]);
        for stats in &report.asset_stats {
            assert!(stats.annualized_volatility > 0.0);
            assert_eq!(stats.data_points, report.metrics.observations);
        }
    }

    #[test]
    fn missing_ticker_is_reported() {
        let mut config = risk_config(1.0);
        config.weights = fixture_weights().with("XYZ", 0.1);
        let metrics = run_risk(&three_asset_fixture(), &config).unwrap().metrics;
        assert_eq!(metrics.skipped_tickers, vec!["XYZ".to_string()]);
        assert_eq!(metrics.correlation.len(), 3);
    }

    #[test]
    fn single_observation_is_insufficient() {
        let map = single("AAA", &[100.0, 101.0]);
        let config = RiskConfig::new(WeightVector::new().with("AAA", 1.0));
        let err = run_risk(&map, &config).unwrap_err();
        assert!(matches!(err, PortsimError::InsufficientData { bars: 1, .. }));
    }
}

// ===========================================================================
// Data port loading
// ===========================================================================

mod data_loading {
    use super::*;

    #[test]
    fn failing_and_empty_tickers_are_skipped() {
        let port = MockDataPort::from_prices(three_asset_fixture())
            .with_error("BAD", "connection reset")
            .with_bars("OLD", vec![make_bar("2010-01-04", 10.0)]);
        let tickers: Vec<String> = ["SPY", "BAD", "OLD", "AGG"].iter().map(|s| s.to_string()).collect();

        let (prices, skipped) = fetch_price_map(&port, &tickers, date(2020, 1, 1), date(2020, 3, 31));
        assert_eq!(prices.keys().collect::<Vec<_>>(), vec!["AGG", "SPY"]);
        assert_eq!(skipped, vec!["BAD".to_string(), "OLD".to_string()]);
        assert!(prices["SPY"].iter().all(|b| b.date <= date(2020, 3, 31)));
    }

    #[test]
    fn coverage_reports_ranges_and_missing_tickers() {
        let port = MockDataPort::from_prices(three_asset_fixture())
            .with_bars("OLD", vec![make_bar("2010-01-04", 10.0), make_bar("2010-01-05", 11.0)]);
        let tickers: Vec<String> = ["SPY", "OLD", "NONE"].iter().map(|s| s.to_string()).collect();

        let (coverage, missing) = data_coverage(&port, &tickers);
        assert_eq!(missing, vec!["NONE".to_string()]);
        assert_eq!(coverage.len(), 2);
        assert_eq!(coverage[0].ticker, "SPY");
        assert_eq!(coverage[0].first_date, date(2020, 1, 1));
        assert_eq!(coverage[0].last_date, date(2021, 12, 31));
        assert!(coverage[0].spans(date(2020, 1, 1), date(2021, 12, 31)));
        assert_eq!(coverage[1].bars, 2);
        assert!(!coverage[1].spans(date(2020, 1, 1), date(2021, 12, 31)));
    }

    #[test]
    fn backtest_over_fetched_prices() {
        let port = MockDataPort::from_prices(three_asset_fixture());
        let tickers = vec!["SPY".to_string(), "AGG".to_string(), "GLD".to_string()];
        let (prices, skipped) = fetch_price_map(&port, &tickers, date(2020, 1, 1), date(2021, 12, 31));
        assert!(skipped.is_empty());

        let direct = run_backtest(&three_asset_fixture(), &fixture_config()).unwrap();
        let fetched = run_backtest(&prices, &fixture_config()).unwrap();
        assert_eq!(direct, fetched);
    }
}

//! Configuration validation and parsing helpers.
//!
//! Validates every section before any computation runs, so a bad config
//! fails fast with the offending section and key.

use crate::domain::error::PortsimError;
use crate::domain::period::Period;
use crate::domain::rolling::MIN_ROLLING_WINDOW;
use crate::domain::weights::{WEIGHT_SUM_TOLERANCE, WeightVector};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub const PERIOD_SECTION_PREFIX: &str = "period.";

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), PortsimError> {
    validate_portfolio_config(config)?;
    validate_rates_config(config)?;
    validate_risk_config(config)?;
    validate_period_sections(config)?;
    validate_data_config(config)?;
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), PortsimError> {
    let tickers = config_tickers(config)?;
    let weights = portfolio_weights(config, &tickers)?;
    weights.validate(WEIGHT_SUM_TOLERANCE)?;

    let capital = config.get_double("portfolio", "initial_capital", 100.0);
    if capital <= 0.0 {
        return Err(invalid("portfolio", "initial_capital", "initial_capital must be positive"));
    }
    validate_leverage(config, "portfolio")?;

    let start = parse_date(config, "portfolio", "start_date")?;
    let end = parse_date(config, "portfolio", "end_date")?;
    if start >= end {
        return Err(invalid("portfolio", "start_date", "start_date must be before end_date"));
    }
    Ok(())
}

fn validate_rates_config(config: &dyn ConfigPort) -> Result<(), PortsimError> {
    if config.get_string("rates", "risk_free_rate").is_some() {
        let value = config.get_double("rates", "risk_free_rate", -1.0);
        if !(0.0..1.0).contains(&value) {
            return Err(invalid("rates", "risk_free_rate", "risk_free_rate must be between 0 and 1"));
        }
    }
    let spread = config.get_double("rates", "borrow_spread", 0.0);
    if !(0.0..1.0).contains(&spread) {
        return Err(invalid("rates", "borrow_spread", "borrow_spread must be between 0 and 1"));
    }
    Ok(())
}

fn validate_risk_config(config: &dyn ConfigPort) -> Result<(), PortsimError> {
    if config.get_int("risk", "lookback_days", 365) <= 0 {
        return Err(invalid("risk", "lookback_days", "lookback_days must be positive"));
    }
    if config.get_double("risk", "portfolio_value", 10_000.0) <= 0.0 {
        return Err(invalid("risk", "portfolio_value", "portfolio_value must be positive"));
    }
    if config.get_int("risk", "simulation_paths", 0) < 0 {
        return Err(invalid("risk", "simulation_paths", "simulation_paths must be non-negative"));
    }
    if config.get_int("risk", "simulation_seed", 0) < 0 {
        return Err(invalid("risk", "simulation_seed", "simulation_seed must be non-negative"));
    }
    if config.get_string("risk", "rolling_window").is_some()
        && config.get_int("risk", "rolling_window", 0) < MIN_ROLLING_WINDOW as i64
    {
        return Err(invalid(
            "risk",
            "rolling_window",
            &format!("rolling_window must be at least {MIN_ROLLING_WINDOW} days"),
        ));
    }
    Ok(())
}

fn validate_period_sections(config: &dyn ConfigPort) -> Result<(), PortsimError> {
    let tickers = config_tickers(config)?;
    for section in period_sections(config) {
        let period = parse_period(config, &section, &tickers)?;
        if period.start_date > period.end_date {
            return Err(invalid(&section, "start_date", "start_date must not be after end_date"));
        }
        validate_leverage(config, &section)?;
        period.weights.validate(WEIGHT_SUM_TOLERANCE)?;
    }
    Ok(())
}

fn validate_data_config(config: &dyn ConfigPort) -> Result<(), PortsimError> {
    match config.get_string("data", "directory") {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(PortsimError::ConfigMissing {
            section: "data".to_string(),
            key: "directory".to_string(),
        }),
    }
}

fn validate_leverage(config: &dyn ConfigPort, section: &str) -> Result<(), PortsimError> {
    let leverage = config.get_double(section, "leverage", 1.0);
    if !leverage.is_finite() || leverage < 0.0 {
        return Err(invalid(section, "leverage", "leverage must be non-negative"));
    }
    Ok(())
}

/// Comma separated, trimmed, uppercased; empty entries dropped.
pub fn parse_tickers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn config_tickers(config: &dyn ConfigPort) -> Result<Vec<String>, PortsimError> {
    let tickers = config
        .get_string("portfolio", "tickers")
        .map(|s| parse_tickers(&s))
        .unwrap_or_default();
    if tickers.is_empty() {
        return Err(PortsimError::ConfigMissing {
            section: "portfolio".to_string(),
            key: "tickers".to_string(),
        });
    }
    Ok(tickers)
}

/// `[portfolio] weights`, or equal weights when the key is absent.
pub fn portfolio_weights(
    config: &dyn ConfigPort,
    tickers: &[String],
) -> Result<WeightVector, PortsimError> {
    match config.get_string("portfolio", "weights") {
        Some(raw) => parse_weights("portfolio", &raw, tickers),
        None => Ok(WeightVector::equal(tickers)),
    }
}

/// Either `0.4, 0.35, 0.25` in ticker order or `SPY:0.4, AGG:0.35, ...`.
pub fn parse_weights(
    section: &str,
    raw: &str,
    tickers: &[String],
) -> Result<WeightVector, PortsimError> {
    let entries: Vec<&str> = raw.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    let bad = |reason: String| invalid(section, "weights", &reason);

    if entries.iter().any(|e| e.contains(':')) {
        let mut weights = WeightVector::new();
        for entry in entries {
            let (ticker, value) = entry
                .split_once(':')
                .ok_or_else(|| bad(format!("expected TICKER:weight, got '{entry}'")))?;
            let ticker = ticker.trim().to_uppercase();
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| bad(format!("weight for {ticker} is not a number")))?;
            if weights.contains(&ticker) {
                return Err(bad(format!("{ticker} listed twice")));
            }
            weights.insert(&ticker, value);
        }
        return Ok(weights);
    }

    if entries.len() != tickers.len() {
        return Err(bad(format!(
            "{} weights given for {} tickers",
            entries.len(),
            tickers.len()
        )));
    }
    tickers
        .iter()
        .zip(entries)
        .map(|(ticker, entry)| {
            entry
                .parse::<f64>()
                .map(|w| (ticker.clone(), w))
                .map_err(|_| bad(format!("weight for {ticker} is not a number")))
        })
        .collect()
}

pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, PortsimError> {
    match config.get_string(section, key) {
        None => Err(PortsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            invalid(section, key, &format!("invalid {key} format, expected YYYY-MM-DD"))
        }),
    }
}

/// `[period.N]` section names ordered by N.
pub fn period_sections(config: &dyn ConfigPort) -> Vec<String> {
    let mut sections: Vec<(u32, String)> = config
        .sections()
        .into_iter()
        .filter_map(|s| {
            let n = s.strip_prefix(PERIOD_SECTION_PREFIX)?.parse().ok()?;
            Some((n, s))
        })
        .collect();
    sections.sort();
    sections.into_iter().map(|(_, s)| s).collect()
}

pub fn parse_period(
    config: &dyn ConfigPort,
    section: &str,
    tickers: &[String],
) -> Result<Period, PortsimError> {
    let start_date = parse_date(config, section, "start_date")?;
    let end_date = parse_date(config, section, "end_date")?;
    let raw = config
        .get_string(section, "weights")
        .ok_or_else(|| PortsimError::ConfigMissing {
            section: section.to_string(),
            key: "weights".to_string(),
        })?;
    let weights = parse_weights(section, &raw, tickers)?;

    let mut period = Period::new(start_date, end_date, weights);
    if config.get_string(section, "leverage").is_some() {
        period = period.with_leverage(config.get_double(section, "leverage", 1.0));
    }
    if !config.get_bool(section, "enabled", true) {
        period = period.disabled();
    }
    Ok(period)
}

pub fn parse_periods(config: &dyn ConfigPort, tickers: &[String]) -> Result<Vec<Period>, PortsimError> {
    period_sections(config)
        .iter()
        .map(|s| parse_period(config, s, tickers))
        .collect()
}

fn invalid(section: &str, key: &str, reason: &str) -> PortsimError {
    PortsimError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

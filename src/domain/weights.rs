//! Allocation weights keyed by ticker.
//!
//! The engine uses weights exactly as given. Checking that they sum to one
//! and renormalizing are caller policies exposed here as helpers.

use crate::domain::error::PortsimError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default tolerance on the weight sum for a valid allocation.
pub const WEIGHT_SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: BTreeMap<String, f64>,
}

impl WeightVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same weight for every ticker; empty input gives an empty vector.
    pub fn equal<S: AsRef<str>>(tickers: &[S]) -> Self {
        if tickers.is_empty() {
            return Self::new();
        }
        let w = 1.0 / tickers.len() as f64;
        tickers.iter().map(|t| (t.as_ref().to_string(), w)).collect()
    }

    pub fn with(mut self, ticker: &str, weight: f64) -> Self {
        self.insert(ticker, weight);
        self
    }

    pub fn insert(&mut self, ticker: &str, weight: f64) {
        self.weights.insert(ticker.to_string(), weight);
    }

    pub fn get(&self, ticker: &str) -> Option<f64> {
        self.weights.get(ticker).copied()
    }

    pub fn contains(&self, ticker: &str) -> bool {
        self.weights.contains_key(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.weights.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(t, w)| (t.as_str(), *w))
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn sum(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Ok when the weights sum to 1 within `tolerance`.
    pub fn validate(&self, tolerance: f64) -> Result<(), PortsimError> {
        if self.is_empty() {
            return Err(PortsimError::InvalidWeights {
                reason: "no tickers in allocation".to_string(),
            });
        }
        if let Some((ticker, _)) = self.iter().find(|(_, w)| !w.is_finite()) {
            return Err(PortsimError::InvalidWeights {
                reason: format!("weight for {ticker} is not finite"),
            });
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > tolerance {
            return Err(PortsimError::InvalidWeights {
                reason: format!("weights sum to {sum:.4}, expected 1.0 within {tolerance}"),
            });
        }
        Ok(())
    }

    /// Scaled so the weights sum to 1. A zero sum falls back to equal weights.
    pub fn normalized(&self) -> Self {
        let sum = self.sum();
        if sum == 0.0 {
            let tickers: Vec<&str> = self.tickers().collect();
            return Self::equal(tickers.as_slice());
        }
        self.iter().map(|(t, w)| (t.to_string(), w / sum)).collect()
    }
}

impl FromIterator<(String, f64)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            weights: iter.into_iter().collect(),
        }
    }
}

//! Core domain types and numerical pipeline.

pub mod price;
pub mod returns;
pub mod stats;
pub mod weights;
pub mod rates;
pub mod period;
pub mod composition;
pub mod equity;
pub mod metrics;
pub mod risk;
pub mod rolling;
pub mod projection;
pub mod backtest;
pub mod config_validation;
pub mod error;

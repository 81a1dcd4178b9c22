//! Interest-rate series port (risk-free / funding rate source).

use crate::domain::error::PortsimError;
use chrono::NaiveDate;

pub trait RatePort {
    /// Mean annualized rate (decimal, 0.05 = 5%) of `series` over
    /// `[start, end]`, or `None` when the source has no observations.
    fn average_rate(
        &self,
        series: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<f64>, PortsimError>;
}

//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for portsim.
#[derive(Debug, thiserror::Error)]
pub enum PortsimError {
    #[error("insufficient data for {ticker}: have {bars} points, need {minimum}")]
    InsufficientData {
        ticker: String,
        bars: usize,
        minimum: usize,
    },

    #[error("no overlapping data: {context}")]
    NoOverlappingData { context: String },

    #[error("invalid period schedule at period {period} ({date}): {reason}")]
    InvalidPeriodSchedule {
        period: usize,
        date: NaiveDate,
        reason: String,
    },

    #[error("invalid weights: {reason}")]
    InvalidWeights { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PortsimError {
    pub(crate) fn schedule(period: usize, date: NaiveDate, reason: impl Into<String>) -> Self {
        PortsimError::InvalidPeriodSchedule {
            period,
            date,
            reason: reason.into(),
        }
    }

    pub(crate) fn no_overlap(context: impl Into<String>) -> Self {
        PortsimError::NoOverlappingData {
            context: context.into(),
        }
    }
}

impl From<&PortsimError> for std::process::ExitCode {
    fn from(err: &PortsimError) -> Self {
        let code: u8 = match err {
            PortsimError::Io(_) => 1,
            PortsimError::ConfigParse { .. }
            | PortsimError::ConfigMissing { .. }
            | PortsimError::ConfigInvalid { .. } => 2,
            PortsimError::Data { .. } => 3,
            PortsimError::InvalidPeriodSchedule { .. } | PortsimError::InvalidWeights { .. } => 4,
            PortsimError::InsufficientData { .. } | PortsimError::NoOverlappingData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

use chrono::NaiveDate;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the forecasting pipeline and its collaborators.
///
/// `DataUnavailable`, `DegenerateSeries` and `InsufficientHistory` are the
/// terminal outcomes a user-facing layer is expected to explain. None of the
/// variants is retried internally.
#[derive(Error, Debug)]
pub enum ForecastError {
    /// The provider has no rows for the symbol or range.
    #[error("no price data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// Every fitted value is identical, so min-max scaling would divide by zero.
    #[error("price series is flat at {value}, cannot be scaled")]
    DegenerateSeries { value: f64 },

    /// Too few rows to form the required windows.
    #[error("insufficient history: need at least {required} rows, found {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("non-finite value at index {index}")]
    NonFinite { index: usize },

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error("window has {found} steps, model expects {expected}")]
    WindowLength { expected: usize, found: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("forecast did not finish within {0:?}")]
    TimedOut(Duration),

    #[error("forecast worker failed: {0}")]
    Worker(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ForecastError {
    pub fn data_unavailable(symbol: &str, reason: impl Into<String>) -> Self {
        ForecastError::DataUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

/// Pipeline step a forecast was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Configure,
    FetchHistory,
    Split,
    FitScaler,
    BuildWindows,
    Train,
    Validate,
    PredictForward,
    Waiting,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Configure => "validating the configuration",
            Stage::FetchHistory => "fetching price history",
            Stage::Split => "splitting training and validation data",
            Stage::FitScaler => "fitting the price scaler",
            Stage::BuildWindows => "building training windows",
            Stage::Train => "training the model",
            Stage::Validate => "predicting the validation partition",
            Stage::PredictForward => "predicting the next session",
            Stage::Waiting => "waiting for the forecast worker",
        };
        f.write_str(name)
    }
}

/// A failed forecast request, with the context needed for a user-facing message.
#[derive(Error, Debug)]
#[error("forecast for {symbol} through {end_date} failed while {stage}: {source}")]
pub struct ForecastFailure {
    pub symbol: String,
    pub end_date: NaiveDate,
    pub stage: Stage,
    #[source]
    pub source: ForecastError,
}

impl ForecastFailure {
    pub fn new(symbol: &str, end_date: NaiveDate, stage: Stage, source: ForecastError) -> Self {
        ForecastFailure {
            symbol: symbol.to_string(),
            end_date,
            stage,
            source,
        }
    }

    pub fn error(&self) -> &ForecastError {
        &self.source
    }
}

pub type Result<T, E = ForecastError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_names_symbol_date_and_stage() {
        let failure = ForecastFailure::new(
            "ZZZZ",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Stage::FetchHistory,
            ForecastError::data_unavailable("ZZZZ", "symbol not found"),
        );

        let message = failure.to_string();
        assert!(message.contains("ZZZZ"));
        assert!(message.contains("2024-03-01"));
        assert!(message.contains("fetching price history"));
        assert!(matches!(failure.error(), ForecastError::DataUnavailable { .. }));
    }

    #[test]
    fn test_failure_exposes_source() {
        use std::error::Error;

        let failure = ForecastFailure::new(
            "FLAT",
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            Stage::FitScaler,
            ForecastError::DegenerateSeries { value: 100.0 },
        );
        assert!(failure.source().is_some());
    }
}

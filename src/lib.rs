//! # Stockify
//!
//! Next-session closing price forecasts from a stacked LSTM trained on a
//! symbol's daily history, plus the quote lookups a trading front end needs.
//!
//! ## Core Components
//!
//! - **Market data**: the [`MarketDataClient`] seam, a Yahoo chart API client and an in-memory source
//! - **Preprocessing**: min-max scaling fitted on training data only, and lazy sliding windows
//! - **Model**: two LSTM layers, a dense layer and a scalar head, trained with BPTT and Adam
//! - **Orchestration**: [`Forecaster`] runs the whole pipeline, [`ForecastService`] adds timeouts and caching
//! - **Charts**: actual against predicted validation closes as an SVG
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use stockify::{ForecastConfig, Forecaster, ModelConfig, PriceSeries, StaticMarketData};
//!
//! let start = NaiveDate::from_ymd_opt(2012, 1, 1).unwrap();
//! let closes: Vec<f64> = (0..120).map(|i| 100.0 + (i as f64 * 0.2).sin()).collect();
//! let market = StaticMarketData::new().with_series("DEMO", PriceSeries::from_closes(start, &closes).unwrap());
//!
//! let config = ForecastConfig {
//!     model: ModelConfig { lookback: 10, hidden_size: 8, dense_size: 4, seed: Some(1), ..ModelConfig::default() },
//!     ..ForecastConfig::default()
//! };
//! let forecaster = Forecaster::new(market, config);
//!
//! let result = forecaster.forecast("DEMO", NaiveDate::from_ymd_opt(2012, 4, 29).unwrap()).unwrap();
//! assert_eq!(result.validation.len(), 24);
//! println!("{} on {}: {:.2}", result.symbol, result.prediction.date, result.prediction.value);
//! ```

pub mod utils;
pub mod error;
pub mod config;
pub mod series;
pub mod scaler;
pub mod windowing;
pub mod layers;
pub mod models;
pub mod loss;
pub mod optimizers;
pub mod training;
pub mod market_data;
pub mod forecast;
pub mod chart;
pub mod service;

// Re-export commonly used items
pub use chart::{Chart, ChartRenderer};
pub use config::{ConfigError, ForecastConfig, MarketDataConfig, ServiceConfig};
pub use error::{ForecastError, ForecastFailure, Stage};
pub use forecast::{ForecastResult, Forecaster, Prediction, ValidationSeries};
pub use market_data::{MarketDataClient, SessionQuote, StaticMarketData, YahooClient};
pub use models::forecast_model::{ForecastModel, FrozenModel, ModelConfig};
pub use optimizers::{Adam, OptimizerConfig, RMSprop, SGD};
pub use scaler::{MinMaxScaler, ScalingParameters};
pub use series::{PricePoint, PriceSeries, TrainValidationSplit};
pub use service::ForecastService;
pub use training::{TrainingConfig, TrainingReport};
pub use windowing::{final_window, windows, Window};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_library_integration() {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        let closes: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        let series = PriceSeries::from_closes(start, &closes).unwrap();

        let split = TrainValidationSplit::for_lookback(series.len(), 0.8, 5).unwrap();
        let scaling = MinMaxScaler::fit(split.training(series.closes())).unwrap();
        let scaled = scaling.transform_series(series.closes());

        assert_eq!(split.index(), 24);
        assert_eq!(windows(split.training(&scaled), 5).unwrap().len(), 19);
        assert_eq!(final_window(&scaled, 5).unwrap().len(), 5);
    }
}

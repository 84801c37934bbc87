//! End-to-end forecast for one symbol and end date.

use chrono::{Duration, NaiveDate};
use log::{debug, info};
use serde::Serialize;

use crate::config::ForecastConfig;
use crate::error::{ForecastError, ForecastFailure, Result, Stage};
use crate::market_data::MarketDataClient;
use crate::models::forecast_model::ForecastModel;
use crate::scaler::{MinMaxScaler, ScalingParameters};
use crate::series::{PriceSeries, TrainValidationSplit};
use crate::training::TrainingReport;
use crate::windowing::{final_window, windows, Window};

/// Actual and predicted closes over the validation partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationSeries {
    pub dates: Vec<NaiveDate>,
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

impl ValidationSeries {
    pub fn len(&self) -> usize {
        self.actual.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actual.is_empty()
    }

    /// Root mean squared error in price units.
    pub fn rmse(&self) -> Option<f64> {
        self.mean_of(|error| error * error).map(f64::sqrt)
    }

    /// Mean absolute error in price units.
    pub fn mae(&self) -> Option<f64> {
        self.mean_of(f64::abs)
    }

    fn mean_of<F: Fn(f64) -> f64>(&self, f: F) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let total: f64 = self
            .actual
            .iter()
            .zip(&self.predicted)
            .map(|(actual, predicted)| f(predicted - actual))
            .sum();
        Some(total / self.len() as f64)
    }
}

/// The next-session price estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResult {
    pub symbol: String,
    pub end_date: NaiveDate,
    pub scaling: ScalingParameters,
    pub validation: ValidationSeries,
    pub prediction: Prediction,
    pub training: TrainingReport,
}

/// Runs the fetch, scale, train and predict pipeline against a market data source.
///
/// Every request trains its own model; nothing is shared between calls.
pub struct Forecaster<C> {
    client: C,
    config: ForecastConfig,
}

impl<C: MarketDataClient> Forecaster<C> {
    pub fn new(client: C, config: ForecastConfig) -> Self {
        Forecaster { client, config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetches the history from `config.history_start` through `end_date` and forecasts.
    pub fn forecast(&self, symbol: &str, end_date: NaiveDate) -> Result<ForecastResult, ForecastFailure> {
        let fail = move |stage: Stage| move |err: ForecastError| ForecastFailure::new(symbol, end_date, stage, err);

        self.config.validate().map_err(fail(Stage::Configure))?;
        info!("Forecasting {} through {}", symbol, end_date);
        let history = self
            .client
            .daily_closes(symbol, self.config.history_start, end_date)
            .map_err(fail(Stage::FetchHistory))?;

        self.forecast_series(symbol, end_date, &history)
    }

    /// Forecasts from an already fetched history.
    pub fn forecast_series(
        &self,
        symbol: &str,
        end_date: NaiveDate,
        history: &PriceSeries,
    ) -> Result<ForecastResult, ForecastFailure> {
        let fail = move |stage: Stage| move |err: ForecastError| ForecastFailure::new(symbol, end_date, stage, err);

        self.config.validate().map_err(fail(Stage::Configure))?;
        let lookback = self.config.model.lookback;
        let closes = history.closes();

        let split = TrainValidationSplit::for_lookback(closes.len(), self.config.train_fraction, lookback)
            .map_err(fail(Stage::Split))?;
        info!(
            "{}: {} closes, {} for training, {} for validation",
            symbol,
            closes.len(),
            split.training_len(),
            split.validation_len()
        );

        let scaling = MinMaxScaler::fit(split.training(closes)).map_err(fail(Stage::FitScaler))?;
        debug!("{}: scaling range [{}, {}]", symbol, scaling.min, scaling.max);
        let scaled = scaling.transform_series(closes);

        let train_windows: Vec<Window> = windows(split.training(&scaled), lookback)
            .map_err(fail(Stage::BuildWindows))?
            .collect();

        let mut model = ForecastModel::new(self.config.model.clone()).map_err(fail(Stage::Train))?;
        info!(
            "{}: training {} parameters on {} windows",
            symbol,
            model.num_parameters(),
            train_windows.len()
        );
        let training = model
            .fit(&train_windows, &self.config.training)
            .map_err(fail(Stage::Train))?;
        let model = model.freeze();

        let context = split
            .validation_with_context(&scaled, lookback)
            .map_err(fail(Stage::Validate))?;
        let validation_inputs = windows(context, lookback).map_err(fail(Stage::Validate))?;
        let predicted = model
            .predict(validation_inputs.map(|window| window.input))
            .map_err(fail(Stage::Validate))?;

        let validation = ValidationSeries {
            dates: split.validation(history.dates()).to_vec(),
            actual: split.validation(closes).to_vec(),
            predicted: scaling.inverse_series(&predicted),
        };
        info!(
            "{}: validation RMSE {:.4} over {} sessions",
            symbol,
            validation.rmse().unwrap_or(f64::NAN),
            validation.len()
        );

        let last = final_window(&scaled, lookback).map_err(fail(Stage::PredictForward))?;
        let next = model.predict_one(last).map_err(fail(Stage::PredictForward))?;
        let prediction = Prediction {
            date: end_date + Duration::days(1),
            value: scaling.inverse(next),
        };
        info!("{}: predicted close {:.4} for {}", symbol, prediction.value, prediction.date);

        Ok(ForecastResult {
            symbol: symbol.to_string(),
            end_date,
            scaling,
            validation,
            prediction,
            training,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::StaticMarketData;
    use crate::models::forecast_model::ModelConfig;
    use crate::training::TrainingConfig;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn small_config() -> ForecastConfig {
        ForecastConfig {
            model: ModelConfig {
                lookback: 5,
                hidden_size: 4,
                num_layers: 1,
                dense_size: 3,
                seed: Some(3),
                ..ModelConfig::default()
            },
            training: TrainingConfig {
                epochs: 2,
                batch_size: 4,
                ..TrainingConfig::default()
            },
            ..ForecastConfig::default()
        }
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n).map(|i| 50.0 + 5.0 * (i as f64 * 0.3).sin() + 0.05 * i as f64).collect()
    }

    #[test]
    fn test_validation_metrics() {
        let validation = ValidationSeries {
            dates: vec![date(2024, 1, 2), date(2024, 1, 3)],
            actual: vec![10.0, 20.0],
            predicted: vec![13.0, 16.0],
        };
        assert!((validation.mae().unwrap() - 3.5).abs() < 1e-12);
        assert!((validation.rmse().unwrap() - 12.5f64.sqrt()).abs() < 1e-12);

        let empty = ValidationSeries { dates: vec![], actual: vec![], predicted: vec![] };
        assert!(empty.rmse().is_none());
    }

    #[test]
    fn test_forecast_series_shapes() {
        let start = date(2012, 1, 1);
        let history = PriceSeries::from_closes(start, &wave(50)).unwrap();
        let end = history.last_date().unwrap();
        let forecaster = Forecaster::new(StaticMarketData::new(), small_config());

        let result = forecaster.forecast_series("WAVE", end, &history).unwrap();

        assert_eq!(result.validation.len(), 10);
        assert_eq!(result.validation.predicted.len(), 10);
        assert_eq!(result.validation.dates[0], history.dates()[40]);
        assert_eq!(result.validation.actual, history.closes()[40..].to_vec());
        assert_eq!(result.prediction.date, end + Duration::days(1));
        assert!(result.prediction.value.is_finite());
        assert_eq!(result.training.samples, 35);
    }

    #[test]
    fn test_invalid_config_reports_configure_stage() {
        let mut config = small_config();
        config.training.batch_size = 0;
        let history = PriceSeries::from_closes(date(2012, 1, 1), &wave(50)).unwrap();
        let forecaster = Forecaster::new(StaticMarketData::new(), config);

        let failure = forecaster
            .forecast_series("WAVE", history.last_date().unwrap(), &history)
            .unwrap_err();
        assert_eq!(failure.stage, Stage::Configure);
        assert!(matches!(failure.error(), ForecastError::InvalidConfig(_)));
        assert!(failure.to_string().contains("validating the configuration"));
    }

    #[test]
    fn test_fetch_failure_reports_stage() {
        let forecaster = Forecaster::new(StaticMarketData::new(), small_config());
        let failure = forecaster.forecast("NOPE", date(2024, 1, 1)).unwrap_err();

        assert_eq!(failure.stage, Stage::FetchHistory);
        assert_eq!(failure.symbol, "NOPE");
        assert!(matches!(failure.error(), ForecastError::DataUnavailable { .. }));
    }

    #[test]
    fn test_flat_training_partition_fails_at_scaler() {
        let mut closes = vec![42.0; 40];
        closes.extend(wave(10));
        let history = PriceSeries::from_closes(date(2020, 1, 1), &closes).unwrap();
        let forecaster = Forecaster::new(StaticMarketData::new(), small_config());

        let failure = forecaster
            .forecast_series("FLAT", history.last_date().unwrap(), &history)
            .unwrap_err();
        assert_eq!(failure.stage, Stage::FitScaler);
        assert!(matches!(failure.error(), ForecastError::DegenerateSeries { .. }));
    }
}

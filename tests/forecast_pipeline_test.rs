use chrono::{Duration, NaiveDate};
use serde_json::json;
use stockify::market_data::yahoo::{closes_from_rows, parse_chart_response};
use stockify::{
    ChartRenderer, ForecastConfig, ForecastError, Forecaster, ModelConfig, PriceSeries, Stage,
    StaticMarketData, TrainingConfig,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn small_config(lookback: usize) -> ForecastConfig {
    ForecastConfig {
        model: ModelConfig {
            lookback,
            hidden_size: 4,
            num_layers: 2,
            dense_size: 3,
            seed: Some(42),
            ..ModelConfig::default()
        },
        training: TrainingConfig::default(),
        ..ForecastConfig::default()
    }
}

fn rising_series(n: usize) -> PriceSeries {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 + 0.1 * i as f64).collect();
    PriceSeries::from_closes(date(2012, 1, 1), &closes).unwrap()
}

#[test]
fn test_rising_series_end_to_end() {
    let series = rising_series(500);
    let end = series.last_date().unwrap();
    let market = StaticMarketData::new().with_series("RISE", series);
    let forecaster = Forecaster::new(market, small_config(60));

    let result = forecaster.forecast("RISE", end).unwrap();

    assert_eq!(result.symbol, "RISE");
    assert_eq!(result.validation.len(), 100);
    assert_eq!(result.validation.predicted.len(), 100);
    assert_eq!(result.training.samples, 340);
    assert!((result.validation.actual[0] - 140.0).abs() < 1e-9);
    for value in &result.validation.predicted {
        assert!((50.0..=200.0).contains(value), "prediction {} out of range", value);
    }
    assert!((50.0..=200.0).contains(&result.prediction.value));
    assert_eq!(result.prediction.date, end + Duration::days(1));

    // Scaling comes from the 400 training closes only
    assert!((result.scaling.min - 100.0).abs() < 1e-9);
    assert!((result.scaling.max - 139.9).abs() < 1e-9);
}

#[test]
fn test_seeded_forecasts_are_reproducible() {
    let series = rising_series(150);
    let end = series.last_date().unwrap();
    let market = StaticMarketData::new().with_series("RISE", series);
    let forecaster = Forecaster::new(market, small_config(20));

    let first = forecaster.forecast("RISE", end).unwrap();
    let second = forecaster.forecast("RISE", end).unwrap();

    assert_eq!(first.validation, second.validation);
    assert_eq!(first.prediction, second.prediction);
    assert_eq!(first.training.final_loss, second.training.final_loss);
}

#[test]
fn test_training_ignores_validation_partition() {
    let mut closes: Vec<f64> = (0..150).map(|i| 100.0 + 0.1 * i as f64).collect();
    let first = PriceSeries::from_closes(date(2012, 1, 1), &closes).unwrap();
    for close in closes.iter_mut().skip(120) {
        *close *= 3.0;
    }
    let second = PriceSeries::from_closes(date(2012, 1, 1), &closes).unwrap();
    let end = first.last_date().unwrap();
    let forecaster = Forecaster::new(StaticMarketData::new(), small_config(20));

    let a = forecaster.forecast_series("A", end, &first).unwrap();
    let b = forecaster.forecast_series("B", end, &second).unwrap();

    assert_eq!(a.scaling.min.to_bits(), b.scaling.min.to_bits());
    assert_eq!(a.scaling.max.to_bits(), b.scaling.max.to_bits());
    assert_eq!(a.training.final_loss.to_bits(), b.training.final_loss.to_bits());
}

#[test]
fn test_constant_series_is_degenerate() {
    let series = PriceSeries::from_closes(date(2012, 1, 1), &[25.0; 120]).unwrap();
    let end = series.last_date().unwrap();
    let forecaster = Forecaster::new(StaticMarketData::new().with_series("FLAT", series), small_config(20));

    let failure = forecaster.forecast("FLAT", end).unwrap_err();
    assert_eq!(failure.stage, Stage::FitScaler);
    assert!(matches!(failure.error(), ForecastError::DegenerateSeries { value } if *value == 25.0));
}

#[test]
fn test_unknown_ticker_is_unavailable() {
    let forecaster = Forecaster::new(StaticMarketData::new(), small_config(20));

    let failure = forecaster.forecast("NOTATICKER123", date(2024, 1, 2)).unwrap_err();
    assert_eq!(failure.stage, Stage::FetchHistory);
    assert!(matches!(failure.error(), ForecastError::DataUnavailable { .. }));
    assert!(failure.to_string().contains("NOTATICKER123"));
}

#[test]
fn test_short_history_is_insufficient() {
    let series = rising_series(50);
    let end = series.last_date().unwrap();
    let forecaster = Forecaster::new(StaticMarketData::new().with_series("NEW", series), small_config(60));

    let failure = forecaster.forecast("NEW", end).unwrap_err();
    assert_eq!(failure.stage, Stage::Split);
    assert!(matches!(failure.error(), ForecastError::InsufficientHistory { .. }));
}

#[test]
fn test_end_date_limits_history() {
    let series = rising_series(300);
    let market = StaticMarketData::new().with_series("RISE", series);
    let forecaster = Forecaster::new(market, small_config(20));

    // 2012-01-01 plus 99 days
    let result = forecaster.forecast("RISE", date(2012, 4, 9)).unwrap();
    assert_eq!(result.validation.len(), 20);
    assert_eq!(*result.validation.dates.last().unwrap(), date(2012, 4, 9));
}

#[test]
fn test_forecast_from_chart_payload() {
    let start = 1_704_205_800i64;
    let timestamps: Vec<i64> = (0..90).map(|i| start + i * 86_400).collect();
    let closes: Vec<f64> = (0..90).map(|i| 180.0 + (i as f64 * 0.4).sin() * 4.0).collect();
    let body = json!({
        "chart": {
            "result": [{
                "meta": {"symbol": "AAPL", "gmtoffset": -18000},
                "timestamp": timestamps,
                "indicators": {"quote": [{"close": closes}]}
            }],
            "error": null
        }
    })
    .to_string();

    let rows = parse_chart_response("AAPL", &body).unwrap();
    let history = closes_from_rows("AAPL", &rows).unwrap();
    assert_eq!(history.len(), 90);

    let forecaster = Forecaster::new(StaticMarketData::new(), small_config(15));
    let result = forecaster
        .forecast_series("AAPL", history.last_date().unwrap(), &history)
        .unwrap();
    assert_eq!(result.validation.len(), 18);

    let chart = ChartRenderer::new("AAPL").render(&result.validation).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aapl.svg");
    chart.save(&path).unwrap();
    assert!(std::fs::read_to_string(&path).unwrap().contains("<svg"));
}

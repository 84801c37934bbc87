use chrono::NaiveDate;
use stockify::{final_window, windows, ForecastError, MinMaxScaler, PriceSeries, TrainValidationSplit};

fn wave(n: usize) -> Vec<f64> {
    (0..n).map(|i| 30.0 + (i as f64 * 0.7).sin() * 10.0 + i as f64 * 0.01).collect()
}

#[test]
fn test_scaling_round_trip() {
    let closes = wave(200);
    let params = MinMaxScaler::fit(&closes).unwrap();

    for &value in &closes {
        let scaled = params.transform(value);
        assert!((0.0..=1.0).contains(&scaled));
        assert!((params.inverse(scaled) - value).abs() < 1e-9);
    }
}

#[test]
fn test_window_counts_and_targets() {
    let series = wave(40);
    for lookback in [1, 5, 39] {
        let all: Vec<_> = windows(&series, lookback).unwrap().collect();
        assert_eq!(all.len(), series.len() - lookback);
        for (start, window) in all.iter().enumerate() {
            assert_eq!(window.input, &series[start..start + lookback]);
            assert_eq!(window.target, series[start + lookback]);
        }
    }

    for lookback in [40, 41] {
        assert!(matches!(
            windows(&series, lookback),
            Err(ForecastError::InsufficientHistory { .. })
        ));
    }
}

#[test]
fn test_final_window_is_series_tail() {
    let series = wave(70);
    assert_eq!(final_window(&series, 60).unwrap(), &series[10..]);
    assert!(final_window(&series[..59], 60).is_err());
}

#[test]
fn test_training_fit_ignores_validation_values() {
    let mut closes = wave(100);
    let split = TrainValidationSplit::at_fraction(closes.len(), 0.8).unwrap();
    let before = MinMaxScaler::fit(split.training(&closes)).unwrap();

    for close in closes.iter_mut().skip(split.index()) {
        *close = 1_000.0;
    }
    let after = MinMaxScaler::fit(split.training(&closes)).unwrap();

    assert_eq!(split.index(), 80);
    assert_eq!(before.min.to_bits(), after.min.to_bits());
    assert_eq!(before.max.to_bits(), after.max.to_bits());
}

#[test]
fn test_validation_context_covers_lookback() {
    let closes = wave(100);
    let split = TrainValidationSplit::for_lookback(closes.len(), 0.8, 60).unwrap();
    let context = split.validation_with_context(&closes, 60).unwrap();

    assert_eq!(context.len(), 80);
    assert_eq!(windows(context, 60).unwrap().len(), split.validation_len());
}

#[test]
fn test_constant_prices_cannot_be_scaled() {
    let series = PriceSeries::from_closes(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(), &[7.5; 30]).unwrap();
    assert!(matches!(
        MinMaxScaler::fit(series.closes()),
        Err(ForecastError::DegenerateSeries { .. })
    ));
}

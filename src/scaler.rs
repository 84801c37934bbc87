//! Min-max scaling of prices into `[0, 1]`.

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Observed `(min, max)` of the fitted data.
///
/// Values outside the fitted range map outside `[0, 1]`; that is expected for
/// validation data scaled with training statistics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingParameters {
    pub min: f64,
    pub max: f64,
}

impl ScalingParameters {
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    pub fn transform(&self, value: f64) -> f64 {
        (value - self.min) / self.range()
    }

    pub fn transform_series(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|&v| self.transform(v)).collect()
    }

    pub fn inverse(&self, scaled: f64) -> f64 {
        scaled * self.range() + self.min
    }

    pub fn inverse_series(&self, scaled: &[f64]) -> Vec<f64> {
        scaled.iter().map(|&v| self.inverse(v)).collect()
    }
}

/// Fits [`ScalingParameters`]. Fitting is the only way to obtain them, so
/// transforming never refits.
pub struct MinMaxScaler;

impl MinMaxScaler {
    pub fn fit(values: &[f64]) -> Result<ScalingParameters> {
        if values.is_empty() {
            return Err(ForecastError::InsufficientHistory { required: 1, available: 0 });
        }

        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() {
                return Err(ForecastError::NonFinite { index });
            }
            min = min.min(value);
            max = max.max(value);
        }

        if max - min <= 0.0 {
            return Err(ForecastError::DegenerateSeries { value: min });
        }

        Ok(ScalingParameters { min, max })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_maps_into_unit_range() {
        let params = MinMaxScaler::fit(&[10.0, 20.0, 15.0, 30.0]).unwrap();
        assert_eq!(params.min, 10.0);
        assert_eq!(params.max, 30.0);

        let scaled = params.transform_series(&[10.0, 20.0, 30.0]);
        assert_eq!(scaled, vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_round_trip() {
        let values = [101.37, 99.2, 140.05, 120.5, 133.333];
        let params = MinMaxScaler::fit(&values).unwrap();
        for &v in &values {
            assert!((params.inverse(params.transform(v)) - v).abs() < 1e-9);
        }
    }

    #[test]
    fn test_constant_series_is_degenerate() {
        let err = MinMaxScaler::fit(&[100.0; 50]).unwrap_err();
        assert!(matches!(err, ForecastError::DegenerateSeries { value } if value == 100.0));
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let err = MinMaxScaler::fit(&[1.0, f64::INFINITY, 2.0]).unwrap_err();
        assert!(matches!(err, ForecastError::NonFinite { index: 1 }));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        assert!(MinMaxScaler::fit(&[]).is_err());
    }
}

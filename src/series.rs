//! Price series and the train/validation split.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// One daily close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Daily closing prices in strictly ascending date order.
///
/// Dates and closes are kept column-wise so the pipeline can slice the
/// closes directly without copying.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    closes: Vec<f64>,
}

impl PriceSeries {
    /// Builds a series, rejecting unordered or duplicate dates and
    /// non-finite or non-positive closes.
    pub fn new(points: Vec<PricePoint>) -> Result<Self> {
        let mut dates = Vec::with_capacity(points.len());
        let mut closes = Vec::with_capacity(points.len());

        for (index, point) in points.into_iter().enumerate() {
            if !point.close.is_finite() {
                return Err(ForecastError::NonFinite { index });
            }
            if point.close <= 0.0 {
                return Err(ForecastError::InvalidSeries(format!(
                    "close {} on {} is not positive",
                    point.close, point.date
                )));
            }
            if let Some(&previous) = dates.last() {
                if point.date <= previous {
                    return Err(ForecastError::InvalidSeries(format!(
                        "{} does not follow {}",
                        point.date, previous
                    )));
                }
            }
            dates.push(point.date);
            closes.push(point.close);
        }

        Ok(PriceSeries { dates, closes })
    }

    /// Series on consecutive calendar days starting at `start`.
    pub fn from_closes(start: NaiveDate, closes: &[f64]) -> Result<Self> {
        let points = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| PricePoint {
                date: start + Duration::days(i as i64),
                close,
            })
            .collect();
        PriceSeries::new(points)
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn points(&self) -> impl Iterator<Item = PricePoint> + '_ {
        self.dates
            .iter()
            .zip(&self.closes)
            .map(|(&date, &close)| PricePoint { date, close })
    }

    /// Sub-series with dates in `[start, end]`.
    pub fn between(&self, start: NaiveDate, end: NaiveDate) -> PriceSeries {
        let from = self.dates.partition_point(|d| *d < start);
        let to = self.dates.partition_point(|d| *d <= end).max(from);
        PriceSeries {
            dates: self.dates[from..to].to_vec(),
            closes: self.closes[from..to].to_vec(),
        }
    }
}

/// Split of a series of `len` rows at `ceil(fraction * len)`.
///
/// The split only records the boundary; the accessors slice any column
/// (dates, raw closes, scaled closes) the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainValidationSplit {
    index: usize,
    len: usize,
}

impl TrainValidationSplit {
    pub fn at_fraction(len: usize, fraction: f64) -> Result<Self> {
        if !(fraction > 0.0 && fraction < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "train fraction {} must lie in (0, 1)",
                fraction
            )));
        }
        let index = ((len as f64) * fraction).ceil() as usize;
        Ok(TrainValidationSplit {
            index: index.min(len),
            len,
        })
    }

    /// Like `at_fraction`, but also requires more than `lookback` training
    /// rows and at least one validation row.
    pub fn for_lookback(len: usize, fraction: f64, lookback: usize) -> Result<Self> {
        let split = Self::at_fraction(len, fraction)?;
        if split.index <= lookback {
            return Err(ForecastError::InsufficientHistory {
                required: lookback + 1,
                available: split.index,
            });
        }
        if split.index == len {
            return Err(ForecastError::InsufficientHistory {
                required: len + 1,
                available: len,
            });
        }
        Ok(split)
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn training_len(&self) -> usize {
        self.index
    }

    pub fn validation_len(&self) -> usize {
        self.len - self.index
    }

    pub fn training<'a, T>(&self, values: &'a [T]) -> &'a [T] {
        &values[..self.index]
    }

    pub fn validation<'a, T>(&self, values: &'a [T]) -> &'a [T] {
        &values[self.index..]
    }

    /// Validation suffix with the last `lookback` training rows prepended,
    /// so every validation row has a full lookback window.
    pub fn validation_with_context<'a, T>(&self, values: &'a [T], lookback: usize) -> Result<&'a [T]> {
        if self.index < lookback {
            return Err(ForecastError::InsufficientHistory {
                required: lookback,
                available: self.index,
            });
        }
        Ok(&values[self.index - lookback..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_series_rejects_unordered_dates() {
        let points = vec![
            PricePoint { date: day(2), close: 10.0 },
            PricePoint { date: day(1), close: 11.0 },
        ];
        assert!(matches!(PriceSeries::new(points), Err(ForecastError::InvalidSeries(_))));
    }

    #[test]
    fn test_series_rejects_duplicate_dates() {
        let points = vec![
            PricePoint { date: day(1), close: 10.0 },
            PricePoint { date: day(1), close: 11.0 },
        ];
        assert!(PriceSeries::new(points).is_err());
    }

    #[test]
    fn test_series_rejects_non_finite_close() {
        let points = vec![
            PricePoint { date: day(1), close: 10.0 },
            PricePoint { date: day(2), close: f64::NAN },
        ];
        assert!(matches!(
            PriceSeries::new(points),
            Err(ForecastError::NonFinite { index: 1 })
        ));
    }

    #[test]
    fn test_between_is_inclusive() {
        let series = PriceSeries::from_closes(day(1), &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        let sub = series.between(day(2), day(4));
        assert_eq!(sub.closes(), &[2.0, 3.0, 4.0]);
        assert_eq!(sub.first_date(), Some(day(2)));
        assert_eq!(sub.last_date(), Some(day(4)));

        assert!(series.between(day(20), day(25)).is_empty());
    }

    #[test]
    fn test_split_at_eighty_percent() {
        let split = TrainValidationSplit::at_fraction(500, 0.8).unwrap();
        assert_eq!(split.index(), 400);
        assert_eq!(split.validation_len(), 100);

        // ceil rounds a partial row into training
        let split = TrainValidationSplit::at_fraction(101, 0.8).unwrap();
        assert_eq!(split.index(), 81);
    }

    #[test]
    fn test_validation_context_prepends_lookback_rows() {
        let values: Vec<usize> = (0..20).collect();
        let split = TrainValidationSplit::at_fraction(values.len(), 0.8).unwrap();
        let context = split.validation_with_context(&values, 5).unwrap();
        assert_eq!(context.len(), 5 + split.validation_len());
        assert_eq!(context[0], 11);
        assert_eq!(split.validation(&values)[0], 16);
    }

    #[test]
    fn test_for_lookback_requires_enough_training_rows() {
        let err = TrainValidationSplit::for_lookback(70, 0.8, 60).unwrap_err();
        assert!(matches!(
            err,
            ForecastError::InsufficientHistory { required: 61, available: 56 }
        ));
        assert!(TrainValidationSplit::for_lookback(100, 0.8, 60).is_ok());
    }

    #[test]
    fn test_fraction_out_of_range() {
        assert!(TrainValidationSplit::at_fraction(10, 1.0).is_err());
        assert!(TrainValidationSplit::at_fraction(10, 0.0).is_err());
    }
}

//! Sliding lookback windows over a scaled series.

use crate::error::{ForecastError, Result};

/// `lookback` consecutive values and the value that follows them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
    pub input: &'a [f64],
    pub target: f64,
}

/// Lazy iterator over the windows of a series, one per index in `lookback..len`.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    series: &'a [f64],
    lookback: usize,
    next: usize,
}

impl<'a> Iterator for Windows<'a> {
    type Item = Window<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let i = self.next;
        if i >= self.series.len() {
            return None;
        }
        self.next += 1;
        Some(Window {
            input: &self.series[i - self.lookback..i],
            target: self.series[i],
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.series.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

/// Windows of length `lookback` over `series`.
///
/// Needs at least `lookback + 1` values to form one window.
pub fn windows(series: &[f64], lookback: usize) -> Result<Windows<'_>> {
    check_lookback(lookback)?;
    if series.len() <= lookback {
        return Err(ForecastError::InsufficientHistory {
            required: lookback + 1,
            available: series.len(),
        });
    }
    Ok(Windows { series, lookback, next: lookback })
}

/// The last `lookback` values, the input for a forward prediction.
pub fn final_window(series: &[f64], lookback: usize) -> Result<&[f64]> {
    check_lookback(lookback)?;
    if series.len() < lookback {
        return Err(ForecastError::InsufficientHistory {
            required: lookback,
            available: series.len(),
        });
    }
    Ok(&series[series.len() - lookback..])
}

fn check_lookback(lookback: usize) -> Result<()> {
    if lookback == 0 {
        return Err(ForecastError::InvalidConfig("lookback must be positive".to_string()));
    }
    Ok(())
}

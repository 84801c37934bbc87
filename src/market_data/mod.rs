//! Price history and latest-session quotes for ticker symbols.
//!
//! [`MarketDataClient`] is the only network-facing seam of the crate.
//! [`yahoo::YahooClient`] talks to the Yahoo chart API; [`StaticMarketData`]
//! serves fixed data for tests and offline runs.

pub mod yahoo;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::error::{ForecastError, Result};
use crate::series::PriceSeries;
use crate::utils::round_to;

pub use yahoo::YahooClient;

/// First date of the history a forecast trains on.
pub fn default_history_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2012, 1, 1).unwrap_or_default()
}

/// One trading session of a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionQuote {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl SessionQuote {
    /// Prices rounded for display.
    pub fn rounded(&self, places: u32) -> SessionQuote {
        SessionQuote {
            open: round_to(self.open, places),
            high: round_to(self.high, places),
            low: round_to(self.low, places),
            close: round_to(self.close, places),
            ..*self
        }
    }
}

/// Source of daily prices.
pub trait MarketDataClient {
    /// Daily closes with dates in `[start, end]`, ascending.
    ///
    /// Fails with `DataUnavailable` for unknown symbols or empty ranges.
    fn daily_closes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries>;

    /// The most recent trading session.
    fn latest_session(&self, symbol: &str) -> Result<SessionQuote>;

    /// Full history from 2012-01-01 through `end`.
    fn history(&self, symbol: &str, end: NaiveDate) -> Result<PriceSeries> {
        self.daily_closes(symbol, default_history_start(), end)
    }

    /// Unit price for live buy/sell orders: the latest session's open.
    fn latest_open(&self, symbol: &str) -> Result<f64> {
        Ok(round_to(self.latest_session(symbol)?.open, 5))
    }

    /// Quote table for several symbols, keyed by symbol.
    fn latest_sessions(&self, symbols: &[&str]) -> Result<BTreeMap<String, SessionQuote>> {
        symbols
            .iter()
            .map(|&symbol| Ok((symbol.to_string(), self.latest_session(symbol)?)))
            .collect()
    }
}

impl<C: MarketDataClient + ?Sized> MarketDataClient for &C {
    fn daily_closes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        (**self).daily_closes(symbol, start, end)
    }

    fn latest_session(&self, symbol: &str) -> Result<SessionQuote> {
        (**self).latest_session(symbol)
    }
}

/// In-memory market data keyed by upper-case symbol.
#[derive(Debug, Clone, Default)]
pub struct StaticMarketData {
    series: HashMap<String, PriceSeries>,
    sessions: HashMap<String, SessionQuote>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, series: PriceSeries) -> Self {
        self.series.insert(symbol.to_uppercase(), series);
        self
    }

    pub fn with_session(mut self, symbol: &str, session: SessionQuote) -> Self {
        self.sessions.insert(symbol.to_uppercase(), session);
        self
    }
}

impl MarketDataClient for StaticMarketData {
    fn daily_closes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        let series = self
            .series
            .get(&symbol.to_uppercase())
            .ok_or_else(|| ForecastError::data_unavailable(symbol, "unknown symbol"))?;

        let range = series.between(start, end);
        if range.is_empty() {
            return Err(ForecastError::data_unavailable(
                symbol,
                format!("no rows between {} and {}", start, end),
            ));
        }
        Ok(range)
    }

    fn latest_session(&self, symbol: &str) -> Result<SessionQuote> {
        self.sessions
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| ForecastError::data_unavailable(symbol, "no recent session"))
    }
}

//! Runtime configuration.
//!
//! Values come from the built-in defaults, then an optional JSON file, then
//! `STOCKIFY_*` environment variables.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::{ForecastError, Result};
use crate::market_data::default_history_start;
use crate::models::forecast_model::ModelConfig;
use crate::training::TrainingConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("environment variable {name}={value:?} is not valid")]
    Env { name: &'static str, value: String },
}

/// Where price data is fetched from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        MarketDataConfig {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Behaviour of [`crate::service::ForecastService`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Longest a caller waits for a forecast. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Memoise successful forecasts per (symbol, end date).
    pub cache: bool,
    /// Most results kept; the oldest entry is evicted first.
    pub cache_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            timeout_secs: None,
            cache: false,
            cache_capacity: 128,
        }
    }
}

impl ServiceConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub history_start: NaiveDate,
    /// Share of the history used for training.
    pub train_fraction: f64,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub service: ServiceConfig,
    pub market_data: MarketDataConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            history_start: default_history_start(),
            train_fraction: 0.8,
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            service: ServiceConfig::default(),
            market_data: MarketDataConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Reads a JSON file; missing keys keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse { path: display, source })?;
        Ok(config)
    }

    /// Applies `STOCKIFY_*` overrides from the process environment.
    pub fn with_env(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Applies `STOCKIFY_*` overrides read through `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(epochs) = parse_var(&lookup, "STOCKIFY_EPOCHS")? {
            self.training.epochs = epochs;
        }
        if let Some(batch_size) = parse_var(&lookup, "STOCKIFY_BATCH_SIZE")? {
            self.training.batch_size = batch_size;
        }
        if let Some(lookback) = parse_var(&lookup, "STOCKIFY_LOOKBACK")? {
            self.model.lookback = lookback;
        }
        if let Some(seed) = parse_var(&lookup, "STOCKIFY_SEED")? {
            self.model.seed = Some(seed);
        }
        if let Some(timeout) = parse_var(&lookup, "STOCKIFY_TIMEOUT_SECS")? {
            self.service.timeout_secs = Some(timeout);
        }
        if let Some(url) = lookup("STOCKIFY_YAHOO_URL") {
            self.market_data.base_url = url;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(ForecastError::InvalidConfig(format!(
                "train_fraction {} must lie strictly between 0 and 1",
                self.train_fraction
            )));
        }
        if self.market_data.request_timeout_secs == 0 {
            return Err(ForecastError::InvalidConfig("request_timeout_secs must be positive".to_string()));
        }
        if self.service.cache && self.service.cache_capacity == 0 {
            return Err(ForecastError::InvalidConfig("cache_capacity must be positive when caching".to_string()));
        }
        self.model.validate()?;
        self.training.validate()
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(Some(parsed)),
            Err(_) => Err(ConfigError::Env { name, value }.into()),
        },
    }
}

//! Per-request worker isolation with an optional result cache.

use chrono::NaiveDate;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::ServiceConfig;
use crate::error::{ForecastError, ForecastFailure, Stage};
use crate::forecast::{ForecastResult, Forecaster};
use crate::market_data::MarketDataClient;

type CacheKey = (String, NaiveDate);

/// Results keyed by (symbol, end date), evicted in insertion order.
#[derive(Default)]
struct ResultCache {
    entries: HashMap<CacheKey, Arc<ForecastResult>>,
    order: VecDeque<CacheKey>,
}

impl ResultCache {
    fn get(&self, key: &CacheKey) -> Option<Arc<ForecastResult>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, result: Arc<ForecastResult>, capacity: usize) {
        if self.entries.insert(key.clone(), result).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    debug!("Evicting cached forecast for {} through {}", oldest.0, oldest.1);
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Runs each forecast on its own thread.
///
/// Callers wait at most `ServiceConfig::timeout_secs`. A worker that overruns
/// is left to finish in the background; its result is discarded. At most
/// `ServiceConfig::cache_capacity` results are cached.
pub struct ForecastService<C> {
    forecaster: Arc<Forecaster<C>>,
    config: ServiceConfig,
    cache: Mutex<ResultCache>,
}

impl<C> ForecastService<C>
where
    C: MarketDataClient + Send + Sync + 'static,
{
    pub fn new(forecaster: Forecaster<C>) -> Self {
        let config = forecaster.config().service.clone();
        ForecastService {
            forecaster: Arc::new(forecaster),
            config,
            cache: Mutex::new(ResultCache::default()),
        }
    }

    pub fn forecaster(&self) -> &Forecaster<C> {
        &self.forecaster
    }

    pub fn forecast(&self, symbol: &str, end_date: NaiveDate) -> Result<Arc<ForecastResult>, ForecastFailure> {
        let key = (symbol.to_uppercase(), end_date);
        if self.config.cache {
            if let Some(hit) = self.cached(&key) {
                debug!("Cache hit for {} through {}", symbol, end_date);
                return Ok(hit);
            }
        }

        let (tx, rx) = mpsc::channel();
        let forecaster = Arc::clone(&self.forecaster);
        let worker_symbol = symbol.to_string();
        thread::Builder::new()
            .name(format!("forecast-{}", symbol))
            .spawn(move || {
                let outcome = forecaster.forecast(&worker_symbol, end_date);
                // The receiver is gone if the caller timed out.
                let _ = tx.send(outcome);
            })
            .map_err(|e| {
                ForecastFailure::new(
                    symbol,
                    end_date,
                    Stage::Waiting,
                    ForecastError::Worker(format!("cannot spawn thread: {}", e)),
                )
            })?;

        let outcome = match self.config.timeout() {
            Some(timeout) => match rx.recv_timeout(timeout) {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Forecast for {} through {} timed out after {:?}", symbol, end_date, timeout);
                    return Err(ForecastFailure::new(
                        symbol,
                        end_date,
                        Stage::Waiting,
                        ForecastError::TimedOut(timeout),
                    ));
                }
                Err(RecvTimeoutError::Disconnected) => return Err(worker_lost(symbol, end_date)),
            },
            None => rx.recv().map_err(|_| worker_lost(symbol, end_date))?,
        };

        let result = Arc::new(outcome?);
        if self.config.cache {
            self.store(key, Arc::clone(&result));
        }
        info!("Forecast for {} through {} completed", symbol, end_date);
        Ok(result)
    }

    /// Drops every memoised result.
    pub fn clear_cache(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.len()).unwrap_or(0)
    }

    fn cached(&self, key: &CacheKey) -> Option<Arc<ForecastResult>> {
        self.cache.lock().ok()?.get(key)
    }

    fn store(&self, key: CacheKey, result: Arc<ForecastResult>) {
        match self.cache.lock() {
            Ok(mut cache) => {
                cache.insert(key, result, self.config.cache_capacity);
            }
            Err(_) => warn!("Forecast cache is poisoned, result not stored"),
        }
    }
}

fn worker_lost(symbol: &str, end_date: NaiveDate) -> ForecastFailure {
    ForecastFailure::new(
        symbol,
        end_date,
        Stage::Waiting,
        ForecastError::Worker("exited without a result".to_string()),
    )
}

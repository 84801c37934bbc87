//! Yahoo Finance chart API client.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{MarketDataClient, SessionQuote};
use crate::config::MarketDataConfig;
use crate::error::{ForecastError, Result};
use crate::series::{PricePoint, PriceSeries};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Option<Indicators>,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteColumns>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteColumns {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// One row of a chart response, dated in the exchange's local time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartRow {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl ChartRow {
    /// Takes the later bar's values for a date, keeping earlier ones it lacks.
    fn merge_later(&mut self, later: &ChartRow) {
        self.open = later.open.or(self.open);
        self.high = later.high.or(self.high);
        self.low = later.low.or(self.low);
        self.close = later.close.or(self.close);
        self.volume = later.volume.or(self.volume);
    }

    fn session(&self) -> Option<SessionQuote> {
        Some(SessionQuote {
            date: self.date,
            open: self.open?,
            high: self.high?,
            low: self.low?,
            close: self.close?,
            volume: self.volume.unwrap_or(0.0).max(0.0) as u64,
        })
    }
}

fn column(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten().filter(|v| v.is_finite())
}

/// Parses a `/v8/finance/chart` body into rows ordered by date.
///
/// Error payloads and responses without rows map to `DataUnavailable`.
/// Rows sharing a date are merged; later non-null values win.
pub fn parse_chart_response(symbol: &str, body: &str) -> Result<Vec<ChartRow>> {
    let response: ChartResponse = serde_json::from_str(body)
        .map_err(|e| ForecastError::data_unavailable(symbol, format!("malformed chart response: {}", e)))?;

    if let Some(error) = response.chart.error {
        let reason = match error.description {
            Some(description) => format!("{}: {}", error.code, description),
            None => error.code,
        };
        return Err(ForecastError::data_unavailable(symbol, reason));
    }

    let data = response
        .chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| ForecastError::data_unavailable(symbol, "empty chart result"))?;

    let offset = data.meta.and_then(|m| m.gmtoffset).unwrap_or(0);
    let quote = data
        .indicators
        .and_then(|i| i.quote.into_iter().next())
        .unwrap_or_default();

    let mut rows: Vec<ChartRow> = Vec::with_capacity(data.timestamp.len());
    for (i, &ts) in data.timestamp.iter().enumerate() {
        let Some(moment) = DateTime::from_timestamp(ts + offset, 0) else {
            warn!("{}: dropping row with out-of-range timestamp {}", symbol, ts);
            continue;
        };
        let row = ChartRow {
            date: moment.date_naive(),
            open: column(&quote.open, i),
            high: column(&quote.high, i),
            low: column(&quote.low, i),
            close: column(&quote.close, i),
            volume: column(&quote.volume, i),
        };

        rows.push(row);
    }
    rows.sort_by_key(|row| row.date);
    rows.dedup_by(|next, kept| {
        let same_day = next.date == kept.date;
        if same_day {
            kept.merge_later(next);
        }
        same_day
    });

    if rows.is_empty() {
        return Err(ForecastError::data_unavailable(symbol, "no rows in range"));
    }
    Ok(rows)
}

/// Daily closes from parsed rows; rows without a close are skipped.
pub fn closes_from_rows(symbol: &str, rows: &[ChartRow]) -> Result<PriceSeries> {
    let points: Vec<PricePoint> = rows
        .iter()
        .filter_map(|row| row.close.map(|close| PricePoint { date: row.date, close }))
        .collect();

    let skipped = rows.len() - points.len();
    if skipped > 0 {
        warn!("{}: skipped {} row(s) without a close", symbol, skipped);
    }
    if points.is_empty() {
        return Err(ForecastError::data_unavailable(symbol, "no closing prices in range"));
    }
    PriceSeries::new(points)
}

/// Blocking client for `https://query1.finance.yahoo.com/v8/finance/chart`.
pub struct YahooClient {
    base_url: String,
    client: Client,
}

impl YahooClient {
    pub fn new() -> Result<Self> {
        Self::from_config(&MarketDataConfig::default())
    }

    pub fn from_config(config: &MarketDataConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0")
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self::with_client(&config.base_url, client))
    }

    fn with_client(base_url: &str, client: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn fetch_rows(&self, symbol: &str, query: &[(&str, String)]) -> Result<Vec<ChartRow>> {
        let symbol = symbol.trim();
        if symbol.is_empty() || symbol.contains(|c: char| c.is_whitespace() || c == '/' || c == '?' || c == '#') {
            return Err(ForecastError::data_unavailable(symbol, "invalid ticker symbol"));
        }

        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!("Fetching Yahoo chart from: {} {:?}", url, query);

        let response = self.client.get(&url).query(query).send()?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let body = response.text().unwrap_or_default();
            return match parse_chart_response(symbol, &body) {
                Err(err) => Err(err),
                Ok(_) => Err(ForecastError::data_unavailable(symbol, "symbol not found")),
            };
        }

        let body = response.error_for_status()?.text()?;
        parse_chart_response(symbol, &body)
    }
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

impl MarketDataClient for YahooClient {
    fn daily_closes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<PriceSeries> {
        if end < start {
            return Err(ForecastError::data_unavailable(
                symbol,
                format!("end date {} precedes start date {}", end, start),
            ));
        }

        // period2 is exclusive; the day after makes `end` inclusive
        let query = [
            ("period1", unix_midnight(start).to_string()),
            ("period2", unix_midnight(end + Duration::days(1)).to_string()),
            ("interval", "1d".to_string()),
            ("events", "history".to_string()),
        ];
        let rows = self.fetch_rows(symbol, &query)?;

        let series = closes_from_rows(symbol, &rows)?.between(start, end);
        if series.is_empty() {
            return Err(ForecastError::data_unavailable(
                symbol,
                format!("no rows between {} and {}", start, end),
            ));
        }

        info!(
            "Fetched {} closes for {} ({} to {})",
            series.len(),
            symbol,
            series.first_date().unwrap_or(start),
            series.last_date().unwrap_or(end)
        );
        Ok(series)
    }

    fn latest_session(&self, symbol: &str) -> Result<SessionQuote> {
        let query = [("range", "1d".to_string()), ("interval", "1d".to_string())];
        let rows = self.fetch_rows(symbol, &query)?;

        rows.iter()
            .rev()
            .find_map(ChartRow::session)
            .ok_or_else(|| ForecastError::data_unavailable(symbol, "no complete session in the last day"))
    }
}

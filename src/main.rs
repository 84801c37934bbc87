//! Command line front end.
//!
//! Usage:
//!   stockify forecast SYMBOL YYYY-MM-DD [--config FILE] [--chart FILE]
//!   stockify quote SYMBOL...

use chrono::NaiveDate;
use log::{info, warn};
use std::env;
use std::error::Error;
use std::process::ExitCode;

use stockify::{
    ChartRenderer, ForecastConfig, ForecastService, Forecaster, MarketDataClient, YahooClient,
};

const USAGE: &str = "usage:
  stockify forecast SYMBOL YYYY-MM-DD [--config FILE] [--chart FILE]
  stockify quote SYMBOL...";

fn get_arg(args: &[String], name: &str) -> Option<String> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

/// Positional arguments, skipping `--flag value` pairs.
fn positionals(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg.starts_with("--") {
            iter.next();
        } else {
            out.push(arg.as_str());
        }
    }
    out
}

fn load_config(args: &[String]) -> Result<ForecastConfig, Box<dyn Error>> {
    let config = match get_arg(args, "--config") {
        Some(path) => {
            info!("Loading configuration from {}", path);
            ForecastConfig::from_json_file(path)?
        }
        None => ForecastConfig::default(),
    };
    let config = config.with_env()?;
    config.validate()?;
    Ok(config)
}

fn run_forecast(args: &[String]) -> Result<(), Box<dyn Error>> {
    let (symbol, end_date) = match positionals(args).as_slice() {
        [symbol, date] => (symbol.to_uppercase(), NaiveDate::parse_from_str(date, "%Y-%m-%d")?),
        _ => return Err(USAGE.into()),
    };

    let config = load_config(args)?;
    let client = YahooClient::from_config(&config.market_data)?;
    let service = ForecastService::new(Forecaster::new(client, config));

    let result = service.forecast(&symbol, end_date)?;
    println!("{}", serde_json::to_string_pretty(&*result)?);

    if let Some(path) = get_arg(args, "--chart") {
        match ChartRenderer::new(format!("{} closing price", symbol)).render(&result.validation) {
            Some(chart) => {
                chart.save(&path)?;
                info!("Chart written to {}", path);
            }
            None => warn!("No chart written for {}", symbol),
        }
    }
    Ok(())
}

fn run_quote(args: &[String]) -> Result<(), Box<dyn Error>> {
    let symbols: Vec<String> = positionals(args).iter().map(|s| s.to_uppercase()).collect();
    if symbols.is_empty() {
        return Err(USAGE.into());
    }

    let config = load_config(args)?;
    let client = YahooClient::from_config(&config.market_data)?;
    let refs: Vec<&str> = symbols.iter().map(String::as_str).collect();
    let table = client.latest_sessions(&refs)?;

    println!(
        "{:<8} {:>10} {:>12} {:>12} {:>12} {:>12} {:>14}",
        "Symbol", "Date", "Open", "High", "Low", "Close", "Volume"
    );
    println!("{:-<86}", "");
    for (symbol, session) in &table {
        let row = session.rounded(3);
        println!(
            "{:<8} {:>10} {:>12.3} {:>12.3} {:>12.3} {:>12.3} {:>14}",
            symbol, row.date, row.open, row.high, row.low, row.close, row.volume
        );
    }
    println!();
    for symbol in &refs {
        println!("{} unit price: {}", symbol, client.latest_open(symbol)?);
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let outcome = match args.first().map(String::as_str) {
        Some("forecast") => run_forecast(&args[1..]),
        Some("quote") => run_quote(&args[1..]),
        _ => Err(USAGE.into()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

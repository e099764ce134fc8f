//! Market quote feed: one fresh observation per fetch.
//!
//! The primary price is derived, not quoted: MCX-style gold trades in INR
//! per 10 grams, so the USD-per-ounce spot is converted through the
//! exchange rate. Each quote falls back to a documented constant when the
//! upstream yields nothing usable; the fetch itself only fails on local
//! configuration problems.

use std::env;

use chrono::Local;
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::warn;

use crate::domain::Observation;
use crate::error::{AppError, ErrorKind};

/// Troy ounce in grams, for the USD/oz to INR/10g conversion.
pub const GRAMS_PER_TROY_OUNCE: f64 = 31.1035;

/// Fallback quotes recorded when the upstream gives nothing usable.
pub const FALLBACK_GOLD_USD: f64 = 2400.0;
pub const FALLBACK_USD_INR: f64 = 85.0;
pub const FALLBACK_NIFTY: f64 = 25_000.0;

/// Neutral sentiment recorded while no scoring source is wired in.
pub const NEUTRAL_SENTIMENT: f64 = 0.05;

const GOLD_SYMBOL: &str = "GC=F";
const USD_INR_SYMBOL: &str = "USDINR=X";
const NIFTY_SYMBOL: &str = "^NSEI";

const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

/// INR per 10 grams from a USD-per-troy-ounce quote.
pub fn mcx_price_from_quotes(gold_usd_per_oz: f64, usd_inr: f64) -> f64 {
    gold_usd_per_oz * usd_inr * 10.0 / GRAMS_PER_TROY_OUNCE
}

/// Source of fresh observations. `HttpFeed` is the live implementation;
/// `OfflineFeed` serves the same shape without a network.
pub trait MarketFeed {
    fn fetch(&self) -> Result<Observation, AppError>;
}

/// Quote client against a Yahoo-compatible chart endpoint.
pub struct HttpFeed {
    client: Client,
    base_url: String,
    sentiment: f64,
}

impl HttpFeed {
    /// Build from the environment. `GOLD_FEED_BASE_URL` (also read from a
    /// local `.env`) overrides the quote host, e.g. to point at a mirror.
    pub fn from_env(sentiment: f64) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        let base_url =
            env::var("GOLD_FEED_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .map_err(|e| {
                AppError::new(ErrorKind::Input, format!("Failed to build HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            base_url,
            sentiment,
        })
    }

    fn fetch_quote(&self, symbol: &str) -> Result<f64, AppError> {
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("interval", "1d"), ("range", "1d")])
            .send()
            .map_err(|e| {
                AppError::new(
                    ErrorKind::Upstream,
                    format!("Quote request for {symbol} failed: {e}"),
                )
            })?;
        if !response.status().is_success() {
            return Err(AppError::new(
                ErrorKind::Upstream,
                format!(
                    "Quote request for {symbol} returned status {}.",
                    response.status()
                ),
            ));
        }
        let parsed: ChartResponse = response.json().map_err(|e| {
            AppError::new(
                ErrorKind::Upstream,
                format!("Failed to parse quote response for {symbol}: {e}"),
            )
        })?;
        match first_price(&parsed) {
            Some(p) if p.is_finite() && p > 0.0 => Ok(p),
            _ => Err(AppError::new(
                ErrorKind::Upstream,
                format!("No usable quote for {symbol}."),
            )),
        }
    }

    fn quote_or_fallback(&self, symbol: &str, fallback: f64) -> f64 {
        match self.fetch_quote(symbol) {
            Ok(p) => p,
            Err(e) => {
                warn!(symbol, fallback, error = %e, "quote failed; using fallback");
                fallback
            }
        }
    }
}

impl MarketFeed for HttpFeed {
    fn fetch(&self) -> Result<Observation, AppError> {
        let gold_usd = self.quote_or_fallback(GOLD_SYMBOL, FALLBACK_GOLD_USD);
        let usd_inr = self.quote_or_fallback(USD_INR_SYMBOL, FALLBACK_USD_INR);
        let nifty50 = self.quote_or_fallback(NIFTY_SYMBOL, FALLBACK_NIFTY);
        Ok(Observation {
            timestamp: Local::now().naive_local(),
            mcx_gold_price: mcx_price_from_quotes(gold_usd, usd_inr),
            usd_inr,
            nifty50,
            news_sentiment: self.sentiment,
        })
    }
}

/// No-network feed: fallback quotes only.
pub struct OfflineFeed {
    pub sentiment: f64,
}

impl MarketFeed for OfflineFeed {
    fn fetch(&self) -> Result<Observation, AppError> {
        Ok(Observation {
            timestamp: Local::now().naive_local(),
            mcx_gold_price: mcx_price_from_quotes(FALLBACK_GOLD_USD, FALLBACK_USD_INR),
            usd_inr: FALLBACK_USD_INR,
            nifty50: FALLBACK_NIFTY,
            news_sentiment: self.sentiment,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

fn first_price(parsed: &ChartResponse) -> Option<f64> {
    parsed
        .chart
        .result
        .as_ref()
        .and_then(|r| r.first())
        .and_then(|r| r.meta.regular_market_price)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn troy_ounce_conversion_has_a_round_anchor() {
        // 3110.35 USD/oz is exactly 100 USD/gram, so at a rate of 10 the
        // 10-gram price is exactly 10_000.
        let price = mcx_price_from_quotes(3110.35, 10.0);
        assert!((price - 10_000.0).abs() < 1e-9, "price = {price}");
    }

    #[test]
    fn conversion_is_linear_in_both_quotes() {
        let base = mcx_price_from_quotes(2400.0, 85.0);
        assert!((mcx_price_from_quotes(4800.0, 85.0) - 2.0 * base).abs() < 1e-9);
        assert!((mcx_price_from_quotes(2400.0, 170.0) - 2.0 * base).abs() < 1e-9);
        assert!(base > 0.0);
    }

    #[test]
    fn offline_feed_produces_a_valid_observation() {
        let feed = OfflineFeed { sentiment: 0.12 };
        let obs = feed.fetch().unwrap();
        assert!(obs.mcx_gold_price > 0.0);
        assert!(obs.mcx_gold_price.is_finite());
        assert_eq!(obs.usd_inr, FALLBACK_USD_INR);
        assert_eq!(obs.nifty50, FALLBACK_NIFTY);
        assert_eq!(obs.news_sentiment, 0.12);
    }

    #[test]
    fn chart_payload_parses_down_to_the_quote() {
        let json = r#"{"chart":{"result":[{"meta":{"regularMarketPrice":2391.2}}],"error":null}}"#;
        let parsed: ChartResponse = serde_json::from_str(json).unwrap();
        assert_eq!(first_price(&parsed), Some(2391.2));

        let empty = r#"{"chart":{"result":null,"error":{"code":"Not Found"}}}"#;
        let parsed: ChartResponse = serde_json::from_str(empty).unwrap();
        assert_eq!(first_price(&parsed), None);
    }
}

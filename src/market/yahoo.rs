//! Yahoo Finance quote provider
//!
//! One chart request per symbol (daily bars, one year). The latest price
//! comes from the chart metadata; 50- and 200-day averages are taken from
//! the metadata when present, otherwise computed from the close series.

use crate::error::AgentError;
use crate::market::MarketDataProvider;
use crate::models::PriceQuote;
use crate::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, warn};

pub const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) react-trading-agent/0.1";

#[derive(Clone)]
pub struct YahooMarketData {
    client: Client,
    base_url: String,
}

impl YahooMarketData {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                AgentError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: YAHOO_CHART_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_one(&self, symbol: &str) -> Result<PriceQuote> {
        let url = format!("{}/{}", self.base_url, symbol);

        let response = self
            .client
            .get(&url)
            .query(&[("range", "1y"), ("interval", "1d")])
            .send()
            .await
            .map_err(|e| {
                AgentError::MarketDataError(format!("Quote request failed for {}: {}", symbol, e))
            })?;

        let status = response.status();
        let body = response.json::<Value>().await.map_err(|e| {
            AgentError::MarketDataError(format!("Invalid JSON for {}: {}", symbol, e))
        })?;

        if !status.is_success() {
            return Err(AgentError::MarketDataError(format!(
                "Yahoo returned {} for {}: {}",
                status,
                symbol,
                chart_error(&body).unwrap_or_default()
            )));
        }

        parse_chart(symbol, &body)
    }
}

#[async_trait]
impl MarketDataProvider for YahooMarketData {
    async fn fetch(&self, symbols: &[String]) -> BTreeMap<String, PriceQuote> {
        let mut out = BTreeMap::new();

        debug!(count = symbols.len(), ?symbols, "Fetching price data");

        for symbol in symbols.iter().map(|s| s.trim().to_uppercase()) {
            let quote = match self.fetch_one(&symbol).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!(symbol = %symbol, error = %e, "Failed to fetch quote");
                    PriceQuote::failed(e.to_string())
                }
            };
            out.insert(symbol, quote);
        }

        out
    }
}

fn chart_error(body: &Value) -> Option<String> {
    let err = body.pointer("/chart/error")?;
    if err.is_null() {
        return None;
    }
    Some(
        err.get("description")
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .unwrap_or_else(|| err.to_string()),
    )
}

/// Build a quote from a v8 chart body
fn parse_chart(symbol: &str, body: &Value) -> Result<PriceQuote> {
    if let Some(err) = chart_error(body) {
        return Err(AgentError::MarketDataError(format!("{}: {}", symbol, err)));
    }

    let result = body
        .pointer("/chart/result/0")
        .ok_or_else(|| AgentError::MarketDataError(format!("{}: empty chart result", symbol)))?;

    let meta = result.get("meta").cloned().unwrap_or(Value::Null);

    let closes: Vec<f64> = result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .map(|arr| arr.iter().filter_map(Value::as_f64).collect())
        .unwrap_or_default();

    let price = meta
        .get("regularMarketPrice")
        .and_then(Value::as_f64)
        .or_else(|| meta.get("chartPreviousClose").and_then(Value::as_f64))
        .or_else(|| closes.last().copied());

    let fifty_day_avg = meta
        .get("fiftyDayAverage")
        .and_then(Value::as_f64)
        .or_else(|| trailing_average(&closes, 50));
    let two_hundred_day_avg = meta
        .get("twoHundredDayAverage")
        .and_then(Value::as_f64)
        .or_else(|| trailing_average(&closes, 200));

    Ok(PriceQuote {
        price,
        fifty_day_avg,
        two_hundred_day_avg,
        raw_metadata: Some(meta),
        error: if price.is_none() {
            Some(format!("{}: no price in chart metadata", symbol))
        } else {
            None
        },
    })
}

/// Mean of the last `window` closes; `None` with fewer points
fn trailing_average(closes: &[f64], window: usize) -> Option<f64> {
    if window == 0 || closes.len() < window {
        return None;
    }
    let tail = &closes[closes.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trailing_average() {
        let closes: Vec<f64> = (1..=60).map(|v| v as f64).collect();
        assert_eq!(trailing_average(&closes, 50), Some(35.5));
        assert_eq!(trailing_average(&closes, 200), None);
    }

    #[test]
    fn test_parse_chart_computes_averages() {
        let closes: Vec<Value> = (0..250)
            .map(|i| if i == 10 { Value::Null } else { json!(100.0) })
            .collect();
        let body = json!({
            "chart": {
                "result": [{
                    "meta": { "symbol": "AAPL", "regularMarketPrice": 110.0 },
                    "indicators": { "quote": [{ "close": closes }] }
                }],
                "error": null
            }
        });

        let quote = parse_chart("AAPL", &body).unwrap();
        assert_eq!(quote.price, Some(110.0));
        assert_eq!(quote.fifty_day_avg, Some(100.0));
        assert_eq!(quote.two_hundred_day_avg, Some(100.0));
        assert_eq!(quote.ratio_50(), Some(1.1));
        assert!(quote.error.is_none());
        assert_eq!(quote.raw_metadata.unwrap()["symbol"], "AAPL");
    }

    #[test]
    fn test_parse_chart_prefers_meta_averages() {
        let body = json!({
            "chart": {
                "result": [{
                    "meta": {
                        "chartPreviousClose": 42.0,
                        "fiftyDayAverage": 40.0,
                        "twoHundredDayAverage": 38.0
                    },
                    "indicators": { "quote": [{ "close": [41.0, 42.0] }] }
                }],
                "error": null
            }
        });

        let quote = parse_chart("MSFT", &body).unwrap();
        assert_eq!(quote.price, Some(42.0));
        assert_eq!(quote.fifty_day_avg, Some(40.0));
        assert_eq!(quote.two_hundred_day_avg, Some(38.0));
    }

    #[test]
    fn test_parse_chart_error() {
        let body = json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        });

        let err = parse_chart("ZZZZ", &body).unwrap_err();
        assert!(err.to_string().contains("delisted"));
    }
}

//! Market data providers
//!
//! A fetch never fails as a whole: each symbol either carries a price or
//! an error string.

use crate::models::PriceQuote;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub mod yahoo;
pub use yahoo::YahooMarketData;

/// Trait for quote snapshots
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Quotes keyed by upper-cased symbol, one entry per requested symbol
    async fn fetch(&self, symbols: &[String]) -> BTreeMap<String, PriceQuote>;
}

#[async_trait]
impl<T: MarketDataProvider + ?Sized> MarketDataProvider for Arc<T> {
    async fn fetch(&self, symbols: &[String]) -> BTreeMap<String, PriceQuote> {
        (**self).fetch(symbols).await
    }
}

/// Serves a fixed book of quotes. Unknown symbols come back as failures.
pub struct StaticMarketData {
    quotes: Mutex<BTreeMap<String, PriceQuote>>,
}

impl StaticMarketData {
    pub fn new() -> Self {
        Self {
            quotes: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_quote(self, symbol: &str, quote: PriceQuote) -> Self {
        self.set_quote(symbol, quote);
        self
    }

    pub fn with_price(self, symbol: &str, price: f64) -> Self {
        self.with_quote(symbol, PriceQuote::priced(price, None, None))
    }

    /// Replace a quote between episodes
    pub fn set_quote(&self, symbol: &str, quote: PriceQuote) {
        if let Ok(mut quotes) = self.quotes.lock() {
            quotes.insert(symbol.trim().to_uppercase(), quote);
        }
    }
}

impl Default for StaticMarketData {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketDataProvider for StaticMarketData {
    async fn fetch(&self, symbols: &[String]) -> BTreeMap<String, PriceQuote> {
        let quotes = match self.quotes.lock() {
            Ok(quotes) => quotes.clone(),
            Err(_) => BTreeMap::new(),
        };

        symbols
            .iter()
            .map(|s| s.trim().to_uppercase())
            .map(|symbol| {
                let quote = quotes
                    .get(&symbol)
                    .cloned()
                    .unwrap_or_else(|| PriceQuote::failed(format!("No quote for {}", symbol)));
                (symbol, quote)
            })
            .collect()
    }
}

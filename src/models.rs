//! Core data models for the trading agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

//
// ================= Actions =================
//

/// The only trade verbs ACT understands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Buy,
    Sell,
    Done,
}

impl ActionKind {
    /// Case-insensitive match against a model-provided tag
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "buy" => Some(ActionKind::Buy),
            "sell" => Some(ActionKind::Sell),
            "done" => Some(ActionKind::Done),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Buy => "buy",
            ActionKind::Sell => "sell",
            ActionKind::Done => "done",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A committed trading decision. Never edited once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    /// Empty for `done`
    pub symbol: String,
    /// Zero for `done`
    pub quantity: f64,
    pub reasoning: String,
}

impl Action {
    pub fn done(reasoning: impl Into<String>) -> Self {
        Self {
            kind: ActionKind::Done,
            symbol: String::new(),
            quantity: 0.0,
            reasoning: reasoning.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ActionKind::Done => write!(f, "DONE"),
            _ => write!(
                f,
                "{} {} x{}",
                self.kind.as_str().to_uppercase(),
                self.symbol,
                self.quantity
            ),
        }
    }
}

//
// ================= Market Data =================
//

/// One symbol's quote as delivered by the market-data provider.
/// A failed lookup keeps `price` empty and carries `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceQuote {
    pub price: Option<f64>,
    pub fifty_day_avg: Option<f64>,
    pub two_hundred_day_avg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PriceQuote {
    pub fn priced(price: f64, fifty_day_avg: Option<f64>, two_hundred_day_avg: Option<f64>) -> Self {
        Self {
            price: Some(price),
            fifty_day_avg,
            two_hundred_day_avg,
            raw_metadata: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Price over its 50-day average
    pub fn ratio_50(&self) -> Option<f64> {
        ratio(self.price, self.fifty_day_avg)
    }

    /// Price over its 200-day average
    pub fn ratio_200(&self) -> Option<f64> {
        ratio(self.price, self.two_hundred_day_avg)
    }
}

fn ratio(price: Option<f64>, average: Option<f64>) -> Option<f64> {
    match (price, average) {
        (Some(p), Some(avg)) if p != 0.0 && avg != 0.0 => Some(p / avg),
        _ => None,
    }
}

/// Snapshot stored by OBSERVE and read by the THINK/DECIDE prompts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketObservation {
    pub day: u32,
    /// Only symbols that came back with a price
    pub prices: BTreeMap<String, f64>,
    pub quotes: BTreeMap<String, PriceQuote>,
    pub observed_at: DateTime<Utc>,
}

impl MarketObservation {
    pub fn from_quotes(day: u32, quotes: BTreeMap<String, PriceQuote>) -> Self {
        let prices = quotes
            .iter()
            .filter_map(|(symbol, quote)| quote.price.map(|p| (symbol.clone(), p)))
            .collect();

        Self {
            day,
            prices,
            quotes,
            observed_at: Utc::now(),
        }
    }

    /// Placeholder before the first OBSERVE of a run
    pub fn empty(day: u32) -> Self {
        Self::from_quotes(day, BTreeMap::new())
    }

    pub fn failed_symbols(&self) -> Vec<&str> {
        self.quotes
            .iter()
            .filter(|(_, q)| q.price.is_none())
            .map(|(s, _)| s.as_str())
            .collect()
    }
}

//! Portfolio ledger
//!
//! Cash plus one position per held symbol. Mutated only through
//! `buy`, `sell` and `update_prices`; failed trades leave it untouched.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info, warn};

pub const DEFAULT_INITIAL_CASH: f64 = 1000.0;

/// Why a trade was refused. The ledger is unchanged in every case.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Insufficient cash: need ${required:.2}, have ${available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Cannot sell {0}: not in portfolio")]
    UnknownPosition(String),

    #[error("Cannot sell {requested} shares of {symbol}: only have {held}")]
    InsufficientShares {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("Invalid quantity {0}")]
    InvalidQuantity(f64),

    #[error("Invalid price {0}")]
    InvalidPrice(f64),

    #[error("No observed price for {0}")]
    NoPrice(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub quantity: f64,
    /// Weighted cost basis, recomputed on every buy
    pub avg_price: f64,
    pub current_price: Option<f64>,
}

impl Position {
    pub fn market_value(&self) -> f64 {
        self.current_price
            .map(|price| self.quantity * price)
            .unwrap_or(0.0)
    }
}

/// Executed trade
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub symbol: String,
    pub quantity: f64,
    pub price: f64,
    /// Cost for a buy, proceeds for a sell
    pub amount: f64,
    pub cash_after: f64,
    /// True when a sell closed the whole position
    pub closed: bool,
}

/// Serializable per-symbol view used in prompts and summaries
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Holding {
    pub quantity: f64,
    pub avg_price: f64,
    pub current_price: Option<f64>,
    pub market_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    cash: f64,
    positions: BTreeMap<String, Position>,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_CASH)
    }
}

impl Portfolio {
    pub fn new(initial_cash: f64) -> Self {
        Self {
            cash: initial_cash.max(0.0),
            positions: BTreeMap::new(),
        }
    }

    /// Seed an existing holding (replaces any position under the same symbol)
    pub fn add_position(
        &mut self,
        symbol: &str,
        quantity: f64,
        avg_price: f64,
    ) -> Result<(), TradeError> {
        validate_quantity(quantity)?;
        validate_price(avg_price)?;

        let symbol = normalize_symbol(symbol);
        self.positions.insert(
            symbol.clone(),
            Position {
                symbol,
                quantity,
                avg_price,
                current_price: None,
            },
        );
        Ok(())
    }

    pub fn cash(&self) -> f64 {
        self.cash
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(&normalize_symbol(symbol))
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn is_flat(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn buy(&mut self, symbol: &str, quantity: f64, price: f64) -> Result<Fill, TradeError> {
        validate_quantity(quantity)?;
        validate_price(price)?;

        let symbol = normalize_symbol(symbol);
        let cost = quantity * price;

        if cost > self.cash {
            warn!(
                symbol = %symbol,
                required = cost,
                available = self.cash,
                "Buy rejected: insufficient cash"
            );
            return Err(TradeError::InsufficientFunds {
                required: cost,
                available: self.cash,
            });
        }

        self.cash -= cost;

        match self.positions.get_mut(&symbol) {
            Some(pos) => {
                let total_quantity = pos.quantity + quantity;
                let total_cost = pos.quantity * pos.avg_price + cost;
                pos.quantity = total_quantity;
                pos.avg_price = total_cost / total_quantity;
            }
            None => {
                self.positions.insert(
                    symbol.clone(),
                    Position {
                        symbol: symbol.clone(),
                        quantity,
                        avg_price: price,
                        current_price: None,
                    },
                );
            }
        }

        info!(
            symbol = %symbol,
            quantity,
            price,
            cash = self.cash,
            "Bought shares"
        );

        Ok(Fill {
            symbol,
            quantity,
            price,
            amount: cost,
            cash_after: self.cash,
            closed: false,
        })
    }

    /// Sell `quantity` shares, or the whole position when `None`
    pub fn sell(
        &mut self,
        symbol: &str,
        quantity: Option<f64>,
        price: f64,
    ) -> Result<Fill, TradeError> {
        validate_price(price)?;
        let symbol = normalize_symbol(symbol);

        let held = match self.positions.get(&symbol) {
            Some(pos) => pos.quantity,
            None => {
                warn!(symbol = %symbol, "Sell rejected: not in portfolio");
                return Err(TradeError::UnknownPosition(symbol));
            }
        };

        let sell_quantity = match quantity {
            Some(q) => {
                validate_quantity(q)?;
                q
            }
            None => held,
        };

        if sell_quantity > held {
            warn!(
                symbol = %symbol,
                requested = sell_quantity,
                held,
                "Sell rejected: insufficient shares"
            );
            return Err(TradeError::InsufficientShares {
                symbol,
                requested: sell_quantity,
                held,
            });
        }

        let proceeds = sell_quantity * price;
        self.cash += proceeds;

        let closed = sell_quantity == held;
        if closed {
            self.positions.remove(&symbol);
        } else if let Some(pos) = self.positions.get_mut(&symbol) {
            pos.quantity -= sell_quantity;
        }

        info!(
            symbol = %symbol,
            quantity = sell_quantity,
            price,
            proceeds,
            cash = self.cash,
            closed,
            "Sold shares"
        );

        Ok(Fill {
            symbol,
            quantity: sell_quantity,
            price,
            amount: proceeds,
            cash_after: self.cash,
            closed,
        })
    }

    /// Refresh marks for held symbols. Symbols missing from the
    /// snapshot keep their last known price.
    pub fn update_prices(&mut self, prices: &BTreeMap<String, f64>) {
        for (symbol, pos) in self.positions.iter_mut() {
            if let Some(price) = prices.get(symbol) {
                pos.current_price = Some(*price);
            }
        }
        debug!(held = self.positions.len(), "Portfolio prices updated");
    }

    /// Value of all positions at current marks
    pub fn total_market_value(&self) -> f64 {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Positions plus cash
    pub fn total_value(&self) -> f64 {
        self.total_market_value() + self.cash
    }

    pub fn holdings(&self) -> BTreeMap<String, Holding> {
        self.positions
            .iter()
            .map(|(symbol, pos)| {
                (
                    symbol.clone(),
                    Holding {
                        quantity: pos.quantity,
                        avg_price: pos.avg_price,
                        current_price: pos.current_price,
                        market_value: pos.market_value(),
                    },
                )
            })
            .collect()
    }
}

fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

fn validate_quantity(quantity: f64) -> Result<(), TradeError> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(())
    } else {
        Err(TradeError::InvalidQuantity(quantity))
    }
}

fn validate_price(price: f64) -> Result<(), TradeError> {
    if price.is_finite() && price >= 0.0 {
        Ok(())
    } else {
        Err(TradeError::InvalidPrice(price))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prices(entries: &[(&str, f64)]) -> BTreeMap<String, f64> {
        entries.iter().map(|(s, p)| (s.to_string(), *p)).collect()
    }

    #[test]
    fn test_weighted_average_on_repeat_buys() {
        let mut portfolio = Portfolio::new(1000.0);

        let fill = portfolio.buy("AAPL", 3.0, 100.0).unwrap();
        assert_eq!(fill.amount, 300.0);
        assert_eq!(portfolio.cash(), 700.0);
        let pos = portfolio.position("AAPL").unwrap();
        assert_eq!(pos.quantity, 3.0);
        assert_eq!(pos.avg_price, 100.0);

        let fill = portfolio.buy("AAPL", 2.0, 130.0).unwrap();
        assert_eq!(fill.amount, 260.0);
        assert_eq!(portfolio.cash(), 440.0);
        let pos = portfolio.position("AAPL").unwrap();
        assert_eq!(pos.quantity, 5.0);
        assert_eq!(pos.avg_price, 112.0);
    }

    #[test]
    fn test_sell_all_after_mark() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.buy("AAPL", 3.0, 100.0).unwrap();
        portfolio.buy("AAPL", 2.0, 130.0).unwrap();

        portfolio.update_prices(&prices(&[("AAPL", 150.0)]));
        assert_eq!(portfolio.total_market_value(), 750.0);

        let fill = portfolio.sell("AAPL", None, 150.0).unwrap();
        assert_eq!(fill.amount, 750.0);
        assert!(fill.closed);
        assert_eq!(portfolio.cash(), 1190.0);
        assert!(portfolio.position("AAPL").is_none());
        assert!(portfolio.is_flat());
    }

    #[test]
    fn test_buy_then_sell_round_trip_restores_cash() {
        let mut portfolio = Portfolio::new(500.0);
        portfolio.buy("MSFT", 4.0, 25.0).unwrap();
        portfolio.sell("MSFT", Some(4.0), 25.0).unwrap();

        assert_eq!(portfolio.cash(), 500.0);
        assert!(portfolio.position("MSFT").is_none());
    }

    #[test]
    fn test_insufficient_funds_leaves_ledger_untouched() {
        let mut portfolio = Portfolio::new(100.0);
        let err = portfolio.buy("TSLA", 2.0, 60.0).unwrap_err();

        assert_eq!(
            err,
            TradeError::InsufficientFunds {
                required: 120.0,
                available: 100.0
            }
        );
        assert_eq!(portfolio.cash(), 100.0);
        assert!(portfolio.is_flat());
    }

    #[test]
    fn test_sell_rejections() {
        let mut portfolio = Portfolio::new(1000.0);
        assert_eq!(
            portfolio.sell("GOOGL", None, 10.0).unwrap_err(),
            TradeError::UnknownPosition("GOOGL".into())
        );

        portfolio.buy("GOOGL", 2.0, 10.0).unwrap();
        let err = portfolio.sell("GOOGL", Some(3.0), 10.0).unwrap_err();
        assert!(matches!(err, TradeError::InsufficientShares { held, .. } if held == 2.0));
        assert_eq!(portfolio.position("GOOGL").unwrap().quantity, 2.0);
        assert_eq!(portfolio.cash(), 980.0);
    }

    #[test]
    fn test_partial_sell_keeps_cost_basis() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.buy("AMZN", 4.0, 50.0).unwrap();

        let fill = portfolio.sell("amzn", Some(1.0), 70.0).unwrap();
        assert!(!fill.closed);

        let pos = portfolio.position("AMZN").unwrap();
        assert_eq!(pos.quantity, 3.0);
        assert_eq!(pos.avg_price, 50.0);
        assert_eq!(portfolio.cash(), 870.0);
    }

    #[test]
    fn test_update_prices_keeps_stale_marks() {
        let mut portfolio = Portfolio::new(1000.0);
        portfolio.buy("AAPL", 1.0, 100.0).unwrap();
        portfolio.buy("MSFT", 1.0, 200.0).unwrap();
        assert_eq!(portfolio.total_market_value(), 0.0);

        portfolio.update_prices(&prices(&[("AAPL", 110.0), ("MSFT", 210.0)]));
        portfolio.update_prices(&prices(&[("AAPL", 120.0), ("NVDA", 5.0)]));

        assert_eq!(portfolio.position("AAPL").unwrap().current_price, Some(120.0));
        assert_eq!(portfolio.position("MSFT").unwrap().current_price, Some(210.0));
        assert!(portfolio.position("NVDA").is_none());
        assert_eq!(portfolio.total_market_value(), 330.0);
        assert_eq!(portfolio.total_value(), 330.0 + 700.0);
    }

    #[test]
    fn test_cash_never_negative() {
        let mut portfolio = Portfolio::new(250.0);
        let trades: &[(&str, bool, f64, f64)] = &[
            ("AAPL", true, 2.0, 100.0),
            ("AAPL", true, 1.0, 100.0),
            ("MSFT", true, 1.0, 40.0),
            ("AAPL", false, 1.0, 90.0),
            ("TSLA", true, 5.0, 30.0),
            ("MSFT", false, 2.0, 45.0),
            ("TSLA", true, 1.0, 1000.0),
        ];

        for (symbol, is_buy, quantity, price) in trades {
            let _ = if *is_buy {
                portfolio.buy(symbol, *quantity, *price)
            } else {
                portfolio.sell(symbol, Some(*quantity), *price)
            };
            assert!(portfolio.cash() >= 0.0, "cash went negative: {}", portfolio.cash());
        }
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut portfolio = Portfolio::new(100.0);
        assert_eq!(
            portfolio.buy("AAPL", 0.0, 10.0).unwrap_err(),
            TradeError::InvalidQuantity(0.0)
        );
        assert!(matches!(
            portfolio.buy("AAPL", 1.0, f64::NAN).unwrap_err(),
            TradeError::InvalidPrice(_)
        ));
        assert_eq!(portfolio.cash(), 100.0);
    }

    #[test]
    fn test_holdings_view() {
        let mut portfolio = Portfolio::default();
        portfolio.add_position("nvda", 2.0, 10.0).unwrap();
        portfolio.update_prices(&prices(&[("NVDA", 12.0)]));

        let holdings = portfolio.holdings();
        let nvda = holdings.get("NVDA").unwrap();
        assert_eq!(nvda.market_value, 24.0);
        assert_eq!(portfolio.symbols(), vec!["NVDA".to_string()]);
    }

    #[test]
    fn test_add_position_rejects_bad_quantities() {
        let mut portfolio = Portfolio::new(0.0);

        assert_eq!(
            portfolio.add_position("AAPL", 0.0, 10.0).unwrap_err(),
            TradeError::InvalidQuantity(0.0)
        );
        assert_eq!(
            portfolio.add_position("AAPL", -2.0, 10.0).unwrap_err(),
            TradeError::InvalidQuantity(-2.0)
        );
        assert!(matches!(
            portfolio.add_position("AAPL", f64::INFINITY, 10.0).unwrap_err(),
            TradeError::InvalidQuantity(_)
        ));
        assert!(matches!(
            portfolio.add_position("AAPL", 1.0, f64::NAN).unwrap_err(),
            TradeError::InvalidPrice(_)
        ));
        assert!(portfolio.is_flat());
    }
}

//! Session record threaded through the state handlers
//!
//! Each handler takes the session by value and hands it back with the
//! next phase, so exactly one step owns it at a time.

use crate::memory::TrajectoryMemory;
use crate::models::{Action, MarketObservation};
use crate::parser::ModelResponse;
use crate::portfolio::Portfolio;
use crate::prompts::PromptContext;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Session {
    /// Trading day, starts at 1 and advances once per episode
    pub day: u32,
    pub portfolio: Portfolio,
    /// Latest non-null prices from OBSERVE
    pub prices: BTreeMap<String, f64>,
    pub observation: MarketObservation,
    /// Reset after every ACT
    pub trajectory: TrajectoryMemory,
    /// Every committed action, executed or not
    pub actions: Vec<Action>,
    /// Human-readable log entries, one or more per state
    pub journal: Vec<String>,
    pub candidate_symbols: Vec<String>,
    pub(crate) scratch: Scratch,
}

/// Per-step values that never outlive an episode
#[derive(Debug, Clone, Default)]
pub(crate) struct Scratch {
    pub last_response: Option<ModelResponse>,
    pub decided: Option<Action>,
}

impl Session {
    pub fn new(portfolio: Portfolio) -> Self {
        Self {
            day: 1,
            portfolio,
            prices: BTreeMap::new(),
            observation: MarketObservation::empty(1),
            trajectory: TrajectoryMemory::new(),
            actions: Vec::new(),
            journal: Vec::new(),
            candidate_symbols: Vec::new(),
            scratch: Scratch::default(),
        }
    }

    pub fn prompt_context(&self) -> PromptContext<'_> {
        PromptContext {
            day: self.day,
            portfolio: &self.portfolio,
            observation: &self.observation,
        }
    }

    /// Most recent THINK response in the current episode
    pub fn last_response(&self) -> Option<&ModelResponse> {
        self.scratch.last_response.as_ref()
    }

    /// Price ACT trades at: the latest snapshot, else the position's
    /// last mark
    pub fn latest_price(&self, symbol: &str) -> Option<f64> {
        let symbol = symbol.trim().to_uppercase();
        self.prices.get(&symbol).copied().or_else(|| {
            self.portfolio
                .position(&symbol)
                .and_then(|pos| pos.current_price)
        })
    }

    pub(crate) fn log(&mut self, entry: String) {
        self.journal.push(entry);
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(Portfolio::default())
    }
}

//! ReAct Trading Agent
//!
//! An autonomous decision loop that, once per trading day:
//! - Observes prices and moving averages for a set of candidate symbols
//! - Reasons for a bounded number of steps against a language model,
//!   keeping a trajectory of its prior thoughts
//! - Commits to exactly one action (buy, sell or done)
//! - Applies that action to an in-memory portfolio ledger
//!
//! LOOP:
//! OBSERVE → THINK (×N, capped) → DECIDE → ACT

pub mod agent;
pub mod config;
pub mod error;
pub mod events;
pub mod llm;
pub mod market;
pub mod memory;
pub mod models;
pub mod parser;
pub mod portfolio;
pub mod prompts;

pub use error::Result;

// Re-export common types
pub use agent::{AgentPhase, Orchestrator, Session};
pub use models::*;
pub use portfolio::{Portfolio, Position, TradeError};

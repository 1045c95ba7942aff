//! Run configuration
//!
//! Read from the environment (after `.env` is loaded by the binary).
//! Only `OPENROUTER_API_KEY` is required.

use crate::error::AgentError;
use crate::llm::{DEFAULT_MODEL, DEFAULT_TEMPERATURE};
use crate::portfolio::DEFAULT_INITIAL_CASH;
use crate::Result;
use std::path::PathBuf;
use std::str::FromStr;

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";

pub const DEFAULT_MAX_THINK_STEPS: usize = 3;
pub const DEFAULT_EPISODES: u32 = 3;
pub const DEFAULT_SYMBOLS: &[&str] = &["AAPL", "MSFT", "GOOGL", "AMZN", "TSLA"];

/// Loop knobs the orchestrator needs
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub model_id: String,
    pub max_think_steps: usize,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL.to_string(),
            max_think_steps: DEFAULT_MAX_THINK_STEPS,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: None,
        }
    }
}

/// Everything the binary needs to start a run
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub api_key: String,
    pub settings: AgentSettings,
    pub episodes: u32,
    pub symbols: Vec<String>,
    pub initial_cash: f64,
    /// `None` uses the prompts compiled into the binary
    pub prompts_dir: Option<PathBuf>,
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = get(API_KEY_VAR).ok_or_else(|| {
            AgentError::ConfigError(format!(
                "{} environment variable not set",
                API_KEY_VAR
            ))
        })?;

        let max_think_steps = parse_or(&get, "AGENT_MAX_THINK_STEPS", DEFAULT_MAX_THINK_STEPS)?;
        if max_think_steps == 0 {
            return Err(AgentError::ConfigError(
                "AGENT_MAX_THINK_STEPS must be at least 1".to_string(),
            ));
        }

        let temperature: f32 = parse_or(&get, "AGENT_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AgentError::ConfigError(format!(
                "AGENT_TEMPERATURE must be within 0..=2, got {}",
                temperature
            )));
        }

        let max_tokens = match get("AGENT_MAX_TOKENS") {
            Some(raw) => Some(parse_value::<u32>("AGENT_MAX_TOKENS", &raw)?),
            None => None,
        };

        let initial_cash: f64 = parse_or(&get, "AGENT_INITIAL_CASH", DEFAULT_INITIAL_CASH)?;
        if !initial_cash.is_finite() || initial_cash < 0.0 {
            return Err(AgentError::ConfigError(format!(
                "AGENT_INITIAL_CASH must be a non-negative amount, got {}",
                initial_cash
            )));
        }

        let symbols: Vec<String> = match get("AGENT_SYMBOLS") {
            Some(raw) => raw
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            None => DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
        };
        if symbols.is_empty() {
            return Err(AgentError::ConfigError(
                "AGENT_SYMBOLS must name at least one symbol".to_string(),
            ));
        }

        Ok(Self {
            api_key,
            settings: AgentSettings {
                model_id: get("AGENT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                max_think_steps,
                temperature,
                max_tokens,
            },
            episodes: parse_or(&get, "AGENT_EPISODES", DEFAULT_EPISODES)?,
            symbols,
            initial_cash,
            prompts_dir: get("AGENT_PROMPTS_DIR").map(PathBuf::from),
        })
    }
}

fn parse_value<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| AgentError::ConfigError(format!("Invalid {}='{}': {}", key, raw, e)))
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

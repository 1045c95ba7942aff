//! Prompt templates
//!
//! Four named templates (system, initial, trajectory, decision) stored as
//! JSON resources. Templates use `{name}` placeholders and `{{` / `}}` for
//! literal braces. Everything is validated at load time so a broken
//! resource stops the run before the first state transition.

use crate::error::AgentError;
use crate::models::MarketObservation;
use crate::portfolio::Portfolio;
use crate::Result;
use serde_json::{json, Map, Value};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    System,
    Initial,
    Trajectory,
    Decision,
}

impl PromptKind {
    pub const ALL: [PromptKind; 4] = [
        PromptKind::System,
        PromptKind::Initial,
        PromptKind::Trajectory,
        PromptKind::Decision,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            PromptKind::System => "system.json",
            PromptKind::Initial => "initial.json",
            PromptKind::Trajectory => "trajectory.json",
            PromptKind::Decision => "decision.json",
        }
    }

    /// Key holding the template inside the resource object
    pub fn key(&self) -> &'static str {
        match self {
            PromptKind::System => "system_prompt",
            PromptKind::Initial => "initial_prompt",
            PromptKind::Trajectory => "template",
            PromptKind::Decision => "decision_prompt",
        }
    }

    fn placeholders(&self) -> &'static [&'static str] {
        match self {
            PromptKind::System => &[],
            PromptKind::Initial => &[
                "day",
                "portfolio_value",
                "cash",
                "holdings",
                "prices",
                "price_data",
                "candidate_symbols",
            ],
            PromptKind::Trajectory => &["trajectory_context"],
            PromptKind::Decision => &[
                "day",
                "portfolio_value",
                "cash",
                "holdings",
                "prices",
                "price_data",
                "trajectory",
            ],
        }
    }

    fn builtin_source(&self) -> &'static str {
        match self {
            PromptKind::System => include_str!("../prompts/system.json"),
            PromptKind::Initial => include_str!("../prompts/initial.json"),
            PromptKind::Trajectory => include_str!("../prompts/trajectory.json"),
            PromptKind::Decision => include_str!("../prompts/decision.json"),
        }
    }
}

impl fmt::Display for PromptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Text(String),
    Slot(String),
}

/// A validated template
#[derive(Debug, Clone)]
struct Template {
    segments: Vec<Segment>,
}

impl Template {
    fn compile(kind: PromptKind, source: &str) -> Result<Self> {
        let malformed = |detail: String| {
            AgentError::ConfigError(format!("Malformed prompt {}: {}", kind, detail))
        };

        let mut segments = Vec::new();
        let mut text = String::new();
        let mut chars = source.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    text.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    text.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => {
                                return Err(malformed("unterminated placeholder".to_string()))
                            }
                            Some(ch) => name.push(ch),
                        }
                    }

                    let name = name.trim();
                    if !kind.placeholders().contains(&name) {
                        return Err(malformed(format!("unknown placeholder {{{}}}", name)));
                    }

                    if !text.is_empty() {
                        segments.push(Segment::Text(std::mem::take(&mut text)));
                    }
                    segments.push(Segment::Slot(name.to_string()));
                }
                '}' => return Err(malformed("unbalanced '}'".to_string())),
                _ => text.push(c),
            }
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text));
        }

        Ok(Self { segments })
    }

    fn render(&self, values: &[(&str, String)]) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Slot(name) => {
                    if let Some((_, value)) = values.iter().find(|(key, _)| key == name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

/// Runtime values shared by the initial and decision prompts
pub struct PromptContext<'a> {
    pub day: u32,
    pub portfolio: &'a Portfolio,
    pub observation: &'a MarketObservation,
}

impl PromptContext<'_> {
    fn common_values(&self) -> Vec<(&'static str, String)> {
        vec![
            ("day", self.day.to_string()),
            (
                "portfolio_value",
                format!("{:.2}", self.portfolio.total_market_value()),
            ),
            ("cash", format!("{:.2}", self.portfolio.cash())),
            ("holdings", to_json(&self.portfolio.holdings())),
            ("prices", to_json(&self.observation.prices)),
            ("price_data", format_price_data(self.observation)),
        ]
    }
}

/// The four loaded templates
#[derive(Debug, Clone)]
pub struct PromptLibrary {
    system: Template,
    initial: Template,
    trajectory: Template,
    decision: Template,
}

impl PromptLibrary {
    /// Templates compiled into the binary
    pub fn builtin() -> Result<Self> {
        Self::from_sources(|kind| Ok(kind.builtin_source().to_string()))
    }

    /// Load `system.json`, `initial.json`, `trajectory.json` and
    /// `decision.json` from a directory
    pub fn load_dir(dir: &Path) -> Result<Self> {
        debug!(dir = %dir.display(), "Loading prompt templates");
        Self::from_sources(|kind| {
            let path = dir.join(kind.file_name());
            fs::read_to_string(&path).map_err(|e| {
                AgentError::ConfigError(format!(
                    "Failed to load prompt {}: {}",
                    path.display(),
                    e
                ))
            })
        })
    }

    fn from_sources<F>(mut read: F) -> Result<Self>
    where
        F: FnMut(PromptKind) -> Result<String>,
    {
        let mut load = |kind: PromptKind| -> Result<Template> {
            let raw = read(kind)?;
            let template = extract_template(kind, &raw)?;
            Template::compile(kind, &template)
        };

        Ok(Self {
            system: load(PromptKind::System)?,
            initial: load(PromptKind::Initial)?,
            trajectory: load(PromptKind::Trajectory)?,
            decision: load(PromptKind::Decision)?,
        })
    }

    pub fn system_prompt(&self) -> String {
        self.system.render(&[])
    }

    /// First THINK step of an episode: full market picture
    pub fn initial_prompt(&self, ctx: &PromptContext<'_>, candidate_symbols: &[String]) -> String {
        let mut values = ctx.common_values();
        values.push(("candidate_symbols", to_json(&candidate_symbols)));
        self.initial.render(&values)
    }

    /// Later THINK steps: prior steps plus current state
    pub fn trajectory_prompt(&self, trajectory_context: &str) -> String {
        self.trajectory
            .render(&[("trajectory_context", trajectory_context.to_string())])
    }

    pub fn decision_prompt(&self, ctx: &PromptContext<'_>, trajectory_summary: &str) -> String {
        let mut values = ctx.common_values();
        values.push(("trajectory", trajectory_summary.to_string()));
        self.decision.render(&values)
    }
}

fn extract_template(kind: PromptKind, raw: &str) -> Result<String> {
    let value: Value = serde_json::from_str(raw).map_err(|e| {
        AgentError::ConfigError(format!("Failed to load prompt {}: {}", kind, e))
    })?;

    value
        .get(kind.key())
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AgentError::ConfigError(format!(
                "Prompt {} is missing string field '{}'",
                kind,
                kind.key()
            ))
        })
}

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) if v != 0.0 => format!("{:.2}", v),
        _ => "N/A".to_string(),
    }
}

/// Price, moving averages and their ratios per symbol, two decimals or N/A
pub fn format_price_data(observation: &MarketObservation) -> String {
    let mut out = Map::new();
    for (symbol, quote) in &observation.quotes {
        out.insert(
            symbol.clone(),
            json!({
                "price": fmt_opt(quote.price),
                "50_day_avg": fmt_opt(quote.fifty_day_avg),
                "200_day_avg": fmt_opt(quote.two_hundred_day_avg),
                "ratio_50": fmt_opt(quote.ratio_50()),
                "ratio_200": fmt_opt(quote.ratio_200()),
            }),
        );
    }
    to_json(&Value::Object(out))
}

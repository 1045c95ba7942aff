//! Main orchestrator - implements the trading loop
//!
//! OBSERVE → THINK (repeat, bounded) → DECIDE → ACT, once per trading day.
//!
//! Each phase is a handler that takes the session by value and returns it
//! with the next phase. Model failures never escape a handler: they become
//! a synthetic `done` response and the loop carries on.

use crate::config::AgentSettings;
use crate::events::{AgentEvent, EventSink, TracingEventSink};
use crate::llm::{CompletionRequest, LanguageModel};
use crate::market::MarketDataProvider;
use crate::models::{Action, ActionKind, MarketObservation};
use crate::parser::{ModelResponse, ResponseParser};
use crate::portfolio::{Fill, TradeError};
use crate::prompts::PromptLibrary;
use serde::Serialize;
use std::fmt;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub mod session;
pub use session::Session;

use session::Scratch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentPhase {
    Observe,
    Think,
    Decide,
    Act,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentPhase::Observe => "OBSERVE",
            AgentPhase::Think => "THINK",
            AgentPhase::Decide => "DECIDE",
            AgentPhase::Act => "ACT",
        };
        write!(f, "{}", s)
    }
}

/// Where to go after a THINK step.
///
/// The step cap wins over whatever the model asked for, so a model that
/// always answers "think" still reaches DECIDE.
pub fn route_after_think(trajectory_len: usize, max_think_steps: usize, action: &str) -> AgentPhase {
    if trajectory_len >= max_think_steps {
        return AgentPhase::Decide;
    }

    match action {
        "observe" => AgentPhase::Observe,
        "think" => AgentPhase::Think,
        _ => AgentPhase::Decide,
    }
}

/// Handler output: the session back, plus the next phase (`None` ends
/// the episode)
struct Step {
    session: Session,
    next: Option<AgentPhase>,
}

impl Step {
    fn to(session: Session, next: AgentPhase) -> Self {
        Self {
            session,
            next: Some(next),
        }
    }

    fn finish(session: Session) -> Self {
        Self {
            session,
            next: None,
        }
    }
}

/// Main orchestrator that drives the trading loop
pub struct Orchestrator {
    model: Box<dyn LanguageModel>,
    market: Box<dyn MarketDataProvider>,
    prompts: PromptLibrary,
    events: Box<dyn EventSink>,
    settings: AgentSettings,
}

impl Orchestrator {
    pub fn new(
        model: Box<dyn LanguageModel>,
        market: Box<dyn MarketDataProvider>,
        prompts: PromptLibrary,
        settings: AgentSettings,
    ) -> Self {
        Self {
            model,
            market,
            prompts,
            events: Box::new(TracingEventSink),
            settings,
        }
    }

    /// Replace the default tracing sink
    pub fn with_events(mut self, sink: impl EventSink + 'static) -> Self {
        self.events = Box::new(sink);
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    /// Run `episodes` trading days and return the final session.
    /// Exactly one ACT happens per episode.
    pub async fn run(&self, mut session: Session, symbols: &[String], episodes: u32) -> Session {
        let run_id = Uuid::new_v4();

        session.candidate_symbols = symbols.iter().map(|s| s.trim().to_uppercase()).collect();
        session.trajectory.clear();
        session.scratch = Scratch::default();

        self.events.emit(&AgentEvent::RunStarted {
            run_id,
            model_id: self.settings.model_id.clone(),
            episodes,
            symbols: session.candidate_symbols.clone(),
            cash: session.portfolio.cash(),
            total_value: session.portfolio.total_value(),
        });

        for episode in 1..=episodes {
            let day = session.day;
            self.events.emit(&AgentEvent::EpisodeStarted { episode, day });

            session = self.run_episode(session).await;

            self.events.emit(&AgentEvent::EpisodeFinished {
                episode,
                day,
                holdings_value: session.portfolio.total_market_value(),
                cash: session.portfolio.cash(),
                total_value: session.portfolio.total_value(),
                actions_taken: session.actions.len(),
            });
        }

        self.events.emit(&AgentEvent::RunFinished {
            run_id,
            days: episodes,
            actions_taken: session.actions.len(),
            cash: session.portfolio.cash(),
            total_value: session.portfolio.total_value(),
        });

        session
    }

    async fn run_episode(&self, mut session: Session) -> Session {
        let mut phase = AgentPhase::Observe;

        loop {
            debug!(day = session.day, phase = %phase, "Entering state");
            let step = self.dispatch(phase, session).await;
            session = step.session;

            match step.next {
                Some(next) => phase = next,
                None => return session,
            }
        }
    }

    async fn dispatch(&self, phase: AgentPhase, session: Session) -> Step {
        match phase {
            AgentPhase::Observe => self.observe(session).await,
            AgentPhase::Think => self.think(session).await,
            AgentPhase::Decide => self.decide(session).await,
            AgentPhase::Act => self.act(session),
        }
    }

    // === OBSERVE ===
    async fn observe(&self, mut session: Session) -> Step {
        let quotes = self.market.fetch(&session.candidate_symbols).await;
        let observation = MarketObservation::from_quotes(session.day, quotes);

        session.portfolio.update_prices(&observation.prices);
        session.prices = observation.prices.clone();

        let holdings_value = session.portfolio.total_market_value();
        let failed: Vec<String> = observation
            .failed_symbols()
            .into_iter()
            .map(str::to_string)
            .collect();

        session.log(format!(
            "[OBSERVE] Day {}: fetched prices for {} symbols | holdings value ${:.2} | holdings {:?}",
            session.day,
            observation.prices.len(),
            holdings_value,
            session.portfolio.symbols()
        ));

        self.events.emit(&AgentEvent::Observed {
            day: session.day,
            priced: observation.prices.len(),
            failed,
            holdings_value,
        });

        session.observation = observation;
        Step::to(session, AgentPhase::Think)
    }

    // === THINK ===
    async fn think(&self, mut session: Session) -> Step {
        let prompt = if session.trajectory.is_empty() {
            debug!("[THINK] Initial analysis");
            self.prompts
                .initial_prompt(&session.prompt_context(), &session.candidate_symbols)
        } else {
            debug!(steps = session.trajectory.len(), "[THINK] Continuing with prior context");
            self.prompts
                .trajectory_prompt(&trajectory_context(&session))
        };

        let response = self.invoke(prompt).await;
        let action = response.action();
        let reasoning = response.reasoning().unwrap_or_default().to_string();

        let step = session
            .trajectory
            .record(action.clone(), reasoning.clone(), session.day)
            .step;

        session.log(format!(
            "[THINK] Step {} of {}: {} | {}",
            step,
            self.settings.max_think_steps,
            action.to_uppercase(),
            reasoning
        ));

        self.events.emit(&AgentEvent::Thought {
            day: session.day,
            step,
            action: action.clone(),
            reasoning,
        });

        let next = route_after_think(
            session.trajectory.len(),
            self.settings.max_think_steps,
            &action,
        );
        let forced = session.trajectory.len() >= self.settings.max_think_steps;

        self.events.emit(&AgentEvent::Routed {
            from: AgentPhase::Think,
            to: next,
            forced,
        });

        session.scratch.last_response = Some(response);
        Step::to(session, next)
    }

    // === DECIDE ===
    async fn decide(&self, mut session: Session) -> Step {
        let summary = session.trajectory.summary();
        let prompt = self
            .prompts
            .decision_prompt(&session.prompt_context(), &summary);

        let response = self.invoke(prompt).await;
        let action = self.to_action(session.day, &response);

        session.log(format!(
            "[DECIDE] Final action: {} | {}",
            action, action.reasoning
        ));

        self.events.emit(&AgentEvent::Decided {
            day: session.day,
            action: action.clone(),
        });

        session.scratch.decided = Some(action);
        Step::to(session, AgentPhase::Act)
    }

    // === ACT ===
    fn act(&self, mut session: Session) -> Step {
        let action = session
            .scratch
            .decided
            .take()
            .unwrap_or_else(|| Action::done("No decision made"));

        let outcome = apply_action(&mut session, &action);

        let (executed, detail) = match &outcome {
            Ok(Some(fill)) => (
                true,
                format!(
                    "{} {} {} @ ${:.2} (${:.2})",
                    action.kind.as_str(),
                    fill.quantity,
                    fill.symbol,
                    fill.price,
                    fill.amount
                ),
            ),
            Ok(None) => (false, "No action taken (DONE)".to_string()),
            Err(e) => (false, e.to_string()),
        };

        session.log(format!(
            "[ACT] Day {}: {} | cash ${:.2} | total ${:.2}",
            session.day,
            detail,
            session.portfolio.cash(),
            session.portfolio.total_value()
        ));

        self.events.emit(&AgentEvent::Acted {
            day: session.day,
            action: action.clone(),
            executed,
            detail,
            cash: session.portfolio.cash(),
            total_value: session.portfolio.total_value(),
        });

        session.actions.push(action);
        session.day += 1;
        session.trajectory.clear();
        session.scratch = Scratch::default();

        Step::finish(session)
    }

    /// One model round-trip. Any error becomes a `done` response.
    async fn invoke(&self, prompt: String) -> ModelResponse {
        let request = CompletionRequest {
            prompt,
            model_id: self.settings.model_id.clone(),
            system_prompt: Some(self.prompts.system_prompt()),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        debug!(prompt = %request.prompt, "[USER_PROMPT]");

        match self.model.complete(&request).await {
            Ok(text) => {
                let parsed = ResponseParser::parse(&text);
                debug!(response = ?parsed.fields(), "[LLM_RESPONSE]");
                parsed
            }
            Err(e) => {
                error!(error = %e, "Model call failed");
                ModelResponse::done(format!("Model error: {}", e))
            }
        }
    }

    /// Turn the DECIDE response into an Action. Trade verbs outside
    /// buy/sell/done are coerced to done and flagged.
    fn to_action(&self, day: u32, response: &ModelResponse) -> Action {
        let tag = response.trade_action();

        let kind = match ActionKind::from_tag(&tag) {
            Some(kind) => kind,
            None => {
                warn!(day, trade_action = %tag, "Unrecognised trade action, treating as done");
                self.events.emit(&AgentEvent::DecisionCoerced {
                    day,
                    original: tag.clone(),
                });
                ActionKind::Done
            }
        };

        let reasoning = response
            .reasoning()
            .unwrap_or("No decision made")
            .to_string();

        match kind {
            ActionKind::Done => Action::done(reasoning),
            _ => Action {
                kind,
                symbol: response.symbol(),
                quantity: response.quantity(),
                reasoning,
            },
        }
    }
}

/// Prior steps plus the current market state, for continued THINK steps
fn trajectory_context(session: &Session) -> String {
    let mut context = session.trajectory.render_steps();
    context.push_str("\n**Current Market State:**\n");
    context.push_str(&format!(
        "  Portfolio Value: ${:.2}\n",
        session.portfolio.total_market_value()
    ));
    context.push_str(&format!(
        "  Holdings: {}\n",
        serde_json::to_string(&session.portfolio.holdings()).unwrap_or_default()
    ));
    context.push_str(&format!(
        "  Prices: {}",
        serde_json::to_string(&session.prices).unwrap_or_default()
    ));
    context
}

/// Apply a decided action to the session's portfolio.
///
/// A sell always closes the whole position; the decided quantity is
/// ignored. `Ok(None)` means nothing to do.
pub fn apply_action(session: &mut Session, action: &Action) -> Result<Option<Fill>, TradeError> {
    if action.kind == ActionKind::Done {
        return Ok(None);
    }

    let price = session
        .latest_price(&action.symbol)
        .ok_or_else(|| TradeError::NoPrice(action.symbol.clone()))?;

    match action.kind {
        ActionKind::Buy => session
            .portfolio
            .buy(&action.symbol, action.quantity, price)
            .map(Some),
        ActionKind::Sell => session
            .portfolio
            .sell(&action.symbol, None, price)
            .map(Some),
        ActionKind::Done => Ok(None),
    }
}

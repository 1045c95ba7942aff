//! Structured agent events
//!
//! The orchestrator reports progress through an `EventSink` instead of
//! printing. `TracingEventSink` turns events into log records;
//! `MemoryEventSink` keeps them for inspection.

use crate::agent::AgentPhase;
use crate::models::Action;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    RunStarted {
        run_id: Uuid,
        model_id: String,
        episodes: u32,
        symbols: Vec<String>,
        cash: f64,
        total_value: f64,
    },
    EpisodeStarted {
        episode: u32,
        day: u32,
    },
    Observed {
        day: u32,
        priced: usize,
        failed: Vec<String>,
        holdings_value: f64,
    },
    Thought {
        day: u32,
        step: usize,
        action: String,
        reasoning: String,
    },
    Routed {
        from: AgentPhase,
        to: AgentPhase,
        forced: bool,
    },
    /// DECIDE received a trade verb outside buy/sell/done
    DecisionCoerced {
        day: u32,
        original: String,
    },
    Decided {
        day: u32,
        action: Action,
    },
    Acted {
        day: u32,
        action: Action,
        executed: bool,
        detail: String,
        cash: f64,
        total_value: f64,
    },
    EpisodeFinished {
        episode: u32,
        day: u32,
        holdings_value: f64,
        cash: f64,
        total_value: f64,
        actions_taken: usize,
    },
    RunFinished {
        run_id: Uuid,
        days: u32,
        actions_taken: usize,
        cash: f64,
        total_value: f64,
    },
}

/// Receiver for agent events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &AgentEvent);
}

/// Logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &AgentEvent) {
        match event {
            AgentEvent::RunStarted {
                run_id,
                model_id,
                episodes,
                symbols,
                cash,
                total_value,
            } => info!(
                %run_id,
                model = %model_id,
                episodes,
                ?symbols,
                cash,
                total_value,
                "Trading agent start"
            ),
            AgentEvent::EpisodeStarted { episode, day } => {
                info!(episode, day, "Episode started")
            }
            AgentEvent::Observed {
                day,
                priced,
                failed,
                holdings_value,
            } => info!(day, priced, ?failed, holdings_value, "[OBSERVE] market snapshot"),
            AgentEvent::Thought {
                step,
                action,
                reasoning,
                ..
            } => info!(step, action = %action, reasoning = %reasoning, "[THINK]"),
            AgentEvent::Routed { from, to, forced } => {
                info!(from = %from, to = %to, forced, "[ROUTE]")
            }
            AgentEvent::DecisionCoerced { day, original } => warn!(
                day,
                original = %original,
                "[DECIDE] unrecognised trade action coerced to done"
            ),
            AgentEvent::Decided { action, .. } => info!(
                action = %action,
                reasoning = %action.reasoning,
                "[DECIDE] final action"
            ),
            AgentEvent::Acted {
                executed,
                detail,
                cash,
                total_value,
                ..
            } => info!(executed, detail = %detail, cash, total_value, "[ACT]"),
            AgentEvent::EpisodeFinished {
                episode,
                day,
                holdings_value,
                cash,
                total_value,
                actions_taken,
            } => info!(
                episode,
                day,
                holdings_value,
                cash,
                total_value,
                actions_taken,
                "Episode finished"
            ),
            AgentEvent::RunFinished {
                run_id,
                days,
                actions_taken,
                cash,
                total_value,
            } => info!(
                %run_id,
                days,
                actions_taken,
                cash,
                total_value,
                "Trading agent complete"
            ),
        }
    }
}

/// Keeps events in memory. Clones share the same buffer.
#[derive(Debug, Default, Clone)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<AgentEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AgentEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, predicate: impl Fn(&AgentEvent) -> bool) -> usize {
        self.events
            .lock()
            .map(|events| events.iter().filter(|e| predicate(e)).count())
            .unwrap_or(0)
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &AgentEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Forwards each event to every inner sink in order
#[derive(Default)]
pub struct FanoutEventSink {
    sinks: Vec<Box<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn with(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl EventSink for FanoutEventSink {
    fn emit(&self, event: &AgentEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_shares_buffer_across_clones() {
        let sink = MemoryEventSink::new();
        let fanout = FanoutEventSink::new()
            .with(TracingEventSink)
            .with(sink.clone());

        fanout.emit(&AgentEvent::EpisodeStarted { episode: 1, day: 1 });
        fanout.emit(&AgentEvent::EpisodeStarted { episode: 2, day: 2 });

        assert_eq!(sink.events().len(), 2);
        assert_eq!(
            sink.count(|e| matches!(e, AgentEvent::EpisodeStarted { day: 2, .. })),
            1
        );
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = AgentEvent::Routed {
            from: AgentPhase::Think,
            to: AgentPhase::Decide,
            forced: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "routed");
        assert_eq!(json["to"], "decide");
    }
}

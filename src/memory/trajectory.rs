//! Per-episode trajectory storage
//!
//! Ordered record of THINK steps. Capacity is enforced by the
//! orchestrator's routing, not here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One THINK iteration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrajectoryStep {
    /// 1-based, monotonic within an episode
    pub step: usize,
    /// Lower-cased routing tag the model returned
    pub action: String,
    pub reasoning: String,
    /// Trading day the step belongs to
    pub day: u32,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrajectoryMemory {
    steps: Vec<TrajectoryStep>,
}

impl TrajectoryMemory {
    pub fn new() -> Self {
        Self { steps: Vec::new() }
    }

    /// Append a step and return it
    pub fn record(
        &mut self,
        action: impl Into<String>,
        reasoning: impl Into<String>,
        day: u32,
    ) -> &TrajectoryStep {
        let step = TrajectoryStep {
            step: self.steps.len() + 1,
            action: action.into(),
            reasoning: reasoning.into(),
            day,
            recorded_at: Utc::now(),
        };
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    pub fn steps(&self) -> impl Iterator<Item = &TrajectoryStep> {
        self.steps.iter()
    }

    pub fn last(&self) -> Option<&TrajectoryStep> {
        self.steps.last()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Prior steps for the continuation prompt
    pub fn render_steps(&self) -> String {
        let mut out = String::from("**Prior Thinking Steps:**\n");
        for t in &self.steps {
            out.push_str(&format!("  Step {}: {}\n", t.step, t.action.to_uppercase()));
            out.push_str(&format!("    → {}\n", t.reasoning));
        }
        out
    }

    /// Condensed trajectory for the decision prompt; empty when nothing
    /// was recorded
    pub fn summary(&self) -> String {
        if self.steps.is_empty() {
            return String::new();
        }

        let mut out = String::from("**Thinking Trajectory:**\n");
        for t in &self.steps {
            out.push_str(&format!(
                "  Step {}: {} → {}\n",
                t.step,
                t.action.to_uppercase(),
                t.reasoning
            ));
        }
        out
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_steps_are_numbered_from_one() {
        let mut memory = TrajectoryMemory::new();
        assert_eq!(memory.record("think", "look at AAPL", 2).step, 1);
        assert_eq!(memory.record("observe", "prices stale", 2).step, 2);

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.last().unwrap().action, "observe");
        assert!(memory.steps().all(|s| s.day == 2));
    }

    #[test]
    fn test_render_steps() {
        let mut memory = TrajectoryMemory::new();
        memory.record("think", "AAPL above 50-day", 1);

        let rendered = memory.render_steps();
        assert!(rendered.starts_with("**Prior Thinking Steps:**"));
        assert!(rendered.contains("Step 1: THINK"));
        assert!(rendered.contains("→ AAPL above 50-day"));
    }

    #[test]
    fn test_summary() {
        let mut memory = TrajectoryMemory::new();
        assert_eq!(memory.summary(), "");

        memory.record("think", "a", 1);
        memory.record("decide", "b", 1);
        assert_eq!(
            memory.summary(),
            "**Thinking Trajectory:**\n  Step 1: THINK → a\n  Step 2: DECIDE → b\n"
        );
    }

    #[test]
    fn test_clear_restarts_numbering() {
        let mut memory = TrajectoryMemory::new();
        memory.record("think", "a", 1);
        memory.clear();

        assert!(memory.is_empty());
        assert_eq!(memory.record("think", "b", 2).step, 1);
    }
}

//! Agent Memory System
//!
//! Holds the reasoning trajectory the agent accumulates while thinking
//! through a single trading day.

pub mod trajectory;

pub use trajectory::{TrajectoryMemory, TrajectoryStep};

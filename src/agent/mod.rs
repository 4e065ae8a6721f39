//! Agent loop: iterate model completions and tool executions per user turn.

pub mod events;
pub mod runner;

pub use events::{LoopEvent, ProgressSender};
pub use runner::{LoopConfig, LoopError, LoopOutcome, ToolCallingLoop};

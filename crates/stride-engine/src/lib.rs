//! Stride Engine
//!
//! Drives a workflow's steps through the bounded-concurrency pool according
//! to the configured execution mode, feeding outputs forward when the mode
//! chains them, and publishing lifecycle events to the configured notifier.

mod engine;
mod error;

pub use engine::{EngineConfig, Isolation, RunResult, WorkflowEngine};
pub use error::EngineError;

//! Stride Config
//!
//! This crate contains the serializable workflow configuration types for
//! Stride. These types represent workflow definitions before they are handed
//! to the engine for execution.
//!
//! Configuration can be loaded from:
//! - JSON files (via CLI with `stride run workflow.json`)
//! - Any collaborator that produces the same shapes (parsing and schema
//!   validation live outside this crate)

mod enums;
mod options;
mod step;
mod workflow;

pub use enums::{BackoffKind, ExecutionMode};
pub use options::{
  EffectiveOptions, Options, StepOptions, TimeoutMs, DEFAULT_CONCURRENCY, DEFAULT_DELAY_MS,
  DEFAULT_OUTPUT_LIMIT_KB, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS,
};
pub use step::StepSpec;
pub use workflow::WorkflowConfig;

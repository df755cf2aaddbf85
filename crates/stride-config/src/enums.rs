use serde::{Deserialize, Serialize};

/// How the engine orders steps and routes outputs between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
  /// Strictly sequential; each step's input is the original input merged
  /// with the accumulated output of the steps before it.
  #[default]
  Chained,
  /// Strictly sequential, but steps do not see each other's output.
  Fanout,
  /// Bounded parallel fan-out; steps receive the original input.
  Async,
  /// Steps run in parallel batches; each batch's merged outputs feed the
  /// next batch's input.
  Batched,
}

/// Named delay strategy applied between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
  Manual,
  Linear,
  Squaring,
  #[default]
  Exponential,
}

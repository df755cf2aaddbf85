use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stride_config::StepSpec;

use crate::wrapped::WrappedError;

/// Execution state of a step.
///
/// Transitions are monotonic along
/// `Pending -> (Skipped | Running) -> (Retrying -> Running)* -> (Completed | Failed)`;
/// a step never re-enters Pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
  #[default]
  Pending,
  Running,
  Retrying,
  Skipped,
  Completed,
  Failed,
}

impl StepState {
  pub fn is_terminal(&self) -> bool {
    matches!(
      self,
      StepState::Skipped | StepState::Completed | StepState::Failed
    )
  }
}

/// The option values a step actually ran with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AppliedOptions {
  pub retries: u32,
  pub timeout_ms: u64,
}

/// A step plus its execution state.
///
/// Created from a [`StepSpec`] at scheduling time; each lifecycle phase
/// takes the value and returns the next one, so exactly one in-flight task
/// owns a given StepRuntime end-to-end.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRuntime {
  #[serde(flatten)]
  pub spec: StepSpec,
  #[serde(default)]
  pub state: StepState,
  /// Resolved skip condition; the step runs unless this is `false`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub condition: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub input: Option<Value>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub output: Option<Value>,
  #[serde(default)]
  pub attempt: u32,
  /// Failures in observation order, oldest first.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub errors: Vec<WrappedError>,
  /// The first recorded failure, kept in sync with `errors`.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<WrappedError>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub started_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ended_at: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub duration_ms: Option<u64>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub options: Option<AppliedOptions>,
}

impl StepRuntime {
  pub fn new(spec: StepSpec) -> Self {
    Self {
      spec,
      state: StepState::Pending,
      condition: None,
      input: None,
      output: None,
      attempt: 0,
      errors: Vec::new(),
      error: None,
      started_at: None,
      ended_at: None,
      duration_ms: None,
      options: None,
    }
  }

  pub fn name(&self) -> &str {
    &self.spec.name
  }

  /// Re-derive `error` from the front of `errors`.
  pub fn sync_error(&mut self) {
    self.error = self.errors.first().cloned();
  }
}

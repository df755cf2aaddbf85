//! Lifecycle events and notifiers for observability.
//!
//! Events are emitted during workflow execution to allow consumers to
//! observe progress, persist state, stream to UIs, etc. The same shapes
//! travel the supervisor's message channel when a step runs isolated.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::retry::RetryAttempt;
use crate::wrapped::WrappedError;

/// Events emitted during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload", rename_all = "snake_case")]
pub enum WorkflowEvent {
  /// The run has started.
  WorkflowStarted { run_id: String, workflow: String },

  /// The run has finished; `failed` is true iff any step ended Failed.
  WorkflowCompleted { run_id: String, failed: bool },

  /// A step has started executing.
  StepStarted { run_id: String, step: String },

  /// A step has completed successfully.
  StepCompleted {
    run_id: String,
    step: String,
    output: Option<serde_json::Value>,
  },

  /// A step attempt failed and will (or will not) be retried.
  StepRetrying {
    run_id: String,
    step: String,
    attempt: RetryAttempt,
  },

  /// A step ended in the Failed state.
  StepFailed {
    run_id: String,
    step: String,
    error: WrappedError,
  },

  /// A step could not be run at all (module/function resolution, channel
  /// breakage); fatal without consuming a retry attempt.
  StepError {
    run_id: String,
    step: String,
    error: WrappedError,
  },
}

impl WorkflowEvent {
  /// The step this event concerns, when it concerns one.
  pub fn step(&self) -> Option<&str> {
    match self {
      WorkflowEvent::StepStarted { step, .. }
      | WorkflowEvent::StepCompleted { step, .. }
      | WorkflowEvent::StepRetrying { step, .. }
      | WorkflowEvent::StepFailed { step, .. }
      | WorkflowEvent::StepError { step, .. } => Some(step),
      _ => None,
    }
  }
}

/// Trait for receiving workflow events.
///
/// The engine calls `notify` for each event - implementations decide what
/// to do with them (persist, broadcast, log, ignore, etc.).
pub trait Notifier: Send + Sync {
  fn notify(&self, event: WorkflowEvent);
}

/// A no-op notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
  fn notify(&self, _event: WorkflowEvent) {
    // Intentionally empty
  }
}

/// A notifier that sends events to an unbounded channel.
///
/// Use this when events are consumed asynchronously (persisted, streamed
/// to a UI, forwarded over the supervisor channel).
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<WorkflowEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
    Self { sender }
  }
}

impl Notifier for ChannelNotifier {
  fn notify(&self, event: WorkflowEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}

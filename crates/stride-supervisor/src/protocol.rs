//! The supervisor/child message protocol.
//!
//! One JSON frame per line. The supervisor writes a single `start` frame to
//! the child's stdin; the child answers with any number of `event` frames
//! followed by exactly one `result` or `error` frame on stdout. Stdout
//! lines that do not parse as frames are treated as child log output.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use stride_config::WorkflowConfig;
use stride_runtime::{StepRuntime, WorkflowEvent, WrappedError};

/// Everything the child needs to run one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPayload {
  pub step: StepRuntime,
  pub config: WorkflowConfig,
  pub run_id: String,
  pub fingerprint: String,
  pub output_dir: PathBuf,
  /// Steps completed before this one, for the resolver context.
  pub steps: Vec<StepRuntime>,
  /// Mode-routed input merged under the step's own resolved input.
  pub base_input: Value,
}

/// A frame on the supervisor/child channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
  /// Supervisor -> child: run this step.
  Start(StartPayload),
  /// Child -> supervisor: a lifecycle event, forwarded upward and used to
  /// push out the liveness deadline.
  Event { event: WorkflowEvent },
  /// Child -> supervisor: the step finished (Completed, Failed or Skipped).
  Result { step: StepRuntime },
  /// Child -> supervisor: the step could not be run at all.
  Error { error: WrappedError },
}

impl Message {
  /// Encode as a single channel line.
  pub fn to_line(&self) -> Result<String, serde_json::Error> {
    serde_json::to_string(self)
  }

  /// Decode a channel line; `None` for anything that is not a frame.
  pub fn from_line(line: &str) -> Option<Self> {
    serde_json::from_str(line.trim()).ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use stride_runtime::StepState;

  fn step() -> StepRuntime {
    StepRuntime::new(serde_json::from_value(json!({"name": "s", "action": "noop"})).unwrap())
  }

  #[test]
  fn frames_round_trip() {
    let mut finished = step();
    finished.state = StepState::Completed;
    finished.output = Some(json!({"ok": true}));

    let line = Message::Result { step: finished }.to_line().unwrap();
    match Message::from_line(&line) {
      Some(Message::Result { step }) => {
        assert_eq!(step.state, StepState::Completed);
        assert_eq!(step.output, Some(json!({"ok": true})));
      }
      other => panic!("unexpected frame: {:?}", other),
    }
  }

  #[test]
  fn event_frames_carry_name_and_payload() {
    let line = Message::Event {
      event: WorkflowEvent::StepStarted {
        run_id: "r".to_string(),
        step: "s".to_string(),
      },
    }
    .to_line()
    .unwrap();

    let value: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(value["type"], "event");
    assert_eq!(value["event"]["name"], "step_started");
  }

  #[test]
  fn log_lines_are_not_frames() {
    assert!(Message::from_line("plain child output").is_none());
    assert!(Message::from_line("{\"unrelated\": true}").is_none());
  }
}

use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::enums::ExecutionMode;
use crate::options::Options;
use crate::step::StepSpec;

/// A declared workflow: named, versioned, with an ordered list of steps.
///
/// Immutable once validated; the engine owns it for the lifetime of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
  pub name: String,
  pub version: String,
  /// Identifier of the action module the steps resolve their functions from.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub runner: Option<String>,
  #[serde(default)]
  pub mode: ExecutionMode,
  #[serde(default, skip_serializing_if = "is_default_options")]
  pub options: Options,
  /// Workflow-level data context, visible to every step.
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub data: Map<String, serde_json::Value>,
  pub steps: Vec<StepSpec>,
}

fn is_default_options(options: &Options) -> bool {
  *options == Options::default()
}

impl WorkflowConfig {
  /// Look up a step by name.
  pub fn get_step(&self, name: &str) -> Option<&StepSpec> {
    self.steps.iter().find(|s| s.name == name)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::enums::BackoffKind;

  #[test]
  fn full_workflow_deserializes() {
    let config: WorkflowConfig = serde_json::from_str(
      r#"{
        "name": "signup",
        "version": "1.0.0",
        "mode": "batched",
        "options": {"timeout": "5s", "retries": 2, "backoff": "linear", "concurrency": 3},
        "data": {"region": "eu"},
        "steps": [
          {"name": "create", "action": "create_user"},
          {"name": "notify", "action": "send_email", "enabled": false}
        ]
      }"#,
    )
    .unwrap();

    assert_eq!(config.mode, ExecutionMode::Batched);
    assert_eq!(config.options.timeout.unwrap().as_millis(), 5000);
    assert_eq!(config.options.backoff, Some(BackoffKind::Linear));
    assert_eq!(config.steps.len(), 2);
    assert_eq!(config.steps[1].enabled, Some(false));
    assert!(config.get_step("create").is_some());
    assert!(config.get_step("missing").is_none());
  }

  #[test]
  fn mode_defaults_to_chained() {
    let config: WorkflowConfig = serde_json::from_str(
      r#"{"name": "n", "version": "0.1.0", "steps": []}"#,
    )
    .unwrap();

    assert_eq!(config.mode, ExecutionMode::Chained);
  }
}

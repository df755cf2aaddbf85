use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use stride_config::WorkflowConfig;

use crate::step::StepRuntime;

/// Environment variable carrying the run identifier into isolated steps.
pub const ENV_RUN_ID: &str = "STRIDE_RUN_ID";
/// Environment variable carrying the config fingerprint into isolated steps.
pub const ENV_FINGERPRINT: &str = "STRIDE_FINGERPRINT";

/// Per-run state shared with every step's resolver evaluation.
///
/// Created once per run. The accumulated step list is append-only: a step's
/// resolver only ever reads already-completed steps.
#[derive(Debug, Clone)]
pub struct RunContext {
  pub run_id: String,
  /// Content fingerprint of the resolved config (sha256 hex).
  pub fingerprint: String,
  pub started_at: DateTime<Utc>,
  pub output_dir: PathBuf,
  pub config: Arc<WorkflowConfig>,
  /// Steps finished so far, in completion order.
  pub steps: Vec<StepRuntime>,
}

impl RunContext {
  pub fn new(config: Arc<WorkflowConfig>, output_dir: PathBuf) -> Self {
    let fingerprint = fingerprint(&config);
    Self {
      run_id: uuid::Uuid::new_v4().to_string(),
      fingerprint,
      started_at: Utc::now(),
      output_dir,
      config,
      steps: Vec::new(),
    }
  }

  /// Rebuild a context inside an isolated child from the exported identity.
  pub fn for_child(
    config: Arc<WorkflowConfig>,
    run_id: String,
    fingerprint: String,
    output_dir: PathBuf,
  ) -> Self {
    Self {
      run_id,
      fingerprint,
      started_at: Utc::now(),
      output_dir,
      config,
      steps: Vec::new(),
    }
  }

  /// Record a finished step so later steps can reference it.
  pub fn push_step(&mut self, step: StepRuntime) {
    self.steps.push(step);
  }

  /// Ambient workflow facts exposed to the resolver.
  pub fn workflow_value(&self) -> Value {
    json!({
      "name": self.config.name,
      "version": self.config.version,
      "run_id": self.run_id,
      "fingerprint": self.fingerprint,
      "started_at": self.started_at.to_rfc3339(),
    })
  }

  /// Completed steps keyed by name, exposed to the resolver.
  pub fn steps_value(&self) -> Value {
    let map: serde_json::Map<String, Value> = self
      .steps
      .iter()
      .map(|step| {
        (
          step.name().to_string(),
          json!({
            "state": step.state,
            "output": step.output,
          }),
        )
      })
      .collect();
    Value::Object(map)
  }
}

/// sha256 hex of the canonical JSON serialization of the config.
fn fingerprint(config: &WorkflowConfig) -> String {
  let serialized = serde_json::to_vec(config).unwrap_or_default();
  let mut hasher = Sha256::new();
  hasher.update(&serialized);
  format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn config() -> Arc<WorkflowConfig> {
    Arc::new(
      serde_json::from_value(json!({
        "name": "demo",
        "version": "1.0.0",
        "steps": [{"name": "one", "action": "noop"}]
      }))
      .unwrap(),
    )
  }

  #[test]
  fn fingerprint_is_stable_per_config() {
    let a = RunContext::new(config(), PathBuf::from("/tmp/out"));
    let b = RunContext::new(config(), PathBuf::from("/tmp/out"));
    assert_eq!(a.fingerprint, b.fingerprint);
    assert_ne!(a.run_id, b.run_id);
  }

  #[test]
  fn steps_value_keys_by_name() {
    let mut ctx = RunContext::new(config(), PathBuf::from("/tmp/out"));
    let mut step = crate::step::StepRuntime::new(
      serde_json::from_value(json!({"name": "one", "action": "noop"})).unwrap(),
    );
    step.output = Some(json!({"n": 1}));
    ctx.push_step(step);

    let value = ctx.steps_value();
    assert_eq!(value["one"]["output"]["n"], 1);
  }
}

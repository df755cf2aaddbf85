//! Step lifecycle: prepare, run, finalize.
//!
//! Each phase takes a [`StepRuntime`] by value and returns the next record,
//! so a step is only ever mutated by the task that owns it.

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{error, info, instrument};

use stride_config::EffectiveOptions;
use stride_resolver::{deep_merge, resolve, resolve_deep, ResolveError};

use crate::backoff::delay_for;
use crate::context::RunContext;
use crate::events::{Notifier, WorkflowEvent};
use crate::guard::data_size_regulator;
use crate::registry::Action;
use crate::retry::{retry, RetryAttempt, RetryOptions};
use crate::step::{AppliedOptions, StepRuntime, StepState};

/// Compute a step's data, input and skip condition from the run context.
///
/// Workflow-level data is deep-merged under the step's own data (step wins
/// on conflicting leaves), the step's expressions are resolved against a
/// context exposing `data`, `step`, `workflow` and the completed `steps`,
/// and the input becomes the merged data deep-merged with the resolved
/// `with` map. The raw `after` map is carried through untouched.
pub fn prepare(mut step: StepRuntime, ctx: &RunContext) -> Result<StepRuntime, ResolveError> {
  let workflow_data = Value::Object(ctx.config.data.clone());
  let step_data = Value::Object(step.spec.data.clone());
  let merged = deep_merge(&workflow_data, &step_data);

  // The step is visible to its own expressions, minus the `after` map,
  // which is resolved only once the step has an output.
  let mut bare = step.spec.clone();
  bare.after = Map::new();
  let step_value = serde_json::to_value(&bare).unwrap_or(Value::Null);

  let base_context = json!({
    "data": merged,
    "step": step_value,
    "workflow": ctx.workflow_value(),
    "steps": ctx.steps_value(),
  });

  let resolved_data = resolve_deep(&merged, &base_context)?;

  let mut context = base_context;
  context["data"] = resolved_data.clone();

  let resolved_with = resolve_deep(&Value::Object(step.spec.with.clone()), &context)?;

  step.condition = match &step.spec.if_expr {
    Some(expression) => Some(resolve(expression, &context)?),
    None => None,
  };

  step.input = Some(deep_merge(&resolved_data, &resolved_with));

  if let Value::Object(map) = resolved_data {
    step.spec.data = map;
  }
  if let Value::Object(map) = resolved_with {
    step.spec.with = map;
  }

  Ok(step)
}

/// Prepare a step and merge a mode-routed base input under its resolved
/// input. The step's own `data`/`with` values win on conflicting leaves.
pub fn prepare_with_base(
  step: StepRuntime,
  ctx: &RunContext,
  base: &Value,
) -> Result<StepRuntime, ResolveError> {
  let mut prepared = prepare(step, ctx)?;
  let own = prepared.input.take().unwrap_or_else(|| json!({}));
  prepared.input = Some(deep_merge(base, &own));
  Ok(prepared)
}

/// Whether a prepared step should execute.
///
/// Only an explicit `false` - from the resolved condition or the `enabled`
/// flag - suppresses execution; absent or null values do not.
pub fn should_run(step: &StepRuntime) -> bool {
  if step.spec.enabled == Some(false) {
    return false;
  }
  !matches!(step.condition, Some(Value::Bool(false)))
}

/// Execute a prepared step through the retry loop.
///
/// Skipped steps return immediately without consuming an attempt. Scalar
/// and array results are wrapped as `{"data": …}` before being stored;
/// the serialized size of the raw result is checked once against the
/// configured ceiling and can turn a successful execution into a failure.
#[instrument(
  name = "step_run",
  skip(step, action, options, notifier),
  fields(run_id = %run_id, step = %step.name())
)]
pub async fn run(
  mut step: StepRuntime,
  action: &dyn Action,
  options: EffectiveOptions,
  run_id: &str,
  notifier: &dyn Notifier,
) -> StepRuntime {
  if !should_run(&step) {
    info!(step = %step.name(), "step skipped");
    step.state = StepState::Skipped;
    return step;
  }

  step.state = StepState::Running;
  step.started_at = Some(Utc::now());
  info!(step = %step.name(), input = ?step.input, "step started");
  notifier.notify(WorkflowEvent::StepStarted {
    run_id: run_id.to_string(),
    step: step.name().to_string(),
  });

  let step_name = step.name().to_string();
  let mut observed: Vec<RetryAttempt> = Vec::new();
  let input = step.input.clone().unwrap_or_else(|| json!({}));

  let outcome = {
    let retry_options = RetryOptions {
      timeout_ms: Some(options.timeout_ms),
      delay: Some(Box::new(move |attempt| {
        delay_for(options.backoff, attempt, options.delay_ms)
      })),
      on_attempt: Some(Box::new(|attempt: RetryAttempt| {
        notifier.notify(WorkflowEvent::StepRetrying {
          run_id: run_id.to_string(),
          step: step_name.clone(),
          attempt: attempt.clone(),
        });
        observed.push(attempt);
      })),
    };

    retry(input, action, options.retries, retry_options).await
  };

  step.attempt = observed.len() as u32;
  step
    .errors
    .extend(observed.into_iter().map(|attempt| attempt.error));
  step.options = Some(AppliedOptions {
    retries: options.retries,
    timeout_ms: options.timeout_ms,
  });

  match outcome.data {
    Some(raw) => match data_size_regulator(wrap_output(raw), options.output_limit_kb) {
      Ok(output) => {
        step.state = StepState::Completed;
        step.output = Some(output.clone());
        info!(step = %step.name(), "step completed");
        notifier.notify(WorkflowEvent::StepCompleted {
          run_id: run_id.to_string(),
          step: step.name().to_string(),
          output: Some(output),
        });
      }
      Err(error) => {
        step.state = StepState::Failed;
        step.errors.push(error.clone());
        error!(step = %step.name(), error = %error, "step failed");
        notifier.notify(WorkflowEvent::StepFailed {
          run_id: run_id.to_string(),
          step: step.name().to_string(),
          error,
        });
      }
    },
    None => {
      step.state = StepState::Failed;
      if step.errors.is_empty() {
        if let Some(error) = outcome.error.clone() {
          step.errors.push(error);
        }
      }
      if let Some(error) = outcome.error {
        error!(step = %step.name(), error = %error, "step failed");
        notifier.notify(WorkflowEvent::StepFailed {
          run_id: run_id.to_string(),
          step: step.name().to_string(),
          error,
        });
      }
    }
  }

  let ended = Utc::now();
  step.duration_ms = step
    .started_at
    .map(|started| (ended - started).num_milliseconds().max(0) as u64);
  step.ended_at = Some(ended);
  step.sync_error();

  step
}

/// Apply the step's `after` transforms to its output.
///
/// The `after` map is resolved against a context exposing the step's input
/// as `data` and its output as `output`; a non-empty resolution replaces
/// the output and clears `after`. Always leaves `error` in sync.
pub fn finalize(mut step: StepRuntime) -> Result<StepRuntime, ResolveError> {
  if !step.spec.after.is_empty() {
    let context = json!({
      "data": step.input,
      "output": step.output,
    });

    let resolved = resolve_deep(&Value::Object(step.spec.after.clone()), &context)?;

    if let Value::Object(map) = resolved {
      if !map.is_empty() && step.output.is_some() {
        step.output = Some(Value::Object(map));
        step.spec.after = Map::new();
      }
    }
  }

  step.sync_error();
  Ok(step)
}

/// Scalar and array results are wrapped; object-shaped results are stored
/// as-is.
fn wrap_output(raw: Value) -> Value {
  match raw {
    Value::Number(_) | Value::String(_) | Value::Bool(_) | Value::Array(_) => {
      json!({ "data": raw })
    }
    other => other,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::events::NoopNotifier;
  use crate::registry::ActionRegistry;
  use crate::wrapped::{ActionError, ErrorKind};
  use std::path::PathBuf;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use stride_config::WorkflowConfig;

  fn context(config_json: Value) -> RunContext {
    let config: WorkflowConfig = serde_json::from_value(config_json).unwrap();
    RunContext::new(Arc::new(config), PathBuf::from("/tmp/out"))
  }

  fn step_runtime(step_json: Value) -> StepRuntime {
    StepRuntime::new(serde_json::from_value(step_json).unwrap())
  }

  fn effective() -> EffectiveOptions {
    EffectiveOptions {
      timeout_ms: 1000,
      retries: 1,
      backoff: Default::default(),
      delay_ms: 0,
      output_limit_kb: 256,
    }
  }

  #[test]
  fn prepare_merges_data_and_with() {
    let ctx = context(json!({
      "name": "wf", "version": "1", "data": {"region": "eu", "tier": "free"},
      "steps": []
    }));
    let step = step_runtime(json!({
      "name": "s", "action": "noop",
      "data": {"tier": "pro"},
      "with": {"region_upper": "{{ data.region | upper }}"}
    }));

    let prepared = prepare(step, &ctx).unwrap();
    let input = prepared.input.unwrap();
    assert_eq!(input["region"], "eu");
    assert_eq!(input["tier"], "pro");
    assert_eq!(input["region_upper"], "EU");
  }

  #[test]
  fn prepare_resolves_the_condition() {
    let ctx = context(json!({
      "name": "wf", "version": "1", "data": {"flag": false}, "steps": []
    }));
    let step = step_runtime(json!({
      "name": "s", "action": "noop", "if": "{{ data.flag }}"
    }));

    let prepared = prepare(step, &ctx).unwrap();
    assert_eq!(prepared.condition, Some(json!(false)));
    assert!(!should_run(&prepared));
  }

  #[test]
  fn missing_condition_path_resolves_null_and_runs() {
    let ctx = context(json!({"name": "wf", "version": "1", "steps": []}));
    let step = step_runtime(json!({
      "name": "s", "action": "noop", "if": "{{ data.missing }}"
    }));

    let prepared = prepare(step, &ctx).unwrap();
    assert_eq!(prepared.condition, Some(json!(null)));
    assert!(should_run(&prepared));
  }

  #[test]
  fn undefined_condition_and_enabled_do_not_suppress() {
    let step = step_runtime(json!({"name": "s", "action": "noop"}));
    assert!(should_run(&step));
  }

  #[tokio::test]
  async fn skipped_steps_never_invoke_the_action() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();

    let mut registry = ActionRegistry::new();
    registry.register_fn("counted", move |_| {
      let calls = seen.clone();
      async move {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({}))
      }
    });
    let action = registry.get("counted").unwrap();

    let mut step = step_runtime(json!({"name": "s", "action": "counted", "enabled": false}));
    step.input = Some(json!({}));

    let finished = run(step, &*action, effective(), "r1", &NoopNotifier).await;

    assert_eq!(finished.state, StepState::Skipped);
    assert_eq!(finished.attempt, 0);
    assert!(finished.errors.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn scalar_results_are_wrapped() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("count", |_| async move { Ok(json!(3)) });
    let action = registry.get("count").unwrap();

    let step = step_runtime(json!({"name": "s", "action": "count"}));
    let finished = run(step, &*action, effective(), "r1", &NoopNotifier).await;

    assert_eq!(finished.state, StepState::Completed);
    assert_eq!(finished.output, Some(json!({"data": 3})));
    assert!(finished.duration_ms.is_some());
    assert_eq!(
      finished.options,
      Some(AppliedOptions {
        retries: 1,
        timeout_ms: 1000
      })
    );
  }

  #[tokio::test]
  async fn exhausted_retries_record_every_error() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("doomed", |_| async move {
      Err::<Value, _>(ActionError::msg("still broken"))
    });
    let action = registry.get("doomed").unwrap();

    let step = step_runtime(json!({"name": "s", "action": "doomed"}));
    let mut options = effective();
    options.retries = 3;

    let finished = run(step, &*action, options, "r1", &NoopNotifier).await;

    assert_eq!(finished.state, StepState::Failed);
    assert_eq!(finished.attempt, 3);
    assert_eq!(finished.errors.len(), 3);
    assert_eq!(finished.error.as_ref().unwrap().message, "still broken");
  }

  #[tokio::test]
  async fn oversized_output_fails_after_success() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("firehose", |_| async move {
      Ok(json!({"blob": "x".repeat(300 * 1024)}))
    });
    let action = registry.get("firehose").unwrap();

    let step = step_runtime(json!({"name": "s", "action": "firehose"}));
    let finished = run(step, &*action, effective(), "r1", &NoopNotifier).await;

    assert_eq!(finished.state, StepState::Failed);
    assert!(finished.output.is_none());
    assert_eq!(
      finished.error.as_ref().unwrap().kind(),
      ErrorKind::HardDataSize
    );
  }

  #[tokio::test]
  async fn finalize_replaces_output_and_clears_after() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("fetch", |_| async move {
      Ok(json!({"email": "a@b.c", "id": 9}))
    });
    let action = registry.get("fetch").unwrap();

    let mut step = step_runtime(json!({
      "name": "s", "action": "fetch",
      "after": {"contact": "{{ output.email }}"}
    }));
    step.input = Some(json!({}));

    let finished = run(step, &*action, effective(), "r1", &NoopNotifier).await;
    let finalized = finalize(finished).unwrap();

    assert_eq!(finalized.output, Some(json!({"contact": "a@b.c"})));
    assert!(finalized.spec.after.is_empty());
  }

  #[test]
  fn finalize_without_after_is_identity_on_output() {
    let mut step = step_runtime(json!({"name": "s", "action": "noop"}));
    step.output = Some(json!({"kept": true}));

    let finalized = finalize(step).unwrap();
    assert_eq!(finalized.output, Some(json!({"kept": true})));
  }
}

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use stride_config::{EffectiveOptions, ExecutionMode, StepSpec, WorkflowConfig};
use stride_resolver::deep_merge;
use stride_runtime::{
  finalize, prepare_with_base, run, run_with_concurrency, should_run, ActionHost, NoopNotifier,
  Notifier, RunContext, StepRuntime, StepState, WorkflowEvent,
};
use stride_supervisor::{supervise, StartPayload, SupervisorConfig};

use crate::error::EngineError;

/// Configuration for the workflow engine.
pub struct EngineConfig {
  /// Directory the run context points step outputs at.
  pub output_dir: PathBuf,
  pub isolation: Isolation,
}

/// Where step functions execute.
#[derive(Clone)]
pub enum Isolation {
  /// Steps run on the engine's own runtime.
  InProcess,
  /// Each step runs in a supervised OS process.
  Isolated(SupervisorConfig),
}

/// Result of a complete workflow run.
#[derive(Debug)]
pub struct RunResult {
  pub run_id: String,
  /// Mode-dependent final output: the accumulated chain/batch output, or
  /// step outputs keyed by name for the independent modes.
  pub output: Value,
  pub steps: Vec<StepRuntime>,
  /// True iff any step ended in the Failed state.
  pub failed: bool,
}

/// The workflow orchestration engine.
///
/// Generic over `N: Notifier` to allow different notification strategies.
/// Use `WorkflowEngine::new()` for a default engine with no-op
/// notifications, or `WorkflowEngine::with_notifier()` to observe events.
pub struct WorkflowEngine<N: Notifier = NoopNotifier> {
  host: Arc<ActionHost>,
  notifier: Arc<N>,
  config: EngineConfig,
}

impl WorkflowEngine<NoopNotifier> {
  /// Create a new engine with no-op notifications.
  pub fn new(host: Arc<ActionHost>, config: EngineConfig) -> Self {
    Self::with_notifier(host, config, NoopNotifier)
  }
}

impl<N: Notifier + 'static> WorkflowEngine<N> {
  /// Create a new engine with a custom notifier.
  pub fn with_notifier(host: Arc<ActionHost>, config: EngineConfig, notifier: N) -> Self {
    Self {
      host,
      notifier: Arc::new(notifier),
      config,
    }
  }

  /// Execute a workflow with the given input.
  #[instrument(
    name = "workflow_execute",
    skip(self, workflow, input, cancel),
    fields(workflow = %workflow.name, mode = ?workflow.mode)
  )]
  pub async fn execute(
    &self,
    workflow: WorkflowConfig,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    let config = Arc::new(workflow);
    let ctx = RunContext::new(config.clone(), self.config.output_dir.clone());
    let run_id = ctx.run_id.clone();

    info!(run_id = %run_id, workflow = %config.name, "workflow_started");
    self.notifier.notify(WorkflowEvent::WorkflowStarted {
      run_id: run_id.clone(),
      workflow: config.name.clone(),
    });

    let result = self.run_steps(config, ctx, input, cancel).await;

    match &result {
      Ok(run) => {
        info!(run_id = %run_id, failed = run.failed, "workflow_completed");
        self.notifier.notify(WorkflowEvent::WorkflowCompleted {
          run_id: run_id.clone(),
          failed: run.failed,
        });
      }
      Err(e) => {
        error!(run_id = %run_id, error = %e, "workflow_failed");
      }
    }

    result
  }

  /// Dispatch the step list per the configured execution mode.
  async fn run_steps(
    &self,
    config: Arc<WorkflowConfig>,
    ctx: RunContext,
    input: Value,
    cancel: CancellationToken,
  ) -> Result<RunResult, EngineError> {
    let run_id = ctx.run_id.clone();
    let specs = config.steps.clone();
    let concurrency = config.options.concurrency();
    let shared = Arc::new(Mutex::new(ctx));

    match config.mode {
      ExecutionMode::Chained => {
        let state = self.wave_state(shared, input, true, &cancel);
        let steps = run_wave(state.clone(), specs, 1).await?;
        let output = state.carry.lock().unwrap().clone();
        Ok(build_result(run_id, steps, output))
      }
      ExecutionMode::Fanout => {
        let state = self.wave_state(shared, input, false, &cancel);
        let steps = run_wave(state, specs, 1).await?;
        let output = outputs_by_name(&steps);
        Ok(build_result(run_id, steps, output))
      }
      ExecutionMode::Async => {
        let state = self.wave_state(shared, input, false, &cancel);
        let steps = run_wave(state, specs, concurrency).await?;
        let output = outputs_by_name(&steps);
        Ok(build_result(run_id, steps, output))
      }
      ExecutionMode::Batched => {
        let mut current = input;
        let mut accumulated = json!({});
        let mut all_steps = Vec::new();

        // Batches run sequentially; steps within a batch in parallel.
        for batch in specs.chunks(concurrency) {
          if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
          }

          let state = self.wave_state(shared.clone(), current.clone(), false, &cancel);
          let steps = run_wave(state, batch.to_vec(), batch.len()).await?;

          let merged = steps
            .iter()
            .filter(|step| step.state == StepState::Completed)
            .filter_map(|step| step.output.as_ref())
            .fold(json!({}), |acc, output| deep_merge(&acc, output));

          accumulated = deep_merge(&accumulated, &merged);
          current = deep_merge(&current, &merged);
          all_steps.extend(steps);
        }

        Ok(build_result(run_id, all_steps, accumulated))
      }
    }
  }

  fn wave_state(
    &self,
    shared: Arc<Mutex<RunContext>>,
    base_input: Value,
    chained: bool,
    cancel: &CancellationToken,
  ) -> Arc<WaveState<N>> {
    Arc::new(WaveState {
      host: self.host.clone(),
      notifier: self.notifier.clone(),
      shared,
      carry: Mutex::new(json!({})),
      base_input,
      chained,
      isolation: self.config.isolation.clone(),
      cancel: cancel.clone(),
    })
  }
}

/// Everything a pooled step task needs, shared across one wave.
struct WaveState<N: Notifier> {
  host: Arc<ActionHost>,
  notifier: Arc<N>,
  shared: Arc<Mutex<RunContext>>,
  /// Accumulated chain output (chained mode only).
  carry: Mutex<Value>,
  base_input: Value,
  chained: bool,
  isolation: Isolation,
  cancel: CancellationToken,
}

async fn run_wave<N: Notifier + 'static>(
  state: Arc<WaveState<N>>,
  specs: Vec<StepSpec>,
  limit: usize,
) -> Result<Vec<StepRuntime>, EngineError> {
  run_with_concurrency(specs, limit, move |spec, _index| {
    run_step_task(state.clone(), spec)
  })
  .await
}

/// Run one step end-to-end: prepare, run (in-process or supervised),
/// finalize, then fold its output into the shared run state.
async fn run_step_task<N: Notifier + 'static>(
  state: Arc<WaveState<N>>,
  spec: StepSpec,
) -> Result<StepRuntime, EngineError> {
  if state.cancel.is_cancelled() {
    return Err(EngineError::Cancelled);
  }

  let ctx_snapshot = state.shared.lock().unwrap().clone();
  let run_id = ctx_snapshot.run_id.clone();
  let step_name = spec.name.clone();

  let base = if state.chained {
    let carry = state.carry.lock().unwrap();
    deep_merge(&state.base_input, &carry)
  } else {
    state.base_input.clone()
  };

  let step = StepRuntime::new(spec);

  let finished = match &state.isolation {
    Isolation::InProcess => {
      let prepared =
        prepare_with_base(step, &ctx_snapshot, &base).map_err(|source| EngineError::Resolve {
          step: step_name.clone(),
          source,
        })?;
      let options = EffectiveOptions::resolve(&ctx_snapshot.config.options, &prepared.spec.options);

      let ran = if !should_run(&prepared) {
        let mut skipped = prepared;
        skipped.state = StepState::Skipped;
        skipped
      } else {
        match state
          .host
          .resolve(ctx_snapshot.config.runner.as_deref(), &prepared.spec.action)
        {
          Ok(action) => {
            run(prepared, &*action, options, &run_id, state.notifier.as_ref()).await
          }
          Err(error) => {
            // Fatal resolution failure: no retry attempt is consumed.
            state.notifier.notify(WorkflowEvent::StepError {
              run_id: run_id.clone(),
              step: step_name.clone(),
              error: error.clone(),
            });
            let mut failed = prepared;
            failed.state = StepState::Failed;
            failed.errors.push(error);
            failed.sync_error();
            failed
          }
        }
      };

      finalize(ran).map_err(|source| EngineError::Resolve {
        step: step_name.clone(),
        source,
      })?
    }
    Isolation::Isolated(supervisor_config) => {
      let timeout_ms = step
        .spec
        .options
        .timeout
        .or(ctx_snapshot.config.options.timeout)
        .map(|t| t.as_millis());

      let start = StartPayload {
        config: (*ctx_snapshot.config).clone(),
        run_id: run_id.clone(),
        fingerprint: ctx_snapshot.fingerprint.clone(),
        output_dir: ctx_snapshot.output_dir.clone(),
        steps: ctx_snapshot.steps.clone(),
        base_input: base,
        step,
      };

      let supervised = supervise(
        supervisor_config,
        start,
        timeout_ms,
        state.notifier.as_ref(),
      )
      .await
      .map_err(|source| EngineError::Supervision {
        step: step_name.clone(),
        source,
      })?;

      supervised.step
    }
  };

  if state.chained && finished.state == StepState::Completed {
    if let Some(output) = &finished.output {
      let mut carry = state.carry.lock().unwrap();
      let merged = deep_merge(&carry, output);
      *carry = merged;
    }
  }

  state.shared.lock().unwrap().push_step(finished.clone());

  Ok(finished)
}

fn outputs_by_name(steps: &[StepRuntime]) -> Value {
  let map: serde_json::Map<String, Value> = steps
    .iter()
    .map(|step| {
      (
        step.name().to_string(),
        step.output.clone().unwrap_or(Value::Null),
      )
    })
    .collect();
  Value::Object(map)
}

fn build_result(run_id: String, steps: Vec<StepRuntime>, output: Value) -> RunResult {
  let failed = steps.iter().any(|step| step.state == StepState::Failed);
  RunResult {
    run_id,
    output,
    steps,
    failed,
  }
}

//! The parent side of process isolation.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use stride_runtime::{
  ErrorKind, Notifier, StepRuntime, StepState, WorkflowEvent, WrappedError, ENV_FINGERPRINT,
  ENV_RUN_ID,
};

use crate::error::SupervisorError;
use crate::protocol::{Message, StartPayload};

/// Slack added to the deadline after a "step started" signal.
const START_GRACE_MS: u64 = 1000;
/// Slack added to the deadline after a "step retrying" signal, on top of
/// the announced retry delay.
const RETRY_GRACE_MS: u64 = 500;

/// How to launch the isolated step process.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
  /// Executable that speaks the step-host protocol (usually the current
  /// binary with a `step-host` argument).
  pub program: PathBuf,
  pub args: Vec<String>,
  /// Address-space cap applied to the child before exec (unix only).
  pub memory_limit_mb: Option<u64>,
}

/// What came back from an isolated step run.
#[derive(Debug)]
pub struct Supervised {
  pub step: StepRuntime,
  /// True when the supervisor had to force the outcome: a missed deadline
  /// or a child-reported error.
  pub fatal: bool,
  pub errors: Vec<WrappedError>,
}

/// Run one step in an isolated process.
///
/// The child receives the start frame on stdin and reports events and its
/// final result on stdout; stderr and non-frame stdout lines are forwarded
/// into the logs. If `timeout_ms` is set, the child must produce a result
/// or a liveness signal before the adaptive deadline or it is killed.
#[instrument(
  name = "step_supervise",
  skip(config, start, notifier),
  fields(run_id = %start.run_id, step = %start.step.name())
)]
pub async fn supervise(
  config: &SupervisorConfig,
  start: StartPayload,
  timeout_ms: Option<u64>,
  notifier: &dyn Notifier,
) -> Result<Supervised, SupervisorError> {
  let step_name = start.step.name().to_string();
  let run_id = start.run_id.clone();

  let mut child = spawn_child(config, &start)?;

  // Hand the step to the child. A child that dies before reading the frame
  // surfaces through the channel-closed path, not as a write error.
  let mut stdin = child.stdin.take().ok_or(SupervisorError::ChannelClosed)?;
  let frame = Message::Start(start.clone()).to_line()?;
  let handoff = async {
    stdin.write_all(frame.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
  };
  if let Err(error) = handoff.await {
    warn!(step = %step_name, error = %error, "failed to hand step to child");
  }

  forward_stderr(&mut child, step_name.clone());

  let stdout = child.stdout.take().ok_or(SupervisorError::ChannelClosed)?;
  let mut lines = BufReader::new(stdout).lines();

  let mut deadline = timeout_ms.map(|ms| Instant::now() + Duration::from_millis(ms));

  loop {
    let sleep_at = deadline;
    tokio::select! {
      line = lines.next_line() => {
        let Some(line) = line? else {
          reap(&mut child).await;
          return Err(SupervisorError::ChannelClosed);
        };

        match Message::from_line(&line) {
          Some(Message::Event { event }) => {
            if let (Some(base), Some(extension)) = (timeout_ms, deadline_extension(&event)) {
              deadline = Some(Instant::now() + Duration::from_millis(base + extension));
            }
            notifier.notify(event);
          }
          Some(Message::Result { step }) => {
            reap(&mut child).await;
            return Ok(Supervised {
              errors: step.errors.clone(),
              fatal: false,
              step,
            });
          }
          Some(Message::Error { error }) => {
            reap(&mut child).await;
            warn!(step = %step_name, error = %error, "step process reported an error");
            notifier.notify(WorkflowEvent::StepError {
              run_id: run_id.clone(),
              step: step_name.clone(),
              error: error.clone(),
            });
            return Ok(fail_step(start.step, error));
          }
          Some(Message::Start(_)) => {
            // The child never sends start frames; treat as log noise.
            info!(step = %step_name, line = %line, "step output");
          }
          None => {
            info!(step = %step_name, line = %line, "step output");
          }
        }
      }

      _ = maybe_sleep(sleep_at) => {
        reap(&mut child).await;
        let error = WrappedError::fatal(
          ErrorKind::HardTimeout,
          format!(
            "step '{}' missed its liveness deadline ({}ms)",
            step_name,
            timeout_ms.unwrap_or(0)
          ),
        );
        warn!(step = %step_name, error = %error, "step process killed on deadline");
        notifier.notify(WorkflowEvent::StepFailed {
          run_id: run_id.clone(),
          step: step_name.clone(),
          error: error.clone(),
        });
        return Ok(fail_step(start.step, error));
      }
    }
  }
}

/// Extra milliseconds granted past the base timeout for a liveness signal,
/// or `None` when the event does not reset the deadline.
pub(crate) fn deadline_extension(event: &WorkflowEvent) -> Option<u64> {
  match event {
    WorkflowEvent::StepStarted { .. } => Some(START_GRACE_MS),
    WorkflowEvent::StepRetrying { attempt, .. } => Some(attempt.next_ms + RETRY_GRACE_MS),
    _ => None,
  }
}

fn spawn_child(config: &SupervisorConfig, start: &StartPayload) -> Result<Child, SupervisorError> {
  let mut command = Command::new(&config.program);
  command
    .args(&config.args)
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .env(ENV_RUN_ID, &start.run_id)
    .env(ENV_FINGERPRINT, &start.fingerprint)
    .envs(&start.step.spec.options.env)
    .kill_on_drop(true);

  #[cfg(unix)]
  if let Some(limit_mb) = config.memory_limit_mb {
    let bytes = limit_mb.saturating_mul(1024 * 1024) as libc::rlim_t;
    unsafe {
      command.pre_exec(move || {
        let limit = libc::rlimit {
          rlim_cur: bytes,
          rlim_max: bytes,
        };
        if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
          return Err(std::io::Error::last_os_error());
        }
        Ok(())
      });
    }
  }

  command
    .spawn()
    .map_err(|source| SupervisorError::Spawn { source })
}

/// Pipe the child's stderr into the logs.
fn forward_stderr(child: &mut Child, step_name: String) {
  if let Some(stderr) = child.stderr.take() {
    tokio::spawn(async move {
      let mut lines = BufReader::new(stderr).lines();
      while let Ok(Some(line)) = lines.next_line().await {
        info!(step = %step_name, line = %line, "step output");
      }
    });
  }
}

async fn maybe_sleep(at: Option<Instant>) {
  match at {
    Some(at) => tokio::time::sleep_until(at).await,
    None => std::future::pending().await,
  }
}

async fn reap(child: &mut Child) {
  let _ = child.start_kill();
  let _ = child.wait().await;
}

fn fail_step(mut step: StepRuntime, error: WrappedError) -> Supervised {
  step.state = StepState::Failed;
  step.errors.push(error.clone());
  step.sync_error();
  Supervised {
    step,
    fatal: true,
    errors: vec![error],
  }
}

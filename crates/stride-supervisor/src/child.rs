//! The child side of process isolation.
//!
//! The step host reads one `start` frame from stdin, runs the step's
//! prepare/run/finalize lifecycle, mirrors lifecycle events onto stdout as
//! protocol frames, and finishes with a single `result` or `error` frame.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use stride_config::EffectiveOptions;
use stride_runtime::{
  finalize, prepare_with_base, run, should_run, ActionHost, Notifier, RunContext, StepState,
  WorkflowEvent, WrappedError,
};

use crate::error::SupervisorError;
use crate::protocol::Message;

/// Mirrors lifecycle events onto the channel as `event` frames.
struct FrameEmitter;

impl Notifier for FrameEmitter {
  fn notify(&self, event: WorkflowEvent) {
    emit(&Message::Event { event });
  }
}

fn emit(message: &Message) {
  if let Ok(line) = message.to_line() {
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    let _ = writeln!(lock, "{}", line);
    let _ = lock.flush();
  }
}

/// Entry point for the isolated step process.
///
/// Resolution failures (module, function, expression) are reported as
/// `error` frames; everything else ends in a `result` frame, including
/// steps that ran and failed.
pub async fn run_step_host(host: &ActionHost) -> Result<(), SupervisorError> {
  let mut line = String::new();
  BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;

  let Some(Message::Start(start)) = Message::from_line(&line) else {
    return Err(SupervisorError::ChannelClosed);
  };

  let config = Arc::new(start.config);
  let mut ctx = RunContext::for_child(
    config.clone(),
    start.run_id,
    start.fingerprint,
    start.output_dir,
  );
  ctx.steps = start.steps;

  let prepared = match prepare_with_base(start.step, &ctx, &start.base_input) {
    Ok(prepared) => prepared,
    Err(error) => {
      emit(&Message::Error {
        error: WrappedError::wrap(error.to_string().into()),
      });
      return Ok(());
    }
  };

  let options = EffectiveOptions::resolve(&config.options, &prepared.spec.options);

  let finished = if !should_run(&prepared) {
    let mut skipped = prepared;
    skipped.state = StepState::Skipped;
    skipped
  } else {
    let action = match host.resolve(config.runner.as_deref(), &prepared.spec.action) {
      Ok(action) => action,
      Err(error) => {
        emit(&Message::Error { error });
        return Ok(());
      }
    };

    run(prepared, &*action, options, &ctx.run_id, &FrameEmitter).await
  };

  match finalize(finished) {
    Ok(step) => emit(&Message::Result { step }),
    Err(error) => emit(&Message::Error {
      error: WrappedError::wrap(error.to_string().into()),
    }),
  }

  Ok(())
}

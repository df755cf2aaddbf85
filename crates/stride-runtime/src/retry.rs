use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execute::{execute, Execution};
use crate::registry::Action;
use crate::wrapped::WrappedError;

/// One observed failure inside the retry loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryAttempt {
  /// 0-based attempt index.
  pub attempt: u32,
  pub error: WrappedError,
  /// Delay before the next try, as computed by the delay function.
  pub next_ms: u64,
  /// True iff this was the last permitted attempt.
  pub final_attempt: bool,
}

/// Knobs for the retry loop.
#[derive(Default)]
pub struct RetryOptions<'a> {
  /// Per-attempt timeout handed to `execute`.
  pub timeout_ms: Option<u64>,
  /// Maps attempt index to the delay before the next try. No function
  /// means no delay.
  pub delay: Option<Box<dyn Fn(u32) -> u64 + Send + Sync + 'a>>,
  /// Observer invoked once per failed attempt.
  pub on_attempt: Option<Box<dyn FnMut(RetryAttempt) + Send + 'a>>,
}

/// Run an action up to `max_attempts` times.
///
/// Returns on the first success. When every attempt fails, the last
/// normalized error is returned; nothing is thrown. Zero attempts yield an
/// immediate all-failed result without invoking the action.
pub async fn retry(
  input: Value,
  action: &dyn Action,
  max_attempts: u32,
  mut options: RetryOptions<'_>,
) -> Execution {
  let mut last_error: Option<WrappedError> = None;

  for attempt in 0..max_attempts {
    let outcome = execute(input.clone(), action, options.timeout_ms).await;

    let error = match outcome.error {
      None => return outcome,
      Some(error) => error,
    };

    let next_ms = options.delay.as_ref().map(|delay| delay(attempt)).unwrap_or(0);

    if let Some(on_attempt) = options.on_attempt.as_mut() {
      on_attempt(RetryAttempt {
        attempt,
        error: error.clone(),
        next_ms,
        final_attempt: attempt + 1 == max_attempts,
      });
    }

    last_error = Some(error);

    if next_ms > 0 && attempt + 1 < max_attempts {
      tokio::time::sleep(Duration::from_millis(next_ms)).await;
    }
  }

  Execution {
    data: None,
    error: Some(
      last_error
        .unwrap_or_else(|| WrappedError::wrap("no attempts were permitted".into())),
    ),
  }
}

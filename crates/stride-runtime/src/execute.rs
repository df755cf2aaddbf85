use std::time::Duration;

use serde_json::Value;

use stride_config::DEFAULT_TIMEOUT_MS;

use crate::registry::Action;
use crate::wrapped::WrappedError;

/// Outcome of a single execution attempt.
///
/// Exactly one of `data`/`error` is set on completion; `execute` never
/// propagates a failure any other way.
#[derive(Debug, Clone)]
pub struct Execution {
  pub data: Option<Value>,
  pub error: Option<WrappedError>,
}

impl Execution {
  pub fn ok(data: Value) -> Self {
    Self {
      data: Some(data),
      error: None,
    }
  }

  pub fn failed(error: WrappedError) -> Self {
    Self {
      data: None,
      error: Some(error),
    }
  }
}

/// Invoke an action once, racing it against a deadline.
///
/// Failures are normalized into a [`WrappedError`]; a missed deadline
/// becomes a transient timeout error so the retry loop can try again.
pub async fn execute(input: Value, action: &dyn Action, timeout_ms: Option<u64>) -> Execution {
  let timeout_ms = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);

  match tokio::time::timeout(Duration::from_millis(timeout_ms), action.call(input)).await {
    Ok(Ok(data)) => Execution::ok(data),
    Ok(Err(error)) => Execution::failed(WrappedError::wrap(error)),
    Err(_) => Execution::failed(WrappedError::wrap(
      format!("execution timed out after {}ms", timeout_ms).into(),
    )),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::ActionRegistry;
  use crate::wrapped::ActionError;
  use serde_json::json;

  fn action(registry: &ActionRegistry, name: &str) -> std::sync::Arc<dyn Action> {
    registry.get(name).unwrap()
  }

  #[tokio::test]
  async fn success_carries_data_and_no_error() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("double", |input: Value| async move {
      let n = input["n"].as_i64().unwrap_or(0);
      Ok(json!({"n": n * 2}))
    });

    let result = execute(json!({"n": 21}), &*action(&registry, "double"), None).await;
    assert_eq!(result.data, Some(json!({"n": 42})));
    assert!(result.error.is_none());
  }

  #[tokio::test]
  async fn failure_is_normalized_not_thrown() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("bad", |_| async move {
      Err::<Value, _>(ActionError::msg("nope"))
    });

    let result = execute(json!({}), &*action(&registry, "bad"), None).await;
    assert!(result.data.is_none());
    assert_eq!(result.error.unwrap().message, "nope");
  }

  #[tokio::test(start_paused = true)]
  async fn deadline_produces_a_timeout_error() {
    let mut registry = ActionRegistry::new();
    registry.register_fn("slow", |_| async move {
      tokio::time::sleep(Duration::from_millis(500)).await;
      Ok(json!("late"))
    });

    let result = execute(json!({}), &*action(&registry, "slow"), Some(50)).await;
    let error = result.error.unwrap();
    assert!(error.message.contains("timed out after 50ms"));
    assert!(!error.is_fatal());
  }
}

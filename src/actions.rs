//! Built-in demo actions so workflow files are runnable from the shell.
//!
//! Real deployments register their own modules on an [`ActionHost`]; these
//! three cover smoke tests and examples.

use std::time::Duration;

use serde_json::{json, Value};

use stride_runtime::{ActionError, ActionHost, ActionRegistry, DEFAULT_MODULE};

pub fn builtin() -> ActionHost {
  let mut registry = ActionRegistry::new();

  registry.register_fn("echo", |input: Value| async move { Ok(input) });

  registry.register_fn("sleep", |input: Value| async move {
    let ms = input["ms"].as_u64().unwrap_or(0);
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Ok(json!({"slept_ms": ms}))
  });

  registry.register_fn("fail", |input: Value| async move {
    let message = input["message"].as_str().unwrap_or("step failed").to_string();
    Err::<Value, _>(ActionError::msg(message))
  });

  ActionHost::new().module(DEFAULT_MODULE, registry)
}

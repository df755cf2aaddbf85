use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::wrapped::{ActionError, ErrorKind, WrappedError};

/// Module name used when a workflow does not declare a `runner`.
pub const DEFAULT_MODULE: &str = "default";

/// A user step function: takes the step's resolved input, returns its output.
#[async_trait]
pub trait Action: Send + Sync {
  async fn call(&self, input: Value) -> Result<Value, ActionError>;
}

impl std::fmt::Debug for dyn Action {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("<action>")
  }
}

/// Adapter so plain async functions and closures can act as [`Action`]s.
struct FnAction<F>(F);

#[async_trait]
impl<F, Fut> Action for FnAction<F>
where
  F: Fn(Value) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
{
  async fn call(&self, input: Value) -> Result<Value, ActionError> {
    (self.0)(input).await
  }
}

/// A capability-typed map of action names to step functions.
///
/// Populated once per process; resolution failure is a typed error, not a
/// missing-key panic.
#[derive(Default)]
pub struct ActionRegistry {
  actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register an action under a name. The last registration wins.
  pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
    self.actions.insert(name.into(), action);
  }

  /// Register a plain async function or closure as an action.
  pub fn register_fn<F, Fut>(&mut self, name: impl Into<String>, f: F)
  where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ActionError>> + Send + 'static,
  {
    self.register(name, Arc::new(FnAction(f)));
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
    self.actions.get(name).cloned()
  }

  pub fn is_empty(&self) -> bool {
    self.actions.is_empty()
  }
}

/// Maps runner identifiers to action registries.
///
/// A workflow names its module via `runner`; each step names its function
/// via `action`. Both lookups fail with a typed fatal error.
#[derive(Default)]
pub struct ActionHost {
  modules: HashMap<String, Arc<ActionRegistry>>,
}

impl ActionHost {
  pub fn new() -> Self {
    Self::default()
  }

  /// Add a module under the given runner name.
  pub fn module(mut self, name: impl Into<String>, registry: ActionRegistry) -> Self {
    self.modules.insert(name.into(), Arc::new(registry));
    self
  }

  /// Resolve a step's function.
  pub fn resolve(
    &self,
    runner: Option<&str>,
    action: &str,
  ) -> Result<Arc<dyn Action>, WrappedError> {
    let module_name = runner.unwrap_or(DEFAULT_MODULE);

    let module = self.modules.get(module_name).ok_or_else(|| {
      WrappedError::fatal(
        ErrorKind::ModuleNotFound,
        format!("module '{}' is not registered", module_name),
      )
    })?;

    module.get(action).ok_or_else(|| {
      WrappedError::fatal(
        ErrorKind::FunctionNotFound,
        format!("function '{}' not found in module '{}'", action, module_name),
      )
    })
  }
}

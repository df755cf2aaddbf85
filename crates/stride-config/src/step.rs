use serde::{Deserialize, Serialize};
use serde_json::Map;

use crate::options::StepOptions;

/// One named unit of work in a workflow.
///
/// The `with`, `if` and `after` maps hold unresolved `{{ … }}` expressions;
/// the engine resolves them against the run context at the appropriate
/// lifecycle phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
  pub name: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  /// `Some(false)` suppresses execution; absent means enabled.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub enabled: Option<bool>,
  /// Name of the user function to invoke, looked up in the action registry.
  pub action: String,
  /// Step-local data, merged under the workflow-level data.
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub data: Map<String, serde_json::Value>,
  /// Expressions producing the step's input fields.
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub with: Map<String, serde_json::Value>,
  /// Skip condition; the step runs unless this resolves to `false`.
  #[serde(rename = "if", skip_serializing_if = "Option::is_none")]
  pub if_expr: Option<String>,
  /// Expressions applied to the step's output once it completes.
  #[serde(default, skip_serializing_if = "Map::is_empty")]
  pub after: Map<String, serde_json::Value>,
  #[serde(default, skip_serializing_if = "is_default_options")]
  pub options: StepOptions,
}

fn is_default_options(options: &StepOptions) -> bool {
  *options == StepOptions::default()
}

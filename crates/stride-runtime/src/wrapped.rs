use serde::{Deserialize, Serialize};
use serde_json::Value;

const SEE_ORIGINAL: &str = "see original";

/// The kind of a step failure, recovered from a [`WrappedError`]'s name.
///
/// Fatal kinds terminate a step immediately; `Transient` failures are
/// retried up to the configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// The isolated process missed its adaptive deadline.
  HardTimeout,
  /// A step's output exceeded the configured size ceiling.
  HardDataSize,
  /// The action module could not be resolved.
  ModuleNotFound,
  /// The named action is not present in its module.
  FunctionNotFound,
  /// Any other failure from the user function.
  Transient,
}

impl ErrorKind {
  pub fn name(&self) -> &'static str {
    match self {
      ErrorKind::HardTimeout => "HardTimeout",
      ErrorKind::HardDataSize => "HardDataSize",
      ErrorKind::ModuleNotFound => "ModuleNotFound",
      ErrorKind::FunctionNotFound => "FunctionNotFound",
      ErrorKind::Transient => "Transient",
    }
  }

  pub fn from_name(name: &str) -> Self {
    match name {
      "HardTimeout" => ErrorKind::HardTimeout,
      "HardDataSize" => ErrorKind::HardDataSize,
      "ModuleNotFound" => ErrorKind::ModuleNotFound,
      "FunctionNotFound" => ErrorKind::FunctionNotFound,
      _ => ErrorKind::Transient,
    }
  }

  pub fn is_fatal(&self) -> bool {
    !matches!(self, ErrorKind::Transient)
  }
}

/// A failure raised by a user action.
///
/// Actions may fail with a plain message or with an arbitrary structured
/// value; both normalize into a [`WrappedError`].
#[derive(Debug, Clone, PartialEq)]
pub enum ActionError {
  Message(String),
  Structured(Value),
}

impl ActionError {
  pub fn msg(message: impl Into<String>) -> Self {
    ActionError::Message(message.into())
  }
}

impl std::fmt::Display for ActionError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      ActionError::Message(m) => f.write_str(m),
      ActionError::Structured(v) => write!(f, "{}", v),
    }
  }
}

impl std::error::Error for ActionError {}

impl From<String> for ActionError {
  fn from(message: String) -> Self {
    ActionError::Message(message)
  }
}

impl From<&str> for ActionError {
  fn from(message: &str) -> Self {
    ActionError::Message(message.to_string())
  }
}

impl From<Value> for ActionError {
  fn from(value: Value) -> Self {
    ActionError::Structured(value)
  }
}

/// The normalized failure shape.
///
/// Heterogeneous failure values (structured objects, plain strings,
/// arbitrary values) are flattened into the same four fields so they can be
/// compared and logged uniformly. The raw value is kept in `original`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrappedError {
  pub original: Value,
  pub name: String,
  pub message: String,
  pub stack: String,
}

impl WrappedError {
  /// Normalize an action failure.
  pub fn wrap(error: ActionError) -> Self {
    match error {
      ActionError::Message(message) => Self {
        original: Value::String(message.clone()),
        name: message.clone(),
        message,
        stack: "unknown".to_string(),
      },
      ActionError::Structured(Value::Object(map)) => {
        let field = |key: &str| {
          map
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or(SEE_ORIGINAL)
            .to_string()
        };
        Self {
          name: field("name"),
          message: field("message"),
          stack: field("stack"),
          original: Value::Object(map),
        }
      }
      ActionError::Structured(other) => Self {
        original: other,
        name: SEE_ORIGINAL.to_string(),
        message: SEE_ORIGINAL.to_string(),
        stack: SEE_ORIGINAL.to_string(),
      },
    }
  }

  /// Build a fatal error of the given kind.
  pub fn fatal(kind: ErrorKind, message: impl Into<String>) -> Self {
    Self {
      original: Value::Null,
      name: kind.name().to_string(),
      message: message.into(),
      stack: "unknown".to_string(),
    }
  }

  pub fn kind(&self) -> ErrorKind {
    ErrorKind::from_name(&self.name)
  }

  pub fn is_fatal(&self) -> bool {
    self.kind().is_fatal()
  }
}

impl std::fmt::Display for WrappedError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}: {}", self.name, self.message)
  }
}

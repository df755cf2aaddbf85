use serde_json::Value;

use crate::wrapped::{ErrorKind, WrappedError};

/// Enforce the output size ceiling on a step result.
///
/// Measures the serialized size of the value; exceeding the ceiling is a
/// fatal failure even though the step function already returned. Applied
/// once to the raw result, never per attempt.
pub fn data_size_regulator(value: Value, limit_kb: u64) -> Result<Value, WrappedError> {
  let size = serde_json::to_vec(&value).map(|bytes| bytes.len()).unwrap_or(0);

  if size as u64 > limit_kb.saturating_mul(1024) {
    return Err(WrappedError::fatal(
      ErrorKind::HardDataSize,
      format!("Step output exceeds {} KB limit", limit_kb),
    ));
  }

  Ok(value)
}

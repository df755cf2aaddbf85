use std::collections::HashMap;
use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::enums::BackoffKind;

/// Fallback timeout for a single execution attempt.
pub const DEFAULT_TIMEOUT_MS: u64 = 100;
/// Attempts made before a step is considered failed.
pub const DEFAULT_RETRIES: u32 = 1;
/// Base delay fed into the backoff strategy.
pub const DEFAULT_DELAY_MS: u64 = 1000;
/// Simultaneously in-flight steps in `async`/`batched` modes.
pub const DEFAULT_CONCURRENCY: usize = 4;
/// Ceiling on a step's serialized output.
pub const DEFAULT_OUTPUT_LIMIT_KB: u64 = 256;

/// A timeout in milliseconds.
///
/// Deserializes from either an integer millisecond count or a duration
/// string with a `ms`, `s` or `m` suffix (`250`, `"250ms"`, `"10s"`, `"2m"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutMs(pub u64);

impl TimeoutMs {
  pub fn as_millis(&self) -> u64 {
    self.0
  }

  fn parse(s: &str) -> Result<Self, String> {
    let s = s.trim();
    let (digits, scale) = if let Some(head) = s.strip_suffix("ms") {
      (head, 1)
    } else if let Some(head) = s.strip_suffix('s') {
      (head, 1000)
    } else if let Some(head) = s.strip_suffix('m') {
      (head, 60_000)
    } else {
      (s, 1)
    };

    digits
      .trim()
      .parse::<u64>()
      .map(|n| TimeoutMs(n * scale))
      .map_err(|_| format!("invalid timeout '{}'", s))
  }
}

impl Serialize for TimeoutMs {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(self.0)
  }
}

impl<'de> Deserialize<'de> for TimeoutMs {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct TimeoutVisitor;

    impl Visitor<'_> for TimeoutVisitor {
      type Value = TimeoutMs;

      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a millisecond count or a duration string like \"10s\"")
      }

      fn visit_u64<E: de::Error>(self, v: u64) -> Result<TimeoutMs, E> {
        Ok(TimeoutMs(v))
      }

      fn visit_i64<E: de::Error>(self, v: i64) -> Result<TimeoutMs, E> {
        u64::try_from(v)
          .map(TimeoutMs)
          .map_err(|_| E::custom("timeout must be non-negative"))
      }

      fn visit_str<E: de::Error>(self, v: &str) -> Result<TimeoutMs, E> {
        TimeoutMs::parse(v).map_err(E::custom)
      }
    }

    deserializer.deserialize_any(TimeoutVisitor)
  }
}

/// Workflow-level execution options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout: Option<TimeoutMs>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retries: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub backoff: Option<BackoffKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub delay_ms: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub concurrency: Option<usize>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub output_limit_kb: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub memory_limit_mb: Option<u64>,
}

impl Options {
  /// Concurrency limit for `async`/`batched` modes.
  pub fn concurrency(&self) -> usize {
    self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
  }
}

/// Per-step overrides of the workflow-level options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepOptions {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub timeout: Option<TimeoutMs>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub retries: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub backoff: Option<BackoffKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub delay_ms: Option<u64>,
  /// Environment variables exported to the isolated step process.
  #[serde(default, skip_serializing_if = "HashMap::is_empty")]
  pub env: HashMap<String, String>,
}

/// The options a step actually runs with, after step overrides are applied
/// on top of the workflow-level options and defaults.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectiveOptions {
  pub timeout_ms: u64,
  pub retries: u32,
  pub backoff: BackoffKind,
  pub delay_ms: u64,
  pub output_limit_kb: u64,
}

impl EffectiveOptions {
  /// Resolve the options for one step: step override, then workflow option,
  /// then the built-in default.
  pub fn resolve(workflow: &Options, step: &StepOptions) -> Self {
    Self {
      timeout_ms: step
        .timeout
        .or(workflow.timeout)
        .map(|t| t.as_millis())
        .unwrap_or(DEFAULT_TIMEOUT_MS),
      retries: step.retries.or(workflow.retries).unwrap_or(DEFAULT_RETRIES),
      backoff: step
        .backoff
        .or(workflow.backoff)
        .unwrap_or_default(),
      delay_ms: step
        .delay_ms
        .or(workflow.delay_ms)
        .unwrap_or(DEFAULT_DELAY_MS),
      output_limit_kb: workflow.output_limit_kb.unwrap_or(DEFAULT_OUTPUT_LIMIT_KB),
    }
  }
}

use stride_config::BackoffKind;

/// Base delay when none is configured.
pub const DEFAULT_BASE_MS: u64 = 1000;

/// Constant delay regardless of attempt.
pub fn manual(_attempt: u32, base: u64) -> u64 {
  base
}

/// Delay grows linearly with the attempt number.
pub fn linear(attempt: u32, base: u64) -> u64 {
  base.saturating_mul(attempt as u64)
}

/// Delay grows with the square of the attempt number.
pub fn squaring(attempt: u32, base: u64) -> u64 {
  base.saturating_mul((attempt as u64).saturating_mul(attempt as u64))
}

/// Delay doubles on every attempt.
pub fn exponential(attempt: u32, base: u64) -> u64 {
  base.saturating_mul(1u64 << attempt.min(20))
}

/// Compute the delay for an attempt under a named strategy.
pub fn delay_for(kind: BackoffKind, attempt: u32, base: u64) -> u64 {
  match kind {
    BackoffKind::Manual => manual(attempt, base),
    BackoffKind::Linear => linear(attempt, base),
    BackoffKind::Squaring => squaring(attempt, base),
    BackoffKind::Exponential => exponential(attempt, base),
  }
}

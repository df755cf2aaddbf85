//! Stride Runtime
//!
//! The execution primitives the engine is built from: single-attempt
//! execution with timeout and error normalization, the bounded retry loop,
//! backoff strategies, the bounded-concurrency pool, the action registry,
//! the step lifecycle (prepare/run/finalize) and the run context.
//!
//! Transient failures never escape as errors here; they are normalized into
//! [`WrappedError`] values and returned as part of a result.

mod backoff;
mod context;
mod events;
mod execute;
mod guard;
mod lifecycle;
mod pool;
mod registry;
mod retry;
mod step;
mod wrapped;

pub use backoff::{delay_for, exponential, linear, manual, squaring, DEFAULT_BASE_MS};
pub use context::{RunContext, ENV_FINGERPRINT, ENV_RUN_ID};
pub use events::{ChannelNotifier, NoopNotifier, Notifier, WorkflowEvent};
pub use execute::{execute, Execution};
pub use guard::data_size_regulator;
pub use lifecycle::{finalize, prepare, prepare_with_base, run, should_run};
pub use pool::run_with_concurrency;
pub use registry::{Action, ActionHost, ActionRegistry, DEFAULT_MODULE};
pub use retry::{retry, RetryAttempt, RetryOptions};
pub use step::{AppliedOptions, StepRuntime, StepState};
pub use wrapped::{ActionError, ErrorKind, WrappedError};

use stride_resolver::ResolveError;
use stride_supervisor::SupervisorError;

/// Errors that can abort a workflow run.
///
/// A step that merely fails does not produce one of these; failed steps are
/// ordinary results and the run carries on. These are infrastructure
/// failures the engine cannot attribute to a step outcome.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// An expression in a step definition could not be resolved.
  #[error("failed to resolve step '{step}'")]
  Resolve {
    step: String,
    #[source]
    source: ResolveError,
  },

  /// The supervisor could not run an isolated step at all.
  #[error("failed to supervise step '{step}'")]
  Supervision {
    step: String,
    #[source]
    source: SupervisorError,
  },

  /// A pooled task could not be joined.
  #[error("task join error: {0}")]
  Join(#[from] tokio::task::JoinError),

  /// The run was cancelled.
  #[error("execution cancelled")]
  Cancelled,
}

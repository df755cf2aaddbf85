/// Errors that can occur while supervising an isolated step.
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
  /// The step process could not be spawned.
  #[error("failed to spawn step process: {source}")]
  Spawn {
    #[source]
    source: std::io::Error,
  },

  /// Reading or writing the channel failed.
  #[error("channel io error: {0}")]
  Io(#[from] std::io::Error),

  /// A protocol frame could not be encoded.
  #[error("failed to encode channel message: {0}")]
  Encode(#[from] serde_json::Error),

  /// The child closed its channel without reporting a result or an error.
  #[error("step process closed its channel before reporting a result")]
  ChannelClosed,
}

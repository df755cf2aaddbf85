/// Errors that can occur while resolving an expression.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
  /// The expression named a filter that is not in the catalog.
  #[error("helper not found: '{name}'")]
  HelperNotFound { name: String },

  /// The expression could not be parsed.
  #[error("invalid expression: {message}")]
  InvalidExpression { message: String },
}

//! Stride Resolver
//!
//! Evaluates `{{ path | filter | filter(args) }}` expressions against a JSON
//! data context. Step definitions carry these expressions in their `with`,
//! `if`, `after` and `data` maps; the engine resolves them before and after
//! each step runs.
//!
//! A template with no delimited expression is returned unchanged. Only the
//! first expression in a string is evaluated.

mod error;
mod filters;
mod merge;
mod path;
mod resolver;

pub use error::ResolveError;
pub use merge::deep_merge;
pub use resolver::{resolve, resolve_deep};

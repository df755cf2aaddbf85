use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static BRACKET_INDEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[(\d+)\]").unwrap());

/// Normalize a path expression into dot-separated segments.
///
/// Leading and trailing dots are stripped and bracketed integer indices
/// (`items[0]`) are rewritten to dot form (`items.0`).
pub fn normalize(path: &str) -> String {
  let rewritten = BRACKET_INDEX.replace_all(path.trim(), ".$1");
  rewritten
    .trim_start_matches('.')
    .trim_end_matches('.')
    .to_string()
}

/// Walk a context object segment by segment.
///
/// Returns `None` when any segment is missing; array segments accept
/// numeric indices.
pub fn lookup(context: &Value, path: &str) -> Option<Value> {
  let mut current = context;
  for segment in path.split('.') {
    current = match current {
      Value::Object(map) => map.get(segment)?,
      Value::Array(items) => {
        let index: usize = segment.parse().ok()?;
        items.get(index)?
      }
      _ => return None,
    };
  }
  Some(current.clone())
}

/// Whether a value reads as falsy: null, `false`, `0` or the empty string.
pub fn is_falsy(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::Bool(b) => !b,
    Value::Number(n) => n.as_f64() == Some(0.0),
    Value::String(s) => s.is_empty(),
    _ => false,
  }
}

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::ResolveError;
use crate::filters;
use crate::path;

static FILTER_CALL: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"^(!?[A-Za-z_][A-Za-z0-9_]*)\s*(?:\((.*)\))?$").unwrap());

/// Resolve a template against a data context.
///
/// The first `{{ … }}` expression in the string is evaluated; a template
/// without one is returned unchanged. When the expression is the entire
/// template its value is returned as-is (numbers stay numbers); otherwise
/// the rendered value is spliced back into the surrounding text.
pub fn resolve(template: &str, context: &Value) -> Result<Value, ResolveError> {
  let Some(open) = template.find("{{") else {
    return Ok(Value::String(template.to_string()));
  };
  let Some(close) = template[open + 2..].find("}}") else {
    return Ok(Value::String(template.to_string()));
  };

  let expression = &template[open + 2..open + 2 + close];
  if expression.trim().is_empty() {
    return Ok(Value::String(template.to_string()));
  }

  let value = evaluate(expression, context)?;

  let is_whole = template.trim() == &template[open..open + 2 + close + 2];
  if is_whole {
    return Ok(value);
  }

  let rendered = match &value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  };
  let mut output = String::with_capacity(template.len());
  output.push_str(&template[..open]);
  output.push_str(&rendered);
  output.push_str(&template[open + 2 + close + 2..]);
  Ok(Value::String(output))
}

/// Recursively resolve every string leaf of a nested structure.
///
/// Non-string leaves pass through untouched. This is how whole `with`,
/// `after` and `data` maps are resolved in one call.
pub fn resolve_deep(value: &Value, context: &Value) -> Result<Value, ResolveError> {
  match value {
    Value::String(s) => resolve(s, context),
    Value::Array(items) => {
      let resolved: Result<Vec<_>, _> =
        items.iter().map(|item| resolve_deep(item, context)).collect();
      Ok(Value::Array(resolved?))
    }
    Value::Object(map) => {
      let mut resolved = serde_json::Map::new();
      for (key, item) in map {
        resolved.insert(key.clone(), resolve_deep(item, context)?);
      }
      Ok(Value::Object(resolved))
    }
    other => Ok(other.clone()),
  }
}

/// Evaluate one `path | filter | filter(args)` expression.
fn evaluate(expression: &str, context: &Value) -> Result<Value, ResolveError> {
  let mut parts = split_outside_quotes(expression, '|').into_iter();
  let head = parts.next().unwrap_or_default();

  let mut value = resolve_path(head.trim(), context);

  for part in parts {
    let part = part.trim();
    let captures = FILTER_CALL
      .captures(part)
      .ok_or_else(|| ResolveError::InvalidExpression {
        message: format!("malformed filter '{}'", part),
      })?;

    let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let args = match captures.get(2) {
      Some(raw) => split_outside_quotes(raw.as_str(), ',')
        .iter()
        .map(|arg| resolve_argument(arg.trim(), context))
        .collect(),
      None => Vec::new(),
    };

    value = filters::apply(name, value, &args)?;
  }

  Ok(value)
}

/// Resolve the leading path of an expression.
///
/// A lookup that comes back empty or falsy falls back, for single-segment
/// paths only, to reading the segment as a literal: a number, a quoted
/// string, or the bare word itself.
fn resolve_path(raw: &str, context: &Value) -> Value {
  let normalized = path::normalize(raw);
  let single_segment = !normalized.contains('.');

  match path::lookup(context, &normalized) {
    Some(value) if !(single_segment && path::is_falsy(&value)) => value,
    _ if single_segment => literal(raw.trim()),
    Some(value) => value,
    None => Value::Null,
  }
}

/// Resolve one filter argument.
///
/// Array/object literals and numeric strings pass through unchanged; quoted
/// strings are unquoted; anything else is looked up as a path with the same
/// literal fallback as the expression head.
fn resolve_argument(raw: &str, context: &Value) -> Value {
  if raw.starts_with('[') || raw.starts_with('{') {
    return serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
  }
  if let Some(unquoted) = unquote(raw) {
    return Value::String(unquoted);
  }
  if let Some(number) = parse_number(raw) {
    return number;
  }
  resolve_path(raw, context)
}

fn literal(raw: &str) -> Value {
  if let Some(number) = parse_number(raw) {
    return number;
  }
  if let Some(unquoted) = unquote(raw) {
    return Value::String(unquoted);
  }
  Value::String(raw.to_string())
}

fn parse_number(raw: &str) -> Option<Value> {
  if let Ok(n) = raw.parse::<i64>() {
    return Some(Value::Number(n.into()));
  }
  raw
    .parse::<f64>()
    .ok()
    .and_then(serde_json::Number::from_f64)
    .map(Value::Number)
}

fn unquote(raw: &str) -> Option<String> {
  let bytes = raw.as_bytes();
  if bytes.len() >= 2 {
    let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
    if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
      return Some(raw[1..raw.len() - 1].to_string());
    }
  }
  None
}

/// Split on a separator, ignoring occurrences inside quotes or brackets.
fn split_outside_quotes(input: &str, separator: char) -> Vec<String> {
  let mut parts = Vec::new();
  let mut current = String::new();
  let mut depth = 0usize;
  let mut quote: Option<char> = None;

  for c in input.chars() {
    match quote {
      Some(q) => {
        if c == q {
          quote = None;
        }
        current.push(c);
      }
      None => match c {
        '\'' | '"' => {
          quote = Some(c);
          current.push(c);
        }
        '(' | '[' | '{' => {
          depth += 1;
          current.push(c);
        }
        ')' | ']' | '}' => {
          depth = depth.saturating_sub(1);
          current.push(c);
        }
        _ if c == separator && depth == 0 => {
          parts.push(std::mem::take(&mut current));
        }
        _ => current.push(c),
      },
    }
  }
  parts.push(current);
  parts
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn plain_strings_pass_through() {
    assert_eq!(
      resolve("no expression here", &json!({})).unwrap(),
      json!("no expression here")
    );
    assert_eq!(resolve("{{ }}", &json!({})).unwrap(), json!("{{ }}"));
  }

  #[test]
  fn literal_fallback_for_missing_single_segments() {
    assert_eq!(resolve("{{ 42 | add(5) }}", &json!({})).unwrap(), json!(47));
    assert_eq!(resolve("{{ hello | length }}", &json!({})).unwrap(), json!(5));
    assert_eq!(
      resolve("{{ 'quoted words' }}", &json!({})).unwrap(),
      json!("quoted words")
    );
  }

  #[test]
  fn paths_walk_the_context() {
    let ctx = json!({"input": {"user": {"name": "ada"}, "items": ["a", "b"]}});
    assert_eq!(
      resolve("{{ .input.user.name | upper }}", &ctx).unwrap(),
      json!("ADA")
    );
    assert_eq!(resolve("{{ input.items[1] }}", &ctx).unwrap(), json!("b"));
  }

  #[test]
  fn non_string_values_survive_string_filters() {
    let ctx = json!({"input": {"number": 42}});
    assert_eq!(resolve("{{ .input.number | upper }}", &ctx).unwrap(), json!(42));
  }

  #[test]
  fn missing_multi_segment_paths_resolve_to_null() {
    assert_eq!(
      resolve("{{ a.b.c }}", &json!({"a": {}})).unwrap(),
      json!(null)
    );
    assert_eq!(
      resolve("{{ a.b.c | default('x') }}", &json!({})).unwrap(),
      json!("x")
    );
  }

  #[test]
  fn falsy_single_segment_falls_back_to_the_bare_word() {
    // A present-but-falsy value is indistinguishable from a missing key
    // under the single-segment rule; the segment name wins.
    let ctx = json!({"count": 0});
    assert_eq!(resolve("{{ count }}", &ctx).unwrap(), json!("count"));

    // Deeper paths keep the falsy value.
    let ctx = json!({"stats": {"count": 0}});
    assert_eq!(resolve("{{ stats.count }}", &ctx).unwrap(), json!(0));
  }

  #[test]
  fn filters_chain_left_to_right() {
    let ctx = json!({"name": "  Ada Lovelace  "});
    assert_eq!(
      resolve("{{ name | trim | lower | replace('ada', 'miss') }}", &ctx).unwrap(),
      json!("miss lovelace")
    );
  }

  #[test]
  fn filter_arguments_resolve_against_the_context() {
    let ctx = json!({"base": 10, "bump": 7});
    assert_eq!(resolve("{{ base | add(bump) }}", &ctx).unwrap(), json!(17));
    assert_eq!(
      resolve("{{ base | eq(10) }}", &ctx).unwrap(),
      json!(true)
    );
  }

  #[test]
  fn array_literal_arguments_pass_through() {
    assert_eq!(
      resolve("{{ items | default([1, 2]) }}", &json!({"items": null})).unwrap(),
      json!([1, 2])
    );
  }

  #[test]
  fn only_the_first_expression_is_evaluated() {
    let ctx = json!({"a": "one", "b": "two"});
    assert_eq!(
      resolve("{{ a }} and {{ b }}", &ctx).unwrap(),
      json!("one and {{ b }}")
    );
  }

  #[test]
  fn interpolation_into_surrounding_text() {
    let ctx = json!({"user": {"name": "ada"}});
    assert_eq!(
      resolve("hello {{ user.name }}!", &ctx).unwrap(),
      json!("hello ada!")
    );
    assert_eq!(
      resolve("n = {{ 2 | add(3) }}", &json!({})).unwrap(),
      json!("n = 5")
    );
  }

  #[test]
  fn unknown_filter_is_a_fatal_lookup_error() {
    let err = resolve("{{ x | frobnicate }}", &json!({"x": 1})).unwrap_err();
    assert!(matches!(err, ResolveError::HelperNotFound { .. }));
  }

  #[test]
  fn resolve_deep_walks_nested_structures() {
    let ctx = json!({"user": {"email": "a@b.c", "id": 7}});
    let template = json!({
      "contact": "{{ user.email }}",
      "meta": {"id": "{{ user.id }}", "fixed": 1},
      "list": ["{{ user.email | upper }}", true]
    });

    let resolved = resolve_deep(&template, &ctx).unwrap();
    assert_eq!(
      resolved,
      json!({
        "contact": "a@b.c",
        "meta": {"id": 7, "fixed": 1},
        "list": ["A@B.C", true]
      })
    );
  }
}

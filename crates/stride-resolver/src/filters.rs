use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::ResolveError;
use crate::merge::deep_merge;
use crate::path::is_falsy;

/// Apply one filter from the catalog to a value.
///
/// Filters have value semantics: a filter that does not apply to the input's
/// type passes the value through unchanged. An unknown filter name is a
/// fatal lookup error.
pub fn apply(name: &str, value: Value, args: &[Value]) -> Result<Value, ResolveError> {
  let result = match name {
    "upper" => map_string(value, |s| s.to_uppercase()),
    "lower" => map_string(value, |s| s.to_lowercase()),
    "trim" => trim(value),
    "sha256" => map_string(value, |s| {
      let mut hasher = Sha256::new();
      hasher.update(s.as_bytes());
      format!("{:x}", hasher.finalize())
    }),
    "json_encode" => Value::String(serde_json::to_string(&value).unwrap_or_default()),
    "json_decode" => match &value {
      Value::String(s) => serde_json::from_str(s).unwrap_or(value),
      _ => value,
    },
    "slice" => slice(value, args),
    "length" => length(&value),
    "replace" => replace(value, args),
    "truncate" => truncate(value, args),
    "type" => type_test(&value, args),
    "uuid" => Value::String(uuid::Uuid::new_v4().to_string()),
    "now" => Value::String(Utc::now().to_rfc3339()),
    "default" => {
      if value.is_null() {
        args.first().cloned().unwrap_or(Value::Null)
      } else {
        value
      }
    }
    "merge" => match (&value, args.first()) {
      (Value::Object(_), Some(overlay @ Value::Object(_))) => deep_merge(&value, overlay),
      _ => value,
    },
    "concat" => concat(value, args),
    "censor" => map_string(value, |s| "*".repeat(s.chars().count())),
    "!null" => Value::Bool(!value.is_null()),
    "!empty" => Value::Bool(!is_empty(&value)),
    "add" => arithmetic(value, args, |a, b| a + b, |a, b| Some(a + b)),
    "sub" => arithmetic(value, args, |a, b| a - b, |a, b| Some(a - b)),
    "mul" => arithmetic(value, args, |a, b| a * b, |a, b| Some(a * b)),
    "div" => arithmetic(
      value,
      args,
      |a, b| a / b,
      |a, b| (b != 0 && a % b == 0).then(|| a / b),
    ),
    "gt" => compare(&value, args, |o| o == std::cmp::Ordering::Greater),
    "gte" => compare(&value, args, |o| o != std::cmp::Ordering::Less),
    "lt" => compare(&value, args, |o| o == std::cmp::Ordering::Less),
    "lte" => compare(&value, args, |o| o != std::cmp::Ordering::Greater),
    "eq" => Value::Bool(args.first() == Some(&value)),
    "neq" => Value::Bool(args.first() != Some(&value)),
    _ => {
      return Err(ResolveError::HelperNotFound {
        name: name.to_string(),
      });
    }
  };

  Ok(result)
}

fn map_string(value: Value, f: impl Fn(&str) -> String) -> Value {
  match &value {
    Value::String(s) => Value::String(f(s)),
    _ => value,
  }
}

fn trim(value: Value) -> Value {
  match value {
    Value::String(s) => Value::String(s.trim().to_string()),
    Value::Array(items) => Value::Array(
      items
        .into_iter()
        .map(|item| match item {
          Value::String(s) => Value::String(s.trim().to_string()),
          other => other,
        })
        .collect(),
    ),
    other => other,
  }
}

fn slice(value: Value, args: &[Value]) -> Value {
  let (Some(start), Some(end)) = (arg_usize(args, 0), arg_usize(args, 1)) else {
    return value;
  };

  match &value {
    Value::String(s) => {
      let chars: Vec<char> = s.chars().collect();
      let end = end.min(chars.len());
      let start = start.min(end);
      Value::String(chars[start..end].iter().collect())
    }
    Value::Array(items) => {
      let end = end.min(items.len());
      let start = start.min(end);
      Value::Array(items[start..end].to_vec())
    }
    _ => value,
  }
}

fn length(value: &Value) -> Value {
  let len = match value {
    Value::String(s) => s.chars().count(),
    Value::Array(items) => items.len(),
    Value::Object(map) => map.len(),
    _ => 0,
  };
  Value::Number(len.into())
}

fn replace(value: Value, args: &[Value]) -> Value {
  let (Some(Value::String(search)), Some(Value::String(replacement))) =
    (args.first(), args.get(1))
  else {
    return value;
  };

  match &value {
    Value::String(s) => Value::String(s.replace(search.as_str(), replacement)),
    _ => value,
  }
}

fn truncate(value: Value, args: &[Value]) -> Value {
  let (Some(head), Some(tail)) = (arg_usize(args, 0), arg_usize(args, 1)) else {
    return value;
  };

  match &value {
    Value::String(s) => {
      let chars: Vec<char> = s.chars().collect();
      if chars.len() <= head + tail {
        return value;
      }
      let prefix: String = chars[..head].iter().collect();
      let suffix: String = chars[chars.len() - tail..].iter().collect();
      Value::String(format!("{}...{}", prefix, suffix))
    }
    _ => value,
  }
}

fn type_test(value: &Value, args: &[Value]) -> Value {
  let Some(Value::String(kind)) = args.first() else {
    return Value::Bool(false);
  };

  let matches = match kind.as_str() {
    // Null stands in for both "no value" kinds; it never matches any other.
    "null" | "undefined" => value.is_null(),
    _ if value.is_null() => false,
    "array" => value.is_array(),
    "object" => value.is_object(),
    "string" => value.is_string(),
    "boolean" => value.is_boolean(),
    "number" => value.is_number(),
    "date" => value
      .as_str()
      .is_some_and(|s| DateTime::parse_from_rfc3339(s).is_ok()),
    _ => false,
  };

  Value::Bool(matches)
}

fn concat(value: Value, args: &[Value]) -> Value {
  let Some(arg) = args.first() else {
    return value;
  };

  match (&value, arg) {
    (Value::String(s), Value::String(suffix)) => Value::String(format!("{}{}", s, suffix)),
    (Value::Array(items), Value::Array(extra)) => {
      let mut joined = items.clone();
      joined.extend(extra.iter().cloned());
      Value::Array(joined)
    }
    (Value::Array(items), other) => {
      let mut joined = items.clone();
      joined.push(other.clone());
      Value::Array(joined)
    }
    _ => value,
  }
}

fn is_empty(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    Value::Array(items) => items.is_empty(),
    Value::Object(map) => map.is_empty(),
    _ => false,
  }
}

fn arithmetic(
  value: Value,
  args: &[Value],
  float_op: impl Fn(f64, f64) -> f64,
  int_op: impl Fn(i64, i64) -> Option<i64>,
) -> Value {
  let (Some(lhs), Some(rhs)) = (value.as_f64(), args.first().and_then(Value::as_f64)) else {
    return value;
  };

  // Keep integer results integral so downstream equality checks stay exact.
  if let (Some(a), Some(b)) = (value.as_i64(), args.first().and_then(Value::as_i64)) {
    if let Some(n) = int_op(a, b) {
      return Value::Number(n.into());
    }
  }

  serde_json::Number::from_f64(float_op(lhs, rhs))
    .map(Value::Number)
    .unwrap_or(Value::Null)
}

fn compare(value: &Value, args: &[Value], test: impl Fn(std::cmp::Ordering) -> bool) -> Value {
  let ordering = match (value, args.first()) {
    (Value::Number(a), Some(Value::Number(b))) => a
      .as_f64()
      .zip(b.as_f64())
      .and_then(|(a, b)| a.partial_cmp(&b)),
    (Value::String(a), Some(Value::String(b))) => Some(a.as_str().cmp(b.as_str())),
    _ => None,
  };

  Value::Bool(ordering.is_some_and(test))
}

fn arg_usize(args: &[Value], index: usize) -> Option<usize> {
  args.get(index).and_then(Value::as_u64).map(|n| n as usize)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn case_filters_are_noops_on_non_strings() {
    assert_eq!(apply("upper", json!("abc"), &[]).unwrap(), json!("ABC"));
    assert_eq!(apply("upper", json!(42), &[]).unwrap(), json!(42));
    assert_eq!(apply("lower", json!("ABC"), &[]).unwrap(), json!("abc"));
  }

  #[test]
  fn trim_works_elementwise_on_arrays() {
    assert_eq!(apply("trim", json!("  x  "), &[]).unwrap(), json!("x"));
    assert_eq!(
      apply("trim", json!([" a ", "b", 3]), &[]).unwrap(),
      json!(["a", "b", 3])
    );
  }

  #[test]
  fn sha256_hexdigest() {
    let result = apply("sha256", json!("abc"), &[]).unwrap();
    assert_eq!(
      result,
      json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
    assert_eq!(apply("sha256", json!(1), &[]).unwrap(), json!(1));
  }

  #[test]
  fn json_round_trip() {
    assert_eq!(
      apply("json_encode", json!({"a": 1}), &[]).unwrap(),
      json!(r#"{"a":1}"#)
    );
    assert_eq!(
      apply("json_decode", json!(r#"{"a":1}"#), &[]).unwrap(),
      json!({"a": 1})
    );
    // Decode failure falls back to the original string.
    assert_eq!(
      apply("json_decode", json!("not json"), &[]).unwrap(),
      json!("not json")
    );
  }

  #[test]
  fn slice_and_length() {
    assert_eq!(
      apply("slice", json!("hello"), &[json!(1), json!(3)]).unwrap(),
      json!("el")
    );
    assert_eq!(
      apply("slice", json!([1, 2, 3, 4]), &[json!(0), json!(2)]).unwrap(),
      json!([1, 2])
    );
    assert_eq!(apply("length", json!("hello"), &[]).unwrap(), json!(5));
    assert_eq!(apply("length", json!([1, 2]), &[]).unwrap(), json!(2));
    assert_eq!(apply("length", json!({"a": 1}), &[]).unwrap(), json!(1));
    assert_eq!(apply("length", json!(true), &[]).unwrap(), json!(0));
  }

  #[test]
  fn truncate_joins_head_and_tail() {
    assert_eq!(
      apply("truncate", json!("abcdefghij"), &[json!(3), json!(2)]).unwrap(),
      json!("abc...ij")
    );
    // Short enough strings pass through.
    assert_eq!(
      apply("truncate", json!("abcd"), &[json!(3), json!(2)]).unwrap(),
      json!("abcd")
    );
  }

  #[test]
  fn type_tests() {
    assert_eq!(
      apply("type", json!([1]), &[json!("array")]).unwrap(),
      json!(true)
    );
    assert_eq!(
      apply("type", json!(null), &[json!("null")]).unwrap(),
      json!(true)
    );
    assert_eq!(
      apply("type", json!(null), &[json!("string")]).unwrap(),
      json!(false)
    );
    assert_eq!(
      apply("type", json!("2024-01-01T00:00:00Z"), &[json!("date")]).unwrap(),
      json!(true)
    );
    assert_eq!(
      apply("type", json!("tomorrow"), &[json!("date")]).unwrap(),
      json!(false)
    );
  }

  #[test]
  fn default_substitutes_null_only() {
    assert_eq!(
      apply("default", json!(null), &[json!("fallback")]).unwrap(),
      json!("fallback")
    );
    assert_eq!(
      apply("default", json!(0), &[json!("fallback")]).unwrap(),
      json!(0)
    );
  }

  #[test]
  fn merge_and_concat() {
    assert_eq!(
      apply("merge", json!({"a": 1}), &[json!({"b": 2})]).unwrap(),
      json!({"a": 1, "b": 2})
    );
    assert_eq!(apply("merge", json!(3), &[json!({"b": 2})]).unwrap(), json!(3));
    assert_eq!(
      apply("concat", json!("ab"), &[json!("cd")]).unwrap(),
      json!("abcd")
    );
    assert_eq!(
      apply("concat", json!([1]), &[json!([2, 3])]).unwrap(),
      json!([1, 2, 3])
    );
    assert_eq!(apply("concat", json!(5), &[json!(6)]).unwrap(), json!(5));
  }

  #[test]
  fn censor_masks_every_character() {
    assert_eq!(
      apply("censor", json!("secret"), &[]).unwrap(),
      json!("******")
    );
  }

  #[test]
  fn existence_tests() {
    assert_eq!(apply("!null", json!(null), &[]).unwrap(), json!(false));
    assert_eq!(apply("!null", json!(0), &[]).unwrap(), json!(true));
    assert_eq!(apply("!empty", json!(""), &[]).unwrap(), json!(false));
    assert_eq!(apply("!empty", json!([]), &[]).unwrap(), json!(false));
    assert_eq!(apply("!empty", json!("x"), &[]).unwrap(), json!(true));
  }

  #[test]
  fn arithmetic_keeps_integers_integral() {
    assert_eq!(apply("add", json!(42), &[json!(5)]).unwrap(), json!(47));
    assert_eq!(apply("sub", json!(10), &[json!(4)]).unwrap(), json!(6));
    assert_eq!(apply("mul", json!(6), &[json!(7)]).unwrap(), json!(42));
    assert_eq!(apply("div", json!(10), &[json!(2)]).unwrap(), json!(5));
    assert_eq!(apply("div", json!(5), &[json!(2)]).unwrap(), json!(2.5));
    // Non-numeric input is untouched.
    assert_eq!(apply("add", json!("x"), &[json!(5)]).unwrap(), json!("x"));
  }

  #[test]
  fn comparisons() {
    assert_eq!(apply("gt", json!(3), &[json!(2)]).unwrap(), json!(true));
    assert_eq!(apply("lte", json!(2), &[json!(2)]).unwrap(), json!(true));
    assert_eq!(apply("lt", json!("a"), &[json!("b")]).unwrap(), json!(true));
    assert_eq!(apply("eq", json!("a"), &[json!("a")]).unwrap(), json!(true));
    assert_eq!(apply("neq", json!(1), &[json!(2)]).unwrap(), json!(true));
    assert_eq!(apply("gt", json!([1]), &[json!(2)]).unwrap(), json!(false));
  }

  #[test]
  fn unknown_filter_is_fatal() {
    let err = apply("reticulate", json!(1), &[]).unwrap_err();
    assert!(err.to_string().contains("helper not found"));
  }
}

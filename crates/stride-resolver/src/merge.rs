use serde_json::Value;

/// Deep-merge two JSON values.
///
/// Objects are merged key by key, with `overlay` winning on conflicting
/// leaves. Any non-object pair resolves to the overlay.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
  match (base, overlay) {
    (Value::Object(base_obj), Value::Object(overlay_obj)) => {
      let mut result = base_obj.clone();
      for (key, value) in overlay_obj {
        if let Some(base_value) = result.get(key) {
          result.insert(key.clone(), deep_merge(base_value, value));
        } else {
          result.insert(key.clone(), value.clone());
        }
      }
      Value::Object(result)
    }
    (_, overlay) => overlay.clone(),
  }
}

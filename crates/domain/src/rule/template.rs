//! `{{value}}` substitution in effect values.

use serde_json::Value;

const PLACEHOLDER: &str = "{{value}}";

/// Substitute the triggering property value into an effect value.
///
/// A string that is exactly `{{value}}` becomes `trigger_value` with its JSON
/// type preserved. A longer string gets the value's text spliced in. Without
/// a triggering value, or for non-string values, `value` is returned as is.
#[must_use]
pub fn render(value: &Value, trigger_value: Option<&Value>) -> Value {
    let (Value::String(text), Some(replacement)) = (value, trigger_value) else {
        return value.clone();
    };
    if text == PLACEHOLDER {
        return replacement.clone();
    }
    if !text.contains(PLACEHOLDER) {
        return value.clone();
    }
    let rendered = match replacement {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Value::String(text.replace(PLACEHOLDER, &rendered))
}

//! Locate the first balanced JSON object in free-form model output.
//!
//! Models wrap JSON in prose and markdown fences. The scanner counts brace
//! depth outside of string literals (honoring escapes) and parses the first
//! top-level `{…}` it closes.

use serde_json::{Map, Value};

use notegraph_core::{Error, RawModelOutput, Result};

/// Byte range of the first balanced top-level object, if any.
pub fn find_balanced_object(text: &str) -> Option<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut start = None;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if start.is_some() => in_string = true,
            b'{' => {
                if start.is_none() {
                    start = Some(i);
                }
                depth += 1;
            }
            b'}' if start.is_some() => {
                depth -= 1;
                if depth == 0 {
                    return start.map(|s| (s, i + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first balanced object out of `text`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>> {
    let (start, end) = find_balanced_object(text)
        .ok_or_else(|| Error::parse("no balanced JSON object found in model output", text))?;

    let value: Value = serde_json::from_str(&text[start..end])
        .map_err(|e| Error::parse(format!("model output is not valid JSON: {}", e), text))?;

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Shape("top-level value is not an object".to_string())),
    }
}

/// Normalize raw model output (object or text) into a JSON object.
pub fn decode_raw(raw: &RawModelOutput) -> Result<Map<String, Value>> {
    match raw {
        RawModelOutput::Object(Value::Object(map)) => Ok(map.clone()),
        // Some providers hand back the JSON document as a string value.
        RawModelOutput::Object(Value::String(text)) => extract_json_object(text),
        RawModelOutput::Object(other) => Err(Error::Shape(format!(
            "top-level value is not an object (got {})",
            json_kind(other)
        ))),
        RawModelOutput::Text(text) => extract_json_object(text),
    }
}

/// Human label for a JSON value's type.
pub fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

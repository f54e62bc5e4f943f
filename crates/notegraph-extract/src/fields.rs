//! Typed field access over untrusted JSON with labeled error paths.
//!
//! Every accessor reports the full path of the offending field
//! (`facts[3].evidenceEnd`) so diagnostics point at the exact value the
//! model got wrong.

use serde_json::{Map, Value};

use notegraph_core::{Error, Result};

use crate::json_scan::json_kind;

/// Read-only view over one JSON object at a known path.
pub struct Fields<'a> {
    map: &'a Map<String, Value>,
    path: String,
}

impl<'a> Fields<'a> {
    /// View over the root object.
    pub fn root(map: &'a Map<String, Value>) -> Self {
        Self {
            map,
            path: String::new(),
        }
    }

    /// View over `value`, which must be an object, at `path`.
    pub fn at(value: &'a Value, path: String) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self { map, path }),
            other => Err(Error::schema(
                path,
                format!("expected object, got {}", json_kind(other)),
            )),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Path of a child field.
    pub fn child(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn present(&self, key: &str) -> Option<&'a Value> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(v) => Some(v),
        }
    }

    fn mistyped(&self, key: &str, expected: &str, got: &Value) -> Error {
        Error::schema(
            self.child(key),
            format!("expected {}, got {}", expected, json_kind(got)),
        )
    }

    pub fn string(&self, key: &str) -> Result<String> {
        self.opt_string(key)?
            .ok_or_else(|| Error::schema(self.child(key), "missing required string"))
    }

    pub fn opt_string(&self, key: &str) -> Result<Option<String>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.mistyped(key, "string", other)),
        }
    }

    /// Optional string where an empty value counts as absent.
    pub fn opt_nonempty_string(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .opt_string(key)?
            .filter(|s| !s.trim().is_empty()))
    }

    pub fn number(&self, key: &str) -> Result<f64> {
        match self.present(key) {
            None => Err(Error::schema(self.child(key), "missing required number")),
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| Error::schema(self.child(key), "number out of range")),
            Some(other) => Err(self.mistyped(key, "number", other)),
        }
    }

    /// Signed integer; floats with a fractional part are rejected.
    pub fn integer(&self, key: &str) -> Result<i64> {
        self.opt_integer(key)?
            .ok_or_else(|| Error::schema(self.child(key), "missing required integer"))
    }

    pub fn opt_integer(&self, key: &str) -> Result<Option<i64>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Some(i));
                }
                match n.as_f64() {
                    Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Some(f as i64))
                    }
                    _ => Err(Error::schema(
                        self.child(key),
                        format!("expected integer, got {}", n),
                    )),
                }
            }
            Some(other) => Err(self.mistyped(key, "integer", other)),
        }
    }

    /// Required confidence in `[0, 1]`.
    pub fn confidence(&self, key: &str) -> Result<f64> {
        let value = self.number(key)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(Error::schema(
                self.child(key),
                format!("confidence {} outside [0, 1]", value),
            ));
        }
        Ok(value)
    }

    pub fn opt_confidence(&self, key: &str) -> Result<Option<f64>> {
        match self.present(key) {
            None => Ok(None),
            Some(_) => self.confidence(key).map(Some),
        }
    }

    pub fn array(&self, key: &str) -> Result<&'a Vec<Value>> {
        self.opt_array(key)?
            .ok_or_else(|| Error::schema(self.child(key), "missing required array"))
    }

    pub fn opt_array(&self, key: &str) -> Result<Option<&'a Vec<Value>>> {
        match self.present(key) {
            None => Ok(None),
            Some(Value::Array(items)) => Ok(Some(items)),
            Some(other) => Err(self.mistyped(key, "array", other)),
        }
    }

    /// Array of strings.
    pub fn string_list(&self, key: &str) -> Result<Vec<String>> {
        let items = match self.opt_array(key)? {
            Some(items) => items,
            None => return Ok(Vec::new()),
        };
        items
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::String(s) => Ok(s.clone()),
                other => Err(Error::schema(
                    format!("{}[{}]", self.child(key), i),
                    format!("expected string, got {}", json_kind(other)),
                )),
            })
            .collect()
    }

    /// Parse a wire enum via `FromStr`, relabeling the error with this path.
    pub fn enumeration<T>(&self, key: &str) -> Result<T>
    where
        T: std::str::FromStr<Err = Error>,
    {
        let raw = self.string(key)?;
        raw.parse::<T>().map_err(|e| match e {
            Error::Schema { message, .. } => Error::schema(self.child(key), message),
            other => other,
        })
    }

    pub fn opt_enumeration<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr<Err = Error>,
    {
        match self.opt_nonempty_string(key)? {
            None => Ok(None),
            Some(_) => self.enumeration(key).map(Some),
        }
    }
}

/// Iterate an array as object views with indexed paths.
pub fn objects<'a>(
    items: &'a [Value],
    path: &'a str,
) -> impl Iterator<Item = Result<Fields<'a>>> + 'a {
    items
        .iter()
        .enumerate()
        .map(move |(i, v)| Fields::at(v, format!("{}[{}]", path, i)))
}

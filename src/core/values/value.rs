use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordered string-keyed map of values
///
/// Ordering is by key so that iteration, logging and serialization are deterministic.
pub type Record = BTreeMap<String, Value>;

/// Dynamically typed value exchanged between components
///
/// Parameters, state records, port values, message payloads and event action values all
/// use this one type, so a value read from a connection can be written anywhere else
/// without conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<Value>),
    Map(Record),
}

impl Value {
    /// Numeric view of the value; booleans read as 0/1
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// Boolean view of the value; numbers are true when non-zero
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => Some(*n != 0.0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short name of the variant, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    /// Follow a sequence of map keys
    pub fn get_path(&self, path: &[String]) -> Option<&Value> {
        let mut current = self;
        for segment in path {
            current = current.as_record()?.get(segment)?;
        }
        Some(current)
    }

    /// Write `value` at `path`, creating intermediate maps when a segment is missing
    pub fn set_path(&mut self, path: &[String], value: Value) -> Result<(), String> {
        let Some((last, parents)) = path.split_last() else {
            *self = value;
            return Ok(());
        };

        let mut current = self;
        for segment in parents {
            if current.is_null() {
                *current = Value::Map(Record::new());
            }
            let map = match current {
                Value::Map(m) => m,
                other => {
                    return Err(format!(
                        "cannot descend into '{}': value is a {}",
                        segment,
                        other.kind()
                    ))
                }
            };
            current = map
                .entry(segment.clone())
                .or_insert_with(|| Value::Map(Record::new()));
        }

        if current.is_null() {
            *current = Value::Map(Record::new());
        }
        match current {
            Value::Map(m) => {
                m.insert(last.clone(), value);
                Ok(())
            }
            other => Err(format!("cannot set '{}' on a {}", last, other.kind())),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            other => match serde_json::to_string(other) {
                Ok(json) => write!(f, "{}", json),
                Err(_) => write!(f, "<{}>", other.kind()),
            },
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<Record> for Value {
    fn from(value: Record) -> Self {
        Value::Map(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

/// Typed accessors for reading parameters out of a [`Record`]
pub trait RecordExt {
    fn get_f64(&self, key: &str) -> Option<f64>;
    fn get_f64_or(&self, key: &str, default: f64) -> f64;
    fn get_bool_or(&self, key: &str, default: bool) -> bool;
    fn get_str(&self, key: &str) -> Option<&str>;
    /// Numeric parameter that must be present
    fn require_f64(&self, key: &str) -> Result<f64, String>;
}

impl RecordExt for Record {
    fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(Value::as_f64)
    }

    fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn require_f64(&self, key: &str) -> Result<f64, String> {
        match self.get(key) {
            Some(value) => value
                .as_f64()
                .ok_or_else(|| format!("parameter '{}' must be a number, found {}", key, value.kind())),
            None => Err(format!("missing required parameter '{}'", key)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(segments: &[&str]) -> Vec<String> {
        segments.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_deserialize_untagged() {
        let value: Value = serde_json::from_str(r#"{"a": 1, "b": [true, null], "c": "x"}"#).unwrap();
        let record = value.as_record().unwrap();
        assert_eq!(record.get("a"), Some(&Value::Number(1.0)));
        assert_eq!(
            record.get("b"),
            Some(&Value::List(vec![Value::Bool(true), Value::Null]))
        );
        assert_eq!(record.get_str("c"), Some("x"));
    }

    #[test]
    fn test_set_path_creates_intermediate_maps() {
        let mut value = Value::Null;
        value.set_path(&path(&["params", "opening"]), Value::Number(0.5)).unwrap();
        assert_eq!(
            value.get_path(&path(&["params", "opening"])),
            Some(&Value::Number(0.5))
        );
    }

    #[test]
    fn test_set_path_rejects_scalar_parent() {
        let mut value = Value::Map(Record::new());
        value.set_path(&path(&["level"]), Value::Number(1.0)).unwrap();
        let err = value
            .set_path(&path(&["level", "inner"]), Value::Number(2.0))
            .unwrap_err();
        assert!(err.contains("number"));
    }

    #[test]
    fn test_require_f64_messages() {
        let mut record = Record::new();
        record.insert("area".to_string(), Value::from("wide"));
        assert!(record.require_f64("area").unwrap_err().contains("must be a number"));
        assert!(record.require_f64("depth").unwrap_err().contains("missing"));
    }
}

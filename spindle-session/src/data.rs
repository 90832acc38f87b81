//! Copy-on-write session data.

use crate::error::{SessionError, SessionResult};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Key-value data of one session.
///
/// Clones share the underlying map until one of them is modified.
///
/// ```
/// use spindle_session::SessionData;
///
/// let mut data = SessionData::new();
/// data.set("user_id", 42).unwrap().set("theme", "dark").unwrap();
///
/// let snapshot = data.clone();
/// data.delete("theme");
///
/// assert!(snapshot.has("theme"));
/// assert!(!data.has("theme"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionData {
    data: Arc<Map<String, Value>>,
}

impl SessionData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Data of a stored session. Anything but an object reads as empty.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self {
                data: Arc::new(map.clone()),
            },
            _ => Self::default(),
        }
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Deserialize the value at `key`; `None` when missing or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> SessionResult<&mut Self> {
        let value = serde_json::to_value(value)?;
        Arc::make_mut(&mut self.data).insert(key.into(), value);
        Ok(self)
    }

    /// Replace every entry with the entries of `value`, which must be an
    /// object.
    pub fn replace(&mut self, value: Value) -> SessionResult<&mut Self> {
        match value {
            Value::Object(map) => {
                self.data = Arc::new(map);
                Ok(self)
            }
            other => Err(SessionError::InvalidData(format!(
                "expected an object, got {}",
                kind(&other)
            ))),
        }
    }

    pub fn delete(&mut self, key: &str) -> &mut Self {
        if self.data.contains_key(key) {
            Arc::make_mut(&mut self.data).remove(key);
        }
        self
    }

    pub fn delete_all<I, S>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.delete(key.as_ref());
        }
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        if !self.data.is_empty() {
            self.data = Arc::new(Map::new());
        }
        self
    }

    /// The data as a JSON object.
    pub fn data(&self) -> Value {
        Value::Object((*self.data).clone())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

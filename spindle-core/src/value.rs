//! Dynamic values passed through resolver chains.
//!
//! A resolver receives the value produced by the previous resolver of the
//! same parameter and returns the next one. Whatever is left at the end of
//! the chain becomes the controller method argument at that index.

use crate::error::BoxError;
use crate::{Error, HttpError, HttpRequest, ResponseWriter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// A value produced by a resolver.
#[derive(Clone, Default)]
pub enum ParamValue {
    /// Nothing was provided.
    #[default]
    Undefined,
    Json(serde_json::Value),
    Request(HttpRequest),
    Response(ResponseWriter),
    /// An arbitrary shared value, e.g. a loaded entity.
    Any(Arc<dyn Any + Send + Sync>),
}

static UNDEFINED: ParamValue = ParamValue::Undefined;

impl ParamValue {
    pub fn any<T: Send + Sync + 'static>(value: T) -> Self {
        ParamValue::Any(Arc::new(value))
    }

    /// Serialize `value` into a JSON value.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self, Error> {
        serde_json::to_value(value)
            .map(ParamValue::Json)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, ParamValue::Undefined)
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            ParamValue::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_json().and_then(serde_json::Value::as_str)
    }

    pub fn as_request(&self) -> Option<&HttpRequest> {
        match self {
            ParamValue::Request(req) => Some(req),
            _ => None,
        }
    }

    pub fn as_response(&self) -> Option<&ResponseWriter> {
        match self {
            ParamValue::Response(res) => Some(res),
            _ => None,
        }
    }

    pub fn downcast<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        match self {
            ParamValue::Any(value) => value.clone().downcast::<T>().ok(),
            _ => None,
        }
    }

    /// Deserialize a JSON value; `Undefined` reads as `null` so that
    /// `Option<T>` targets accept missing parameters.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let value = match self {
            ParamValue::Undefined => serde_json::Value::Null,
            ParamValue::Json(value) => value.clone(),
            other => {
                return Err(HttpError::unprocessable_entity()
                    .with_message(format!("Expected a JSON value, got {}", other.kind())));
            }
        };
        serde_json::from_value(value)
            .map_err(|e| HttpError::unprocessable_entity().with_message(e.to_string()))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Undefined => "undefined",
            ParamValue::Json(_) => "json",
            ParamValue::Request(_) => "request",
            ParamValue::Response(_) => "response",
            ParamValue::Any(_) => "any",
        }
    }
}

impl fmt::Debug for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Undefined => f.write_str("Undefined"),
            ParamValue::Json(value) => f.debug_tuple("Json").field(value).finish(),
            ParamValue::Request(req) => f
                .debug_tuple("Request")
                .field(&format_args!("{} {}", req.method, req.url))
                .finish(),
            ParamValue::Response(res) => f.debug_tuple("Response").field(res).finish(),
            ParamValue::Any(_) => f.write_str("Any(..)"),
        }
    }
}

impl From<serde_json::Value> for ParamValue {
    fn from(value: serde_json::Value) -> Self {
        ParamValue::Json(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Json(serde_json::Value::String(value.to_string()))
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Json(serde_json::Value::String(value))
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Json(value.into())
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Json(value.into())
    }
}

impl From<HttpRequest> for ParamValue {
    fn from(req: HttpRequest) -> Self {
        ParamValue::Request(req)
    }
}

impl From<ResponseWriter> for ParamValue {
    fn from(res: ResponseWriter) -> Self {
        ParamValue::Response(res)
    }
}

/// JSON responder for any serializable value returned from a handler.
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

/// Conversion of a controller method's return value.
pub trait IntoParamValue {
    fn into_param_value(self) -> Result<ParamValue, BoxError>;
}

impl IntoParamValue for ParamValue {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(self)
    }
}

impl IntoParamValue for () {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(ParamValue::Undefined)
    }
}

impl IntoParamValue for serde_json::Value {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(ParamValue::Json(self))
    }
}

impl IntoParamValue for ResponseWriter {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(ParamValue::Response(self))
    }
}

impl IntoParamValue for String {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(self.into())
    }
}

impl IntoParamValue for &'static str {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(self.into())
    }
}

impl<T: Serialize> IntoParamValue for Json<T> {
    fn into_param_value(self) -> Result<ParamValue, BoxError> {
        Ok(ParamValue::json(&self.0)?)
    }
}

/// Resolved arguments of one controller method call, in index order.
#[derive(Debug, Clone, Default)]
pub struct Args {
    values: Vec<ParamValue>,
}

impl Args {
    pub fn new(values: Vec<ParamValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Argument at `index`, `Undefined` when out of range.
    pub fn get(&self, index: usize) -> &ParamValue {
        self.values.get(index).unwrap_or(&UNDEFINED)
    }

    /// Take ownership of the argument at `index`, leaving `Undefined`.
    pub fn take(&mut self, index: usize) -> ParamValue {
        self.values
            .get_mut(index)
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Deserialize the JSON argument at `index`.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> Result<T, HttpError> {
        self.get(index).deserialize().map_err(|err| {
            let message = format!("Invalid argument {}: {}", index, err.message());
            err.with_message(message)
        })
    }

    pub fn str(&self, index: usize) -> Option<&str> {
        self.get(index).as_str()
    }

    pub fn request(&self, index: usize) -> Result<HttpRequest, HttpError> {
        self.get(index).as_request().cloned().ok_or_else(|| {
            HttpError::internal().with_message(format!("Argument {} is not a request", index))
        })
    }

    pub fn response(&self, index: usize) -> Result<ResponseWriter, HttpError> {
        self.get(index).as_response().cloned().ok_or_else(|| {
            HttpError::internal().with_message(format!("Argument {} is not a response", index))
        })
    }

    pub fn downcast<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>, HttpError> {
        self.get(index).downcast::<T>().ok_or_else(|| {
            HttpError::internal().with_message(format!(
                "Argument {} is not a {}",
                index,
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn into_vec(self) -> Vec<ParamValue> {
        self.values
    }
}

impl From<Vec<ParamValue>> for Args {
    fn from(values: Vec<ParamValue>) -> Self {
        Self::new(values)
    }
}

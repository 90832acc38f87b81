// Error types for the Spindle framework

use crate::status;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A boxed failure raised by a resolver or a controller method.
///
/// Anything implementing `std::error::Error` can be returned with `?`;
/// [`HttpError`] values are recognized and translated verbatim.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Framework errors raised outside of request handling.
///
/// `Configuration` errors are fatal to start-up: they are returned from
/// controller registration and method compilation and must not be ignored.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Dependency injection error: {0}")]
    DependencyInjection(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration(message.into())
    }
}

/// Application error code carried in error payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorCode {
    Int(i64),
    Text(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCode::Int(code) => write!(f, "{}", code),
            ErrorCode::Text(code) => f.write_str(code),
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> Self {
        ErrorCode::Int(code)
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        ErrorCode::Int(code as i64)
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        ErrorCode::Text(code.to_string())
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        ErrorCode::Text(code)
    }
}

/// Default code of the generic internal error.
pub const INTERNAL_ERROR_CODE: i64 = -32603;

/// Default code of the not-found error, also used by the fallback route.
pub const NOT_FOUND_CODE: i64 = -32601;

/// A deliberate error carrying the HTTP status it should produce.
///
/// # Example
///
/// ```
/// use spindle_core::HttpError;
///
/// let err = HttpError::not_found().with_message("No such user");
/// assert_eq!(err.status_code(), 404);
/// assert_eq!(err.message(), "No such user");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HttpError {
    status_code: u16,
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
}

macro_rules! http_errors {
    ($($(#[$doc:meta])* $name:ident => ($status:expr, $code:expr, $message:expr);)+) => {
        impl HttpError {
            $(
                $(#[$doc])*
                pub fn $name() -> Self {
                    Self::new($status, $message).with_code($code)
                }
            )+
        }
    };
}

http_errors! {
    /// 400 Bad Request
    bad_request => (400, -32602, "Bad Request");
    /// 401 Unauthorized
    unauthorized => (401, -32090, "Unauthorized");
    /// 403 Forbidden
    forbidden => (403, -32091, "Forbidden");
    /// 404 Not Found
    not_found => (404, NOT_FOUND_CODE, "Not Found");
    /// 405 Method Not Allowed
    method_not_allowed => (405, -32092, "Method Not Allowed");
    /// 413 Payload Too Large
    payload_too_large => (413, -32093, "Payload Too Large");
    /// 418 I'm a teapot
    teapot => (418, -32099, "I'm a teapot");
    /// 422 Unprocessable Entity
    unprocessable_entity => (422, -32600, "Unprocessable Entity");
    /// 423 Locked
    locked => (423, -32094, "Locked");
    /// 429 Too Many Requests
    too_many_requests => (429, -32095, "Too Many Requests");
    /// 500 Internal Server Error
    internal => (500, INTERNAL_ERROR_CODE, "Internal Server Error");
}

impl HttpError {
    /// Create an error with an explicit status; the code defaults to `0`.
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            status_code: if status_code == 0 { 500 } else { status_code },
            code: ErrorCode::Int(0),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_code(mut self, code: impl Into<ErrorCode>) -> Self {
        self.code = code.into();
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn code(&self) -> &ErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&serde_json::Value> {
        self.details.as_ref()
    }

    /// Status reason phrase, e.g. `"Not Found"`.
    pub fn name(&self) -> &'static str {
        status::status_name(self.status_code)
    }

    pub fn is_client_error(&self) -> bool {
        status::is_client_error(self.status_code)
    }

    pub fn is_server_error(&self) -> bool {
        status::is_server_error(self.status_code)
    }

    /// The JSON envelope written to the client.
    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code.clone(),
            message: self.message.clone(),
            details: self.details.clone(),
        }
    }

    /// Find an `HttpError` in a boxed failure or anywhere in its source chain.
    pub fn find<'a>(error: &'a (dyn std::error::Error + 'static)) -> Option<&'a HttpError> {
        let mut current = Some(error);
        while let Some(err) = current {
            if let Some(http) = err.downcast_ref::<HttpError>() {
                return Some(http);
            }
            current = err.source();
        }
        None
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message)
    }
}

impl std::error::Error for HttpError {}

impl From<Error> for HttpError {
    fn from(err: Error) -> Self {
        HttpError::internal().with_message(err.to_string())
    }
}

/// Error envelope `{ code, message, details? }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

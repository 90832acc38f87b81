//! Error types for RPC calls.

use spindle_core::{BoxError, HttpError};
use thiserror::Error;

/// Result type for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// RPC errors.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No handler is bound to the method name
    #[error("Unknown RPC method: {0}")]
    UnknownMethod(String),

    /// An exposed handler is missing from the controller's methods
    #[error("RPC method \"{method}\" refers to unknown handler {controller}.{handler}")]
    MissingHandler {
        method: String,
        controller: &'static str,
        handler: String,
    },

    #[error("Invalid RPC method name: {0:?}")]
    InvalidMethodName(String),

    /// The handler's parameters could not be prepared
    #[error(transparent)]
    Configuration(#[from] spindle_core::Error),

    /// The handler or one of its resolvers failed
    #[error("{0}")]
    Failed(#[source] BoxError),

    /// The handler returned something that is not JSON
    #[error("RPC method \"{0}\" returned a value that cannot be serialized")]
    NotSerializable(String),
}

impl RpcError {
    /// Error to hand to HTTP error translation. Handler failures are passed
    /// through unchanged so typed HTTP errors keep their status.
    pub fn into_http(self) -> BoxError {
        match self {
            RpcError::UnknownMethod(method) => {
                Box::new(HttpError::not_found().with_message(format!("Unknown RPC method: {}", method)))
            }
            RpcError::InvalidMethodName(_) => Box::new(HttpError::bad_request().with_message(self.to_string())),
            RpcError::Failed(err) => err,
            other => Box::new(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_http() {
        let unknown = RpcError::UnknownMethod("nope".into()).into_http();
        assert_eq!(HttpError::find(unknown.as_ref()).unwrap().status_code(), 404);

        let failed = RpcError::Failed(Box::new(HttpError::forbidden())).into_http();
        assert_eq!(HttpError::find(failed.as_ref()).unwrap().status_code(), 403);

        let generic = RpcError::NotSerializable("m".into()).into_http();
        assert!(HttpError::find(generic.as_ref()).is_none());
    }
}

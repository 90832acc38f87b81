//! Where a request carries its session id.

use spindle_core::{CookieOptions, HttpRequest};
use std::time::Duration;

/// Session id extraction.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionIdSource {
    /// `{name}: {token_type} {id}`
    Header { name: String, token_type: String },
    /// A cookie; the cookie is rewritten when a handler changes the id.
    Cookie { name: String, options: CookieOptions },
}

impl SessionIdSource {
    pub fn from_header(name: impl Into<String>, token_type: impl Into<String>) -> Self {
        SessionIdSource::Header {
            name: name.into(),
            token_type: token_type.into(),
        }
    }

    /// `Authorization: Bearer {id}`
    pub fn bearer() -> Self {
        Self::from_header("Authorization", "Bearer")
    }

    pub fn from_cookie(name: impl Into<String>, options: CookieOptions) -> Self {
        SessionIdSource::Cookie {
            name: name.into(),
            options,
        }
    }

    /// A `session` cookie kept for 24 hours, HTTP only and secure.
    pub fn cookie() -> Self {
        Self::from_cookie(
            "session",
            CookieOptions::new()
                .max_age(Duration::from_secs(86_400))
                .http_only(true)
                .secure(true),
        )
    }

    /// Session id of `req`, if any.
    pub fn extract(&self, req: &HttpRequest) -> Option<String> {
        let id = match self {
            SessionIdSource::Header { name, token_type } => {
                let value = req.header(name)?;
                if token_type.is_empty() {
                    value.trim().to_string()
                } else {
                    let rest = value.strip_prefix(token_type.as_str())?.strip_prefix(' ')?;
                    rest.trim().to_string()
                }
            }
            SessionIdSource::Cookie { name, .. } => req.cookie(name)?,
        };
        (!id.is_empty()).then_some(id)
    }
}

//! Failure to HTTP error translation.
//!
//! A failure that is (or wraps) an [`HttpError`] is used as-is. Anything
//! else becomes a 500 with code `-32603`, the message `"Error: <display>"`
//! and a best-effort `details.stack`.
//!
//! The stack is advisory. It is empty unless backtraces are enabled
//! (`RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`) and its shape depends on the
//! toolchain. Its frames are those of the translation site (`translate`
//! called from dispatch), not of the code that raised the failure; a
//! boxed error carries no backtrace of its own.

use crate::error::{BoxError, INTERNAL_ERROR_CODE};
use crate::{HttpError, ResponseWriter};
use once_cell::sync::Lazy;
use regex::Regex;
use std::backtrace::{Backtrace, BacktraceStatus};

static FRAME_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+:\s+(.+?)\s*$").expect("valid regex"));
static FRAME_AT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*at\s+(.+):(\d+):\d+\s*$").expect("valid regex"));
static FRAME_INLINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*at\s+(.+?)\s+\(.*?:(\d+):\d+\)\s*$").expect("valid regex"));
static HASH_SUFFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"::h[0-9a-f]{16}$").expect("valid regex"));

/// Classify a failure.
pub fn translate(error: &BoxError, expose_stack: bool) -> HttpError {
    classify(error.as_ref(), expose_stack)
}

/// Classify any error, looking for an `HttpError` through its sources.
pub fn classify(error: &(dyn std::error::Error + 'static), expose_stack: bool) -> HttpError {
    if let Some(http) = HttpError::find(error) {
        return http.clone();
    }

    let err = HttpError::internal()
        .with_code(INTERNAL_ERROR_CODE)
        .with_message(format!("Error: {}", error));

    if !expose_stack {
        return err;
    }

    let backtrace = Backtrace::capture();
    let stack = match backtrace.status() {
        BacktraceStatus::Captured => compact_stack(&backtrace.to_string()),
        _ => Vec::new(),
    };
    err.with_details(serde_json::json!({ "stack": stack }))
}

/// Reduce a rendered backtrace to `"function:line"` tokens.
///
/// Frames that cannot be parsed are kept verbatim (trimmed).
pub fn compact_stack(trace: &str) -> Vec<String> {
    let mut frames = Vec::new();
    let mut pending: Option<String> = None;

    for line in trace.lines() {
        if line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = FRAME_INLINE.captures(line) {
            if let Some(function) = pending.take() {
                frames.push(function);
            }
            frames.push(format!("{}:{}", short_function(&caps[1]), &caps[2]));
        } else if let Some(caps) = FRAME_AT.captures(line) {
            match pending.take() {
                Some(function) => frames.push(format!("{}:{}", short_function(&function), &caps[2])),
                None => frames.push(line.trim().to_string()),
            }
        } else if let Some(caps) = FRAME_FN.captures(line) {
            if let Some(function) = pending.replace(caps[1].to_string()) {
                frames.push(function);
            }
        } else {
            if let Some(function) = pending.take() {
                frames.push(function);
            }
            frames.push(line.trim().to_string());
        }
    }

    if let Some(function) = pending {
        frames.push(function);
    }
    frames
}

/// Last two path segments of a symbol, without closure markers or hash.
fn short_function(symbol: &str) -> String {
    let symbol = HASH_SUFFIX.replace(symbol, "");
    let segments: Vec<&str> = symbol
        .split("::")
        .filter(|s| !s.is_empty() && !s.starts_with("{{"))
        .collect();
    let start = segments.len().saturating_sub(2);
    segments[start..].join("::")
}

/// Write `error` as the JSON envelope `{ code, message, details? }`.
pub fn write_error(res: &ResponseWriter, error: &HttpError) {
    if res.is_sent() {
        tracing::warn!(
            status = error.status_code(),
            message = error.message(),
            "Response already sent, dropping error"
        );
        return;
    }

    res.status(error.status_code());
    if let Err(e) = res.json(&error.payload()) {
        tracing::error!(error = %e, "Failed to serialize error payload");
        res.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCode;
    use serde_json::json;

    #[test]
    fn test_http_error_is_verbatim() {
        let err: BoxError = Box::new(HttpError::not_found().with_message("X"));
        let translated = translate(&err, true);
        assert_eq!(translated.status_code(), 404);
        assert_eq!(translated.message(), "X");
        assert!(translated.details().is_none());
    }

    #[test]
    fn test_generic_error_is_internal() {
        let err: BoxError = "boom".into();
        let translated = translate(&err, true);
        assert_eq!(translated.status_code(), 500);
        assert_eq!(translated.code(), &ErrorCode::Int(-32603));
        assert_eq!(translated.message(), "Error: boom");
        assert!(translated.details().unwrap()["stack"].is_array());
    }

    #[test]
    fn test_stack_can_be_hidden() {
        let err: BoxError = "boom".into();
        assert!(translate(&err, false).details().is_none());
    }

    #[test]
    fn test_compact_stack() {
        let trace = "   0: spindle_core::translate::classify::h0123456789abcdef
             at ./src/translate.rs:42:17
   1: app::TestController::index::{{closure}}
             at ./src/main.rs:169:9
   2: <unknown>
    at TestController.index (/app/test.js:12:5)
some runtime frame";

        assert_eq!(
            compact_stack(trace),
            vec![
                "translate::classify:42",
                "TestController::index:169",
                "<unknown>",
                "TestController.index:12",
                "some runtime frame",
            ]
        );
    }

    #[test]
    fn test_write_error_envelope() {
        let res = ResponseWriter::new();
        write_error(&res, &HttpError::teapot());

        let response = res.snapshot();
        assert_eq!(response.status, 418);
        assert_eq!(
            response.json::<serde_json::Value>().unwrap(),
            json!({"code": -32099, "message": "I'm a teapot"})
        );
    }
}

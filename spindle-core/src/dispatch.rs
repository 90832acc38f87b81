//! Route binding and per-request dispatch.
//!
//! Every route of a registered controller is bound to a handler that
//! resolves the method arguments, invokes the method and writes either its
//! result or the translated error.

use crate::error::BoxError;
use crate::registry::{ControllerMetadata, Instance};
use crate::router::{HandlerFn, Router, handler_fn};
use crate::translate::{translate, write_error};
use crate::{Error, HttpError, HttpRequest, ParamValue, ResolveData, ResponseWriter};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Options shared by every bound action.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DispatchOptions {
    pub expose_stack: bool,
}

/// Build the sub-router of a controller: one handler per route, bound once
/// per verb or as `all` when the route has no verbs.
pub(crate) fn bind_controller(
    meta: Arc<ControllerMetadata>,
    instance: Instance,
    options: DispatchOptions,
) -> Result<Router, Error> {
    let routes = meta.routes();
    if !meta.is_controller() || routes.is_empty() {
        return Err(Error::configuration(
            "Controller must be decorated as a route controller and must contain at least one action",
        ));
    }

    let mut router = Router::new();
    for record in routes.iter() {
        if !meta.has_method(&record.handler_name) {
            return Err(Error::configuration(format!(
                "Cannot prepare controller method \"{}\" for {} controller",
                record.handler_name,
                meta.type_name()
            )));
        }

        let handler = action_handler(meta.clone(), instance.clone(), record.handler_name.clone(), options);
        if record.matches_all_verbs() {
            router.all(record.path.clone(), handler);
        } else {
            for verb in &record.methods {
                router.on(verb, record.path.clone(), handler.clone());
            }
        }

        debug!(
            controller = meta.type_name(),
            handler = %record.handler_name,
            path = %record.path,
            methods = ?record.methods,
            "Bound route"
        );
    }

    Ok(router)
}

fn action_handler(
    meta: Arc<ControllerMetadata>,
    instance: Instance,
    method: String,
    options: DispatchOptions,
) -> HandlerFn {
    let method: Arc<str> = Arc::from(method);
    handler_fn(move |req, res| {
        run_action(meta.clone(), instance.clone(), method.clone(), req, res, options)
    })
}

/// Handle one request with a controller method.
pub(crate) async fn run_action(
    meta: Arc<ControllerMetadata>,
    instance: Instance,
    method: Arc<str>,
    req: HttpRequest,
    res: ResponseWriter,
    options: DispatchOptions,
) {
    let result = invoke(&meta, instance.clone(), &method, &req, &res).await;
    match result {
        Ok(value) => write_value(&res, value),
        Err(err) => handle_error(&meta, instance, &method, req, res, err, options).await,
    }
}

async fn invoke(
    meta: &ControllerMetadata,
    instance: Instance,
    method: &str,
    req: &HttpRequest,
    res: &ResponseWriter,
) -> Result<ParamValue, BoxError> {
    let chain = meta.prepare(method)?;
    let data = ResolveData::for_request(req.clone(), res.clone());
    let fallbacks = vec![ParamValue::Request(req.clone()), ParamValue::Response(res.clone())];
    chain.execute(instance, &data, fallbacks).await
}

/// Write a method's return value.
///
/// Nothing is written when the method returned the response itself, or
/// returned nothing after sending the response.
pub fn write_value(res: &ResponseWriter, value: ParamValue) {
    match value {
        ParamValue::Response(returned) if returned.ptr_eq(res) => {}
        ParamValue::Undefined if res.is_sent() => {}
        ParamValue::Undefined => res.end(),
        ParamValue::Json(body) => {
            if let Err(e) = res.json(&body) {
                write_error(res, &HttpError::internal().with_message(e.to_string()));
            }
        }
        other => {
            error!(kind = other.kind(), "Controller returned a value that cannot be serialized");
            write_error(
                res,
                &HttpError::internal().with_message(format!("Cannot serialize a {} return value", other.kind())),
            );
        }
    }
}

async fn handle_error(
    meta: &ControllerMetadata,
    instance: Instance,
    method: &str,
    req: HttpRequest,
    res: ResponseWriter,
    err: BoxError,
    options: DispatchOptions,
) {
    let typed = HttpError::find(err.as_ref()).is_some();
    let http = translate(&err, options.expose_stack);

    if typed {
        warn!(
            controller = meta.type_name(),
            method,
            status = http.status_code(),
            message = http.message(),
            "Action failed"
        );
    } else {
        error!(
            controller = meta.type_name(),
            method,
            error = %err,
            "Action failed with an unexpected error"
        );
    }

    let Some(hook) = meta.error_hook() else {
        write_error(&res, &http);
        return;
    };

    let hook_result = AssertUnwindSafe(hook(instance, req, res.clone(), http.clone()))
        .catch_unwind()
        .await;
    if hook_result.is_err() {
        error!(controller = meta.type_name(), method, "Error hook panicked");
        write_error(&res, &http);
    } else if !res.is_sent() {
        res.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_value_json_with_status() {
        let res = ResponseWriter::new();
        res.status(201);
        write_value(&res, json!({"ok": true}).into());

        let response = res.snapshot();
        assert_eq!(response.status, 201);
        assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn test_write_value_skips_returned_response() {
        let res = ResponseWriter::new();
        write_value(&res, ParamValue::Response(res.clone()));
        assert!(!res.is_sent());

        res.send("manual");
        write_value(&res, ParamValue::Undefined);
        assert_eq!(res.snapshot().body_string(), "manual");
    }

    #[test]
    fn test_write_value_undefined_ends() {
        let res = ResponseWriter::new();
        res.status(204);
        write_value(&res, ParamValue::Undefined);
        assert!(res.is_sent());
        assert_eq!(res.snapshot().status, 204);
        assert!(res.snapshot().body.is_empty());
    }

    #[test]
    fn test_write_value_rejects_opaque_values() {
        let res = ResponseWriter::new();
        write_value(&res, ParamValue::any(5u8));
        assert_eq!(res.snapshot().status, 500);
    }
}

//! Built-in parameter resolvers.
//!
//! Each function returns a [`ParamDeclaration`] to attach to a method
//! parameter. Request-based resolvers read from [`ResolveData::request`]
//! and yield `Undefined` when the key is absent.

use crate::error::BoxError;
use crate::{HttpError, HttpRequest, ParamDeclaration, ParamValue, ResolveData, Resolved};
use serde_json::Value;
use std::future::Future;

/// Tag of path resolvers.
pub const PATH_PARAM: &str = "path";
/// Tag of query resolvers.
pub const QUERY_PARAM: &str = "query";
/// Tag of body resolvers.
pub const BODY_PARAM: &str = "body";
/// Tag of header resolvers.
pub const HEADER_PARAM: &str = "header";

fn missing_request() -> Resolved {
    Resolved::error(HttpError::internal().with_message("No request in resolution context"))
}

fn with_request<F>(data: &ResolveData, f: F) -> Resolved
where
    F: FnOnce(&HttpRequest) -> Resolved,
{
    match data.request() {
        Some(req) => f(req),
        None => missing_request(),
    }
}

fn text(value: Option<&str>) -> Resolved {
    match value {
        Some(value) => Resolved::ready(value),
        None => Resolved::ready(ParamValue::Undefined),
    }
}

/// A path capture, e.g. `id` in `/users/:id`.
pub fn path(key: impl Into<String>) -> ParamDeclaration {
    let key = key.into();
    ParamDeclaration::function(PATH_PARAM, move |data, _| {
        with_request(data, |req| text(req.param(&key)))
    })
}

/// Every path capture as an object.
pub fn path_all() -> ParamDeclaration {
    ParamDeclaration::function(PATH_PARAM, |data, _| {
        with_request(data, |req| Resolved::ready(req.params_value()))
    })
}

/// A query parameter.
pub fn query(key: impl Into<String>) -> ParamDeclaration {
    let key = key.into();
    ParamDeclaration::function(QUERY_PARAM, move |data, _| {
        with_request(data, |req| text(req.query_param(&key)))
    })
}

/// Every query parameter as an object.
pub fn query_all() -> ParamDeclaration {
    ParamDeclaration::function(QUERY_PARAM, |data, _| {
        with_request(data, |req| Resolved::ready(req.query_value()))
    })
}

/// A field of the JSON body.
pub fn body(key: impl Into<String>) -> ParamDeclaration {
    let key = key.into();
    ParamDeclaration::function(BODY_PARAM, move |data, _| {
        with_request(data, |req| match req.body_value() {
            Ok(Value::Object(mut fields)) => match fields.remove(&key) {
                Some(value) => Resolved::ready(value),
                None => Resolved::ready(ParamValue::Undefined),
            },
            Ok(_) => Resolved::ready(ParamValue::Undefined),
            Err(err) => Resolved::error(err),
        })
    })
}

/// The whole JSON body.
pub fn body_all() -> ParamDeclaration {
    ParamDeclaration::function(BODY_PARAM, |data, _| {
        with_request(data, |req| match req.body_value() {
            Ok(value) => Resolved::ready(value),
            Err(err) => Resolved::error(err),
        })
    })
}

/// A request header (case-insensitive).
pub fn header(name: impl Into<String>) -> ParamDeclaration {
    let name = name.into();
    ParamDeclaration::function(HEADER_PARAM, move |data, _| {
        with_request(data, |req| text(req.header(&name)))
    })
}

/// The raw request.
pub fn request() -> ParamDeclaration {
    ParamDeclaration::function("request", |data, _| {
        with_request(data, |req| Resolved::ready(req.clone()))
    })
}

/// The response writer.
pub fn response() -> ParamDeclaration {
    ParamDeclaration::function("response", |data, _| match data.response() {
        Some(res) => Resolved::ready(res.clone()),
        None => Resolved::error(HttpError::internal().with_message("No response in resolution context")),
    })
}

/// A constant value, ignoring the previous one.
pub fn value(value: impl Into<ParamValue>) -> ParamDeclaration {
    let value = value.into();
    ParamDeclaration::function("value", move |_, _| Resolved::ready(value.clone()))
}

/// Transform the previous value.
pub fn map<F, E>(f: F) -> ParamDeclaration
where
    F: Fn(ParamValue) -> Result<ParamValue, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    ParamDeclaration::function("map", move |_, previous| {
        Resolved::Ready(f(previous).map_err(Into::into))
    })
}

/// Load an entity from the previous value, e.g. a primary key taken from
/// the path. `None` rejects with 404, a loader error rejects the chain.
///
/// The entity is passed as [`ParamValue::Any`]; read it with
/// [`Args::downcast`](crate::Args::downcast).
pub fn entity<T, F, Fut, E>(loader: F) -> ParamDeclaration
where
    T: Send + Sync + 'static,
    F: Fn(ParamValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    ParamDeclaration::function("entity", move |_, previous| {
        Resolved::pending(load_entity(loader(previous)))
    })
}

async fn load_entity<T, Fut, E>(future: Fut) -> Result<ParamValue, BoxError>
where
    T: Send + Sync + 'static,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: Into<BoxError>,
{
    match future.await.map_err(Into::<BoxError>::into)? {
        Some(entity) => Ok(ParamValue::any(entity)),
        None => Err(HttpError::not_found()
            .with_message(format!("{} not found", short_name::<T>()))
            .into()),
    }
}

fn short_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    name.rsplit("::").next().unwrap_or(name)
}

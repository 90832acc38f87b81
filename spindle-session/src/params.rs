//! Session parameter resolvers.

use crate::layer::{RequestSessionExt, ResponseSessionExt};
use spindle_core::{ParamDeclaration, ParamValue, Resolved};

/// Tag of session resolvers.
pub const SESSION_PARAM: &str = "session";

/// A value of the request's session snapshot; `Undefined` without a
/// session or when the key is missing.
pub fn session(key: impl Into<String>) -> ParamDeclaration {
    let key = key.into();
    ParamDeclaration::function(SESSION_PARAM, move |data, _| {
        let value = data
            .request()
            .and_then(|req| req.session())
            .and_then(|session| session.get(&key))
            .cloned();
        Resolved::ready(value.map(ParamValue::Json).unwrap_or_default())
    })
}

/// The whole session snapshot.
pub fn session_all() -> ParamDeclaration {
    ParamDeclaration::function(SESSION_PARAM, |data, _| {
        let value = data
            .request()
            .and_then(|req| req.session())
            .map(|session| session.data().clone());
        Resolved::ready(value.map(ParamValue::Json).unwrap_or_default())
    })
}

/// The mutable [`SessionHandle`](crate::SessionHandle), read with
/// `args.downcast::<SessionHandle>(i)`.
pub fn session_handle() -> ParamDeclaration {
    ParamDeclaration::function(SESSION_PARAM, |data, _| {
        match data.response().and_then(|res| res.session()) {
            Some(handle) => Resolved::ready(ParamValue::Any(handle)),
            None => Resolved::ready(ParamValue::Undefined),
        }
    })
}

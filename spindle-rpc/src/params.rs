//! Payload parameter resolvers.

use spindle_core::{ParamDeclaration, ParamValue, Resolved};

/// Tag of RPC payload resolvers.
pub const RPC_PARAM: &str = "rpc";

/// A field of the call payload; `Undefined` when the payload is not an
/// object or lacks the field.
pub fn rpc_param(key: impl Into<String>) -> ParamDeclaration {
    let key = key.into();
    ParamDeclaration::function(RPC_PARAM, move |data, _| {
        let value = data
            .payload()
            .and_then(|payload| payload.get(&key))
            .cloned();
        Resolved::ready(value.map(ParamValue::Json).unwrap_or_default())
    })
}

/// The whole call payload.
pub fn rpc_payload() -> ParamDeclaration {
    ParamDeclaration::function(RPC_PARAM, |data, _| {
        Resolved::ready(data.payload().cloned().map(ParamValue::Json).unwrap_or_default())
    })
}

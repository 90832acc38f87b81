// Spindle - controller parameter resolution and route binding for Rust
//
// Controllers declare their methods, routes and parameter resolvers through
// builders; the server compiles each method's resolver chains once and
// dispatches requests through them.

// Re-export core functionality
pub use spindle_core::*;

pub use serde_json;
pub use tokio;

// Re-export optional crates
#[cfg(feature = "session")]
pub use spindle_session;

#[cfg(feature = "rpc")]
pub use spindle_rpc;

#[cfg(feature = "testing")]
pub use spindle_testing;

// Prelude for common imports
pub mod prelude {
    pub use crate::params::{body, body_all, header, path, query, query_all};
    pub use crate::{
        Args,
        Container,
        CookieOptions,
        Error,
        HttpError,
        HttpRequest,
        HttpResponse,
        HttpServer,
        Injectable,
        Json,
        Middleware,
        Next,
        ParamDeclaration,
        ParamValue,
        Registry,
        ResolveData,
        Resolved,
        ResponseWriter,
        ServerConfig,
        async_trait,
    };

    #[cfg(feature = "session")]
    pub use spindle_session::{
        InMemorySessionStorage, RequestSessionExt, ResponseSessionExt, SessionHandle, SessionIdSource, SessionLayer,
        session, session_all, session_handle,
    };

    #[cfg(feature = "rpc")]
    pub use spindle_rpc::{HttpPathRpcLinker, RpcController, RpcEncoder, RpcManager, rpc_param, rpc_payload};
}

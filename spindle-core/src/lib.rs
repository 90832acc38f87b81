// Core library for the Spindle controller framework
// Parameter resolution, route binding, dispatch and error translation

pub mod config;
pub mod container;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod extensions;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod params;
pub mod registry;
pub mod resolver;
pub mod route;
pub mod router;
pub mod server;
pub mod status;
pub mod translate;
pub mod value;

// Re-export commonly used types
pub use config::*;
pub use container::*;
pub use dispatch::write_value;
pub use engine::{CompiledChain, PanicError};
pub use error::*;
pub use extensions::Extensions;
pub use self::http::*;
pub use middleware::*;
pub use registry::*;
pub use resolver::*;
pub use route::*;
pub use router::{HandlerFn, Route, RouteMatch, Router, handler_fn};
pub use server::{HttpServer, ServerHandle};
pub use status::*;
pub use translate::{translate, write_error};
pub use value::*;

// Handler signatures use these
pub use async_trait::async_trait;
pub use futures_util::future::BoxFuture;

//! Remote procedure calls over Spindle controllers.
//!
//! Controller methods are exposed under method names through
//! [`RpcController`], collected into an [`RpcManager`], and called by name
//! with a JSON payload. [`HttpPathRpcLinker`] publishes a manager over HTTP
//! as `GET|POST /:method`.
//!
//! # Examples
//!
//! ```
//! use serde_json::json;
//! use spindle_core::{Args, HttpError, HttpRequest, HttpServer, Json, Registry, ServerConfig};
//! use spindle_rpc::*;
//! use std::sync::Arc;
//!
//! struct Data;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(Registry::new());
//! let data = RpcController::with_registry(&registry, Arc::new(Data))
//!     .prefix("data.")
//!     .rpc_method(["put", "get"], "index", |_: Arc<Data>, args: Args| async move {
//!         Ok::<_, HttpError>(Json(json!({ "key": args.get(0).as_json() })))
//!     })
//!     .param("index", 0, rpc_param("key"));
//!
//! let manager = Arc::new(RpcManager::builder().controller(data).build().unwrap());
//! assert_eq!(manager.available_methods(), ["data.put", "data.get"]);
//!
//! let mut server = HttpServer::with_registry(registry, ServerConfig::default());
//! HttpPathRpcLinker::new(manager).mount(&mut server, "/api").unwrap();
//!
//! let response = server.dispatch(HttpRequest::new("GET", "/api/data.get?key=a")).await;
//! assert_eq!(response.json::<serde_json::Value>().unwrap(), json!({ "key": "a" }));
//! # });
//! ```

pub mod controller;
pub mod error;
pub mod linker;
pub mod manager;
pub mod params;

pub use controller::{MethodNames, RpcController};
pub use error::{RpcError, RpcResult};
pub use linker::HttpPathRpcLinker;
pub use manager::{RpcEncoder, RpcManager, RpcManagerBuilder};
pub use params::{RPC_PARAM, rpc_param, rpc_payload};

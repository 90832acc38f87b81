//! HTTP transport for the RPC manager.

use crate::manager::RpcManager;
use serde_json::Value;
use spindle_core::params::{body_all, path, query_all};
use spindle_core::{Args, BoxError, HttpServer, Json, Registry};
use std::sync::Arc;
use tracing::{debug, info};

/// Exposes an [`RpcManager`] as `POST /:method` (payload from the JSON
/// body) and `GET /:method` (payload from the query string).
///
/// ```
/// use spindle_core::{HttpServer, ServerConfig};
/// use spindle_rpc::{HttpPathRpcLinker, RpcManager};
/// use std::sync::Arc;
///
/// let manager = Arc::new(RpcManager::builder().build().unwrap());
/// let mut server = HttpServer::new(ServerConfig::default());
/// HttpPathRpcLinker::new(manager).suffix(".json").mount(&mut server, "/api").unwrap();
/// ```
pub struct HttpPathRpcLinker {
    manager: Arc<RpcManager>,
    prefix: Option<String>,
    suffix: Option<String>,
}

impl HttpPathRpcLinker {
    pub fn new(manager: Arc<RpcManager>) -> Self {
        Self {
            manager,
            prefix: None,
            suffix: None,
        }
    }

    /// Stripped from the start of the path segment when present.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into()).filter(|p| !p.is_empty());
        self
    }

    /// Stripped from the end of the path segment when present.
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into()).filter(|s| !s.is_empty());
        self
    }

    pub fn manager(&self) -> &Arc<RpcManager> {
        &self.manager
    }

    /// Method name addressed by a path segment.
    pub fn method_name<'a>(&self, segment: &'a str) -> &'a str {
        let mut method = segment;
        if let Some(prefix) = &self.prefix {
            method = method.strip_prefix(prefix.as_str()).unwrap_or(method);
        }
        if let Some(suffix) = &self.suffix {
            method = method.strip_suffix(suffix.as_str()).unwrap_or(method);
        }
        method
    }

    /// Declare the linker's routes in `registry`. Declaring twice is a no-op.
    pub fn declare(registry: &Registry) {
        if registry
            .get_metadata::<HttpPathRpcLinker>()
            .is_some_and(|meta| meta.has_method("post"))
        {
            return;
        }

        registry
            .controller::<HttpPathRpcLinker>()
            .method("post", |linker: Arc<HttpPathRpcLinker>, args: Args| async move {
                linker.invoke("post", &args).await
            })
            .route("post", "post", "/:method")
            .param("post", 0, path("method"))
            .param("post", 1, body_all())
            .method("index", |linker: Arc<HttpPathRpcLinker>, args: Args| async move {
                linker.invoke("get", &args).await
            })
            .route("index", "get", "/:method")
            .param("index", 0, path("method"))
            .param("index", 1, query_all());
    }

    /// Declare the routes in the server's registry and mount the linker
    /// under `mount`.
    pub fn mount(self, server: &mut HttpServer, mount: &str) -> Result<(), spindle_core::Error> {
        Self::declare(server.registry());
        server.register_controller_instance(mount, Arc::new(self))?;
        Ok(())
    }

    async fn invoke(&self, verb: &str, args: &Args) -> Result<Json<Value>, BoxError> {
        let segment = args.str(0).unwrap_or_default();
        let method = self.method_name(segment);
        let payload = self.manager.decode(args.get(1).as_json().cloned().unwrap_or(Value::Null));

        info!(method, verb, "Calling RPC method");
        debug!(payload = %payload, "RPC payload");

        let result = self.manager.call(method, payload).await.map_err(|e| e.into_http())?;
        Ok(Json(self.manager.encode(result)))
    }
}

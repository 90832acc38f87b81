//! RPC method table.

use crate::controller::RpcController;
use crate::error::{RpcError, RpcResult};
use serde_json::{Value, json};
use spindle_core::{ControllerMetadata, Instance, ParamValue, ResolveData};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Shapes call results before they leave the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RpcEncoder {
    /// The handler's result unchanged.
    #[default]
    Plain,
    /// `{"result": value}`.
    JsonRpc,
}

impl RpcEncoder {
    pub fn encode(&self, value: Value) -> Value {
        match self {
            RpcEncoder::Plain => value,
            RpcEncoder::JsonRpc => json!({ "result": value }),
        }
    }
}

struct RpcMethod {
    meta: Arc<ControllerMetadata>,
    instance: Instance,
    handler: String,
}

/// Builder of an [`RpcManager`].
#[derive(Default)]
pub struct RpcManagerBuilder {
    controllers: Vec<crate::controller::RpcBinding>,
    encoder: RpcEncoder,
}

impl RpcManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn controller<C: Send + Sync + 'static>(mut self, controller: RpcController<C>) -> Self {
        self.controllers.push(controller.into_binding());
        self
    }

    pub fn encoder(mut self, encoder: RpcEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    /// Build the method table.
    ///
    /// Every exposed handler must exist on its controller. When two
    /// controllers expose the same name the later one wins and keeps the
    /// position of the first.
    pub fn build(self) -> RpcResult<RpcManager> {
        let mut names = Vec::new();
        let mut methods: HashMap<String, RpcMethod> = HashMap::new();

        for binding in self.controllers {
            for (name, handler) in binding.exposed {
                let full = format!("{}{}", binding.prefix, name);
                if full.is_empty() {
                    return Err(RpcError::InvalidMethodName(full));
                }
                if !binding.meta.has_method(&handler) {
                    return Err(RpcError::MissingHandler {
                        method: full,
                        controller: binding.meta.type_name(),
                        handler,
                    });
                }

                let method = RpcMethod {
                    meta: binding.meta.clone(),
                    instance: binding.instance.clone(),
                    handler,
                };
                if methods.insert(full.clone(), method).is_some() {
                    warn!(method = %full, "RPC method registered twice, keeping the last handler");
                } else {
                    names.push(full);
                }
            }
        }

        debug!(methods = names.len(), "RPC manager built");
        Ok(RpcManager {
            names,
            methods,
            encoder: self.encoder,
        })
    }
}

/// Dispatches named calls to controller methods.
///
/// ```
/// use spindle_core::{Args, HttpError, Registry};
/// use spindle_rpc::{RpcController, RpcManager};
/// use std::sync::Arc;
///
/// struct Health;
///
/// # tokio_test::block_on(async {
/// let registry = Registry::new();
/// let manager = RpcManager::builder()
///     .controller(RpcController::with_registry(&registry, Arc::new(Health)).rpc_method(
///         "ping",
///         "ping",
///         |_: Arc<Health>, _: Args| async { Ok::<_, HttpError>("pong") },
///     ))
///     .build()
///     .unwrap();
///
/// assert_eq!(manager.call("ping", serde_json::Value::Null).await.unwrap(), "pong");
/// # });
/// ```
pub struct RpcManager {
    names: Vec<String>,
    methods: HashMap<String, RpcMethod>,
    encoder: RpcEncoder,
}

impl RpcManager {
    pub fn builder() -> RpcManagerBuilder {
        RpcManagerBuilder::new()
    }

    /// Method names in registration order.
    pub fn available_methods(&self) -> &[String] {
        &self.names
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    /// Call `method` with `payload` as the resolution payload.
    pub async fn call(&self, method: &str, payload: Value) -> RpcResult<Value> {
        self.call_with(method, ResolveData::for_payload(payload)).await
    }

    /// Call `method` with a prepared resolution context.
    ///
    /// The result is not encoded; see [`RpcManager::encode`].
    pub async fn call_with(&self, method: &str, data: ResolveData) -> RpcResult<Value> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| RpcError::UnknownMethod(method.to_string()))?;

        trace!(method, controller = entry.meta.type_name(), handler = %entry.handler, "Calling RPC method");
        let chain = entry.meta.prepare(&entry.handler)?;
        let value = chain
            .execute(entry.instance.clone(), &data, Vec::new())
            .await
            .map_err(RpcError::Failed)?;

        match value {
            ParamValue::Json(value) => Ok(value),
            ParamValue::Undefined => Ok(Value::Null),
            _ => Err(RpcError::NotSerializable(method.to_string())),
        }
    }

    /// Incoming payloads are used as they are.
    pub fn decode(&self, payload: Value) -> Value {
        payload
    }

    pub fn encode(&self, result: Value) -> Value {
        self.encoder.encode(result)
    }

    pub fn encoder(&self) -> RpcEncoder {
        self.encoder
    }
}

impl std::fmt::Debug for RpcManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcManager")
            .field("methods", &self.names)
            .field("encoder", &self.encoder)
            .finish()
    }
}

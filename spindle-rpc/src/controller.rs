//! RPC controller declaration.

use spindle_core::{
    Args, BoxError, ControllerMetadata, Instance, IntoParamValue, ParamDeclaration, Registry, method_invoker,
};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// One or more RPC method names.
pub trait MethodNames {
    fn into_names(self) -> Vec<String>;
}

impl MethodNames for &str {
    fn into_names(self) -> Vec<String> {
        vec![self.to_string()]
    }
}

impl MethodNames for String {
    fn into_names(self) -> Vec<String> {
        vec![self]
    }
}

impl<const N: usize> MethodNames for [&str; N] {
    fn into_names(self) -> Vec<String> {
        self.iter().map(|name| name.to_string()).collect()
    }
}

impl MethodNames for Vec<&str> {
    fn into_names(self) -> Vec<String> {
        self.into_iter().map(str::to_string).collect()
    }
}

impl MethodNames for Vec<String> {
    fn into_names(self) -> Vec<String> {
        self
    }
}

/// Type-erased form of an [`RpcController`].
pub(crate) struct RpcBinding {
    pub meta: Arc<ControllerMetadata>,
    pub instance: Instance,
    pub prefix: String,
    /// `(rpc name, handler name)` in declaration order
    pub exposed: Vec<(String, String)>,
}

/// Methods of a controller instance exposed over RPC.
///
/// Handlers and their parameter declarations live in the controller's
/// metadata record, so RPC methods resolve their arguments with the same
/// engine as routes. Resolvers see the call payload through
/// `ResolveData::payload`.
///
/// ```
/// use spindle_core::{Args, HttpError, Json, Registry};
/// use spindle_rpc::{RpcController, rpc_param};
/// use std::sync::Arc;
///
/// struct Users;
///
/// let registry = Registry::new();
/// let controller = RpcController::with_registry(&registry, Arc::new(Users))
///     .prefix("users.")
///     .rpc_method(["get", "find"], "find", |_: Arc<Users>, args: Args| async move {
///         let id: u64 = args.arg(0)?;
///         Ok::<_, HttpError>(Json(serde_json::json!({ "id": id })))
///     })
///     .param("find", 0, rpc_param("id"));
///
/// assert_eq!(controller.method_names(), vec!["users.get", "users.find"]);
/// ```
pub struct RpcController<C> {
    binding: RpcBinding,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> RpcController<C> {
    /// Controller backed by the global registry.
    pub fn new(instance: Arc<C>) -> Self {
        Self::with_registry(Registry::global(), instance)
    }

    pub fn with_registry(registry: &Registry, instance: Arc<C>) -> Self {
        Self {
            binding: RpcBinding {
                meta: registry.metadata::<C>(),
                instance,
                prefix: String::new(),
                exposed: Vec::new(),
            },
            _controller: PhantomData,
        }
    }

    /// Prepended to every method name of this controller.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.binding.prefix = prefix.into();
        self
    }

    /// Add `handler` under `handler_name` and expose it as `names`.
    pub fn rpc_method<N, F, Fut, R, E>(self, names: N, handler_name: impl Into<String>, handler: F) -> Self
    where
        N: MethodNames,
        F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoParamValue,
        E: Into<BoxError>,
    {
        let handler_name = handler_name.into();
        self.binding
            .meta
            .add_method(handler_name.clone(), method_invoker(handler));
        self.expose(names, handler_name)
    }

    /// Expose a method already present in the controller's manifest.
    pub fn expose(mut self, names: impl MethodNames, handler_name: impl Into<String>) -> Self {
        let handler_name = handler_name.into();
        for name in names.into_names() {
            self.binding.exposed.push((name, handler_name.clone()));
        }
        self
    }

    /// Append a parameter declaration to a handler.
    pub fn param(self, handler_name: impl Into<String>, index: usize, declaration: ParamDeclaration) -> Self {
        self.binding.meta.register(handler_name, index, declaration);
        self
    }

    /// Full RPC names, prefix included.
    pub fn method_names(&self) -> Vec<String> {
        self.binding
            .exposed
            .iter()
            .map(|(name, _)| format!("{}{}", self.binding.prefix, name))
            .collect()
    }

    pub(crate) fn into_binding(self) -> RpcBinding {
        self.binding
    }
}

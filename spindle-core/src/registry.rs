//! Controller metadata registry.
//!
//! Every controller type owns one [`ControllerMetadata`] record holding its
//! method manifest, the resolver declarations of each method parameter,
//! its routes and an optional error hook. Records live in a process-wide
//! [`Registry`] keyed by a [`ControllerId`] assigned per type.
//!
//! Registration is explicit and ordered:
//!
//! ```
//! use spindle_core::{params, Json, Registry};
//! use std::sync::Arc;
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     async fn hello(&self, name: String) -> Json<String> {
//!         Json(format!("hello {}", name))
//!     }
//! }
//!
//! let registry = Registry::new();
//! registry
//!     .controller::<Greeter>()
//!     .method("hello", |ctrl: Arc<Greeter>, args| async move {
//!         let name: String = args.arg(0)?;
//!         Ok::<_, spindle_core::HttpError>(ctrl.hello(name).await)
//!     })
//!     .route("hello", "get", "/hello/:name")
//!     .param("hello", 0, params::path("name"));
//!
//! let meta = registry.get_metadata::<Greeter>().unwrap();
//! assert!(meta.is_controller());
//! assert_eq!(meta.routes().len(), 1);
//! ```

use crate::engine::{self, CompiledChain};
use crate::error::BoxError;
use crate::route::{ControllerRoutes, IntoVerbs, RoutePath, RouteRecord, define_route};
use crate::{Args, Error, HttpError, HttpRequest, IntoParamValue, ParamDeclaration, ParamValue, ResponseWriter};
use futures_util::future::BoxFuture;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Type-erased controller instance.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased controller method.
pub type MethodInvoker =
    Arc<dyn Fn(Instance, Args) -> BoxFuture<'static, Result<ParamValue, BoxError>> + Send + Sync>;

/// Type-erased controller error hook.
pub type ErrorHook = Arc<
    dyn Fn(Instance, HttpRequest, ResponseWriter, HttpError) -> BoxFuture<'static, ()> + Send + Sync,
>;

/// Stable identifier of a controller type within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(usize);

impl ControllerId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Default)]
struct MetadataState {
    methods: HashMap<String, MethodInvoker>,
    method_params: HashMap<String, Vec<Vec<ParamDeclaration>>>,
    routes: ControllerRoutes,
    error_hook: Option<ErrorHook>,
    is_controller: bool,
}

/// Metadata record of one controller type.
pub struct ControllerMetadata {
    id: ControllerId,
    type_name: &'static str,
    state: RwLock<MetadataState>,
    prepared: Mutex<HashMap<String, Arc<CompiledChain>>>,
}

impl ControllerMetadata {
    fn new(id: ControllerId, type_name: &'static str) -> Self {
        Self {
            id,
            type_name,
            state: RwLock::new(MetadataState::default()),
            prepared: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    /// Short type name of the controller, e.g. `UserController`.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn add_method(&self, name: impl Into<String>, invoker: MethodInvoker) {
        let name = name.into();
        debug!(controller = self.type_name, method = %name, "Registered controller method");
        self.state.write().methods.insert(name, invoker);
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.state.read().methods.contains_key(name)
    }

    pub fn method(&self, name: &str) -> Option<MethodInvoker> {
        self.state.read().methods.get(name).cloned()
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.state.read().methods.keys().cloned().collect();
        names.sort();
        names
    }

    /// Append a declaration to the chain of `method`'s parameter `index`.
    pub fn register(&self, method: impl Into<String>, index: usize, declaration: ParamDeclaration) {
        let method = method.into();
        debug!(
            controller = self.type_name,
            method = %method,
            index,
            param = declaration.name(),
            "Registered parameter resolver"
        );

        let mut state = self.state.write();
        let table = state.method_params.entry(method).or_default();
        if table.len() <= index {
            table.resize_with(index + 1, Vec::new);
        }
        table[index].push(declaration);
    }

    /// Declaration stacks of `method`, one per parameter index.
    pub fn declarations(&self, method: &str) -> Vec<Vec<ParamDeclaration>> {
        self.state
            .read()
            .method_params
            .get(method)
            .cloned()
            .unwrap_or_default()
    }

    pub fn define_route(&self, record: RouteRecord) {
        debug!(
            controller = self.type_name,
            handler = %record.handler_name,
            path = %record.path,
            methods = ?record.methods,
            "Declared route"
        );
        self.state.write().routes.upsert(record);
    }

    pub fn routes(&self) -> ControllerRoutes {
        self.state.read().routes.clone()
    }

    pub fn mark_controller(&self) {
        self.state.write().is_controller = true;
    }

    pub fn is_controller(&self) -> bool {
        self.state.read().is_controller
    }

    pub fn set_error_hook(&self, hook: ErrorHook) {
        self.state.write().error_hook = Some(hook);
    }

    pub fn error_hook(&self) -> Option<ErrorHook> {
        self.state.read().error_hook.clone()
    }

    pub fn is_prepared(&self, method: &str) -> bool {
        self.prepared.lock().contains_key(method)
    }

    /// Compiled chain of `method`, compiling it on first use.
    ///
    /// Once compiled, later declarations for the method are ignored.
    pub fn prepare(&self, method: &str) -> Result<Arc<CompiledChain>, Error> {
        let mut prepared = self.prepared.lock();
        if let Some(chain) = prepared.get(method) {
            return Ok(chain.clone());
        }

        let chain = Arc::new(engine::compile(self, method)?);
        prepared.insert(method.to_string(), chain.clone());
        Ok(chain)
    }
}

impl fmt::Debug for ControllerMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("ControllerMetadata")
            .field("id", &self.id)
            .field("type_name", &self.type_name)
            .field("methods", &state.methods.len())
            .field("routes", &state.routes.len())
            .field("is_controller", &state.is_controller)
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    ids: HashMap<TypeId, ControllerId>,
    records: Vec<Arc<ControllerMetadata>>,
}

/// Store of controller metadata records.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

impl Registry {
    /// Create an isolated registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Metadata record of `C`, created empty on first access.
    pub fn metadata<C: 'static>(&self) -> Arc<ControllerMetadata> {
        if let Some(meta) = self.get_metadata::<C>() {
            return meta;
        }

        let mut state = self.state.write();
        if let Some(id) = state.ids.get(&TypeId::of::<C>()) {
            return state.records[id.0].clone();
        }

        let id = ControllerId(state.records.len());
        let meta = Arc::new(ControllerMetadata::new(id, short_type_name::<C>()));
        state.ids.insert(TypeId::of::<C>(), id);
        state.records.push(meta.clone());
        meta
    }

    /// Metadata record of `C` if one exists.
    pub fn get_metadata<C: 'static>(&self) -> Option<Arc<ControllerMetadata>> {
        let state = self.state.read();
        state
            .ids
            .get(&TypeId::of::<C>())
            .map(|id| state.records[id.0].clone())
    }

    pub fn id_of<C: 'static>(&self) -> Option<ControllerId> {
        self.state.read().ids.get(&TypeId::of::<C>()).copied()
    }

    pub fn by_id(&self, id: ControllerId) -> Option<Arc<ControllerMetadata>> {
        self.state.read().records.get(id.0).cloned()
    }

    /// Append a parameter declaration for `C::method` at `index`.
    pub fn register<C: 'static>(&self, method: impl Into<String>, index: usize, declaration: ParamDeclaration) {
        self.metadata::<C>().register(method, index, declaration);
    }

    /// Declare the route of `C::handler`.
    pub fn define_route<C: 'static>(
        &self,
        handler: impl Into<String>,
        methods: impl IntoVerbs,
        path: impl Into<RoutePath>,
    ) {
        self.metadata::<C>()
            .define_route(define_route(handler, methods, path));
    }

    /// Declare `C` as a route controller and return its builder.
    pub fn controller<C: Send + Sync + 'static>(&self) -> ControllerBuilder<C> {
        let meta = self.metadata::<C>();
        meta.mark_controller();
        ControllerBuilder {
            meta,
            _controller: PhantomData,
        }
    }

    /// Builder for a single action of `C`.
    pub fn action<C: Send + Sync + 'static>(&self, name: impl Into<String>) -> ActionBuilder<C> {
        ActionBuilder {
            meta: self.metadata::<C>(),
            name: name.into(),
            verbs: Vec::new(),
            path: None,
            _controller: PhantomData,
        }
    }

    /// Drop every record.
    pub fn reset(&self) {
        let mut state = self.state.write();
        debug!(records = state.records.len(), "Resetting controller registry");
        state.ids.clear();
        state.records.clear();
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("records", &self.len()).finish()
    }
}

fn short_type_name<C: 'static>() -> &'static str {
    let full = type_name::<C>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rfind("::") {
        Some(pos) => &full[pos + 2..],
        None => full,
    }
}

fn downcast_failure<C>() -> BoxError {
    format!("Controller instance is not a {}", type_name::<C>()).into()
}

/// Type-erase a controller method for [`ControllerMetadata::add_method`].
pub fn method_invoker<C, F, Fut, R, E>(handler: F) -> MethodInvoker
where
    C: Send + Sync + 'static,
    F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoParamValue,
    E: Into<BoxError>,
{
    Arc::new(move |instance: Instance, args: Args| -> BoxFuture<'static, Result<ParamValue, BoxError>> {
        let future = instance
            .downcast::<C>()
            .map(|controller| handler(controller, args));
        Box::pin(async move {
            let future = future.map_err(|_| downcast_failure::<C>())?;
            let value = future.await.map_err(Into::<BoxError>::into)?;
            value.into_param_value()
        })
    })
}

/// Registration builder of a controller type.
pub struct ControllerBuilder<C> {
    meta: Arc<ControllerMetadata>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ControllerBuilder<C> {
    /// Add a method to the manifest.
    pub fn method<F, Fut, R, E>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoParamValue,
        E: Into<BoxError>,
    {
        self.meta.add_method(name, method_invoker(handler));
        self
    }

    /// Declare the route of a handler.
    pub fn route(self, handler: impl Into<String>, methods: impl IntoVerbs, path: impl Into<RoutePath>) -> Self {
        self.meta.define_route(define_route(handler, methods, path));
        self
    }

    /// Append a resolver declaration to a method parameter.
    pub fn param(self, method: impl Into<String>, index: usize, declaration: ParamDeclaration) -> Self {
        self.meta.register(method, index, declaration);
        self
    }

    /// Handle failures of this controller's actions instead of the default
    /// error translation. The hook owns the response.
    pub fn on_error<F, Fut>(self, hook: F) -> Self
    where
        F: Fn(Arc<C>, HttpRequest, ResponseWriter, HttpError) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let hook: ErrorHook = Arc::new(
            move |instance: Instance,
                  req: HttpRequest,
                  res: ResponseWriter,
                  err: HttpError|
                  -> BoxFuture<'static, ()> {
                match instance.downcast::<C>() {
                    Ok(controller) => Box::pin(hook(controller, req, res, err)),
                    Err(_) => Box::pin(async {}),
                }
            },
        );
        self.meta.set_error_hook(hook);
        self
    }

    pub fn metadata(&self) -> Arc<ControllerMetadata> {
        self.meta.clone()
    }
}

/// Registration builder of one controller action.
///
/// The route is (re)declared whenever the verbs or the path change, so the
/// calls can come in any order.
pub struct ActionBuilder<C> {
    meta: Arc<ControllerMetadata>,
    name: String,
    verbs: Vec<String>,
    path: Option<RoutePath>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Send + Sync + 'static> ActionBuilder<C> {
    pub fn with_verbs(mut self, verbs: impl IntoVerbs) -> Self {
        self.verbs = verbs.into_verbs();
        self.declare();
        self
    }

    pub fn with_path(mut self, path: impl Into<RoutePath>) -> Self {
        self.path = Some(path.into());
        self.declare();
        self
    }

    pub fn param(self, index: usize, declaration: ParamDeclaration) -> Self {
        self.meta.register(self.name.clone(), index, declaration);
        self
    }

    pub fn handler<F, Fut, R, E>(self, handler: F) -> Self
    where
        F: Fn(Arc<C>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        R: IntoParamValue,
        E: Into<BoxError>,
    {
        self.meta.add_method(self.name.clone(), method_invoker(handler));
        self
    }

    fn declare(&self) {
        if let Some(path) = &self.path {
            self.meta
                .define_route(define_route(self.name.clone(), self.verbs.clone(), path.clone()));
        }
    }
}

//! HTTP server: controller registration, middleware and the hyper loop.

use crate::container::{Container, Injectable};
use crate::dispatch::{DispatchOptions, bind_controller};
use crate::middleware::{EndpointFn, Middleware, MiddlewareChain};
use crate::registry::{Instance, Registry};
use crate::router::{Router, handler_fn};
use crate::translate::write_error;
use crate::{Completion, Error, HttpError, HttpRequest, HttpResponse, ResponseWriter, ServerConfig};
use bytes::Bytes;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Frame, Incoming, SizeHint};
use hyper::header::{CONTENT_LENGTH, HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use once_cell::sync::OnceCell;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

enum RegistrySource {
    Global,
    Shared(Arc<Registry>),
}

impl RegistrySource {
    fn get(&self) -> &Registry {
        match self {
            RegistrySource::Global => Registry::global(),
            RegistrySource::Shared(registry) => registry,
        }
    }
}

/// Everything needed to serve requests once registration is over.
struct App {
    router: Arc<Router>,
    middleware: MiddlewareChain,
    config: ServerConfig,
}

/// An HTTP server hosting route controllers.
///
/// Controllers and middleware are registered first. The first dispatched
/// request (or [`HttpServer::bind`]) freezes the server: the 404 fallback
/// is installed and further registration fails.
///
/// ```
/// use spindle_core::*;
///
/// #[derive(Default)]
/// struct Health;
///
/// impl Injectable for Health {
///     fn create(_: &Container) -> Result<Self, Error> {
///         Ok(Health)
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let registry = std::sync::Arc::new(Registry::new());
/// registry
///     .action::<Health>("check")
///     .with_verbs("get")
///     .with_path("/health")
///     .handler(|_: std::sync::Arc<Health>, _args: Args| async {
///         Ok::<_, HttpError>(Json(serde_json::json!({"ok": true})))
///     });
/// registry.controller::<Health>();
///
/// let mut server = HttpServer::with_registry(registry, ServerConfig::default());
/// server.register_controller::<Health>("/").unwrap();
///
/// let response = server.dispatch(HttpRequest::new("GET", "/health")).await;
/// assert_eq!(response.status, 200);
/// # });
/// ```
pub struct HttpServer {
    config: ServerConfig,
    registry: RegistrySource,
    container: Container,
    router: Router,
    middleware: MiddlewareChain,
    app: OnceCell<Arc<App>>,
}

impl HttpServer {
    /// Server backed by the global registry.
    pub fn new(config: ServerConfig) -> Self {
        Self::build(config, RegistrySource::Global)
    }

    /// Server backed by its own registry.
    pub fn with_registry(registry: Arc<Registry>, config: ServerConfig) -> Self {
        Self::build(config, RegistrySource::Shared(registry))
    }

    fn build(config: ServerConfig, registry: RegistrySource) -> Self {
        Self {
            config,
            registry,
            container: Container::new(),
            router: Router::new(),
            middleware: MiddlewareChain::new(),
            app: OnceCell::new(),
        }
    }

    /// Replace the container used to build controllers.
    pub fn with_container(mut self, container: Container) -> Self {
        self.container = container;
        self
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Registry the controllers are looked up in.
    pub fn registry(&self) -> &Registry {
        self.registry.get()
    }

    pub fn is_frozen(&self) -> bool {
        self.app.get().is_some()
    }

    fn ensure_open(&self, what: &str) -> Result<(), Error> {
        if self.is_frozen() {
            return Err(Error::configuration(format!(
                "Cannot register {} after the server started handling requests",
                what
            )));
        }
        Ok(())
    }

    /// Build `C` through the container and mount its routes under `mount`.
    pub fn register_controller<C: Injectable>(&mut self, mount: &str) -> Result<&mut Self, Error> {
        self.ensure_open("controllers")?;
        self.check_controller::<C>()?;
        let instance = self.container.resolve::<C>()?;
        self.register_controller_instance(mount, instance)
    }

    /// Mount the routes of an existing controller instance under `mount`.
    pub fn register_controller_instance<C: Send + Sync + 'static>(
        &mut self,
        mount: &str,
        controller: Arc<C>,
    ) -> Result<&mut Self, Error> {
        self.ensure_open("controllers")?;
        let meta = self.check_controller::<C>()?;
        let instance: Instance = controller;
        let options = DispatchOptions {
            expose_stack: self.config.expose_stack,
        };

        let router = bind_controller(meta.clone(), instance, options)?;
        info!(
            controller = meta.type_name(),
            mount,
            routes = router.route_count(),
            "Controller registered"
        );
        self.router.mount(mount, router);
        Ok(self)
    }

    fn check_controller<C: 'static>(&self) -> Result<Arc<crate::ControllerMetadata>, Error> {
        self.registry()
            .get_metadata::<C>()
            .filter(|meta| meta.is_controller() && !meta.routes().is_empty())
            .ok_or_else(|| {
                Error::configuration(
                    "Controller must be decorated as a route controller and must contain at least one action",
                )
            })
    }

    /// Add a middleware; middleware runs before routing in insertion order.
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) -> Result<&mut Self, Error> {
        self.ensure_open("middleware")?;
        self.middleware.use_middleware(middleware);
        Ok(self)
    }

    /// Finish registration and install the 404 fallback.
    pub fn freeze(&self) {
        self.app();
    }

    fn app(&self) -> Arc<App> {
        self.app
            .get_or_init(|| {
                let mut router = self.router.clone();
                router.all(
                    "/*",
                    handler_fn(|_req, res| async move {
                        write_error(&res, &HttpError::not_found());
                    }),
                );
                debug!(routes = router.route_count(), middleware = self.middleware.len(), "Server frozen");
                Arc::new(App {
                    router: Arc::new(router),
                    middleware: self.middleware.clone(),
                    config: self.config.clone(),
                })
            })
            .clone()
    }

    /// Handle one request in process.
    ///
    /// Finish hooks (session persistence, for one) are spawned once the
    /// response is built and are not awaited.
    pub async fn dispatch(&self, req: HttpRequest) -> HttpResponse {
        let (response, completion) = self.respond(req).await;
        let _ = completion.spawn();
        response
    }

    /// Handle one request in process and hand back its pending finish hooks
    /// next to the response.
    pub async fn respond(&self, req: HttpRequest) -> (HttpResponse, Completion) {
        self.app().handle(req).await
    }

    /// Bind the configured address and serve in the background.
    pub async fn bind(&self) -> Result<ServerHandle, Error> {
        let addr = self.config.addr()?;
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let app = self.app();
        let (shutdown, signal) = watch::channel(false);

        info!(address = %local_addr, "Server listening");
        let task = tokio::spawn(serve(listener, app, signal));

        Ok(ServerHandle {
            local_addr,
            shutdown,
            task,
        })
    }

    /// Serve until Ctrl+C, then close gracefully.
    pub async fn listen(&self) -> Result<(), Error> {
        let handle = self.bind().await?;
        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");
        handle.close().await
    }
}

impl std::fmt::Debug for HttpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServer")
            .field("config", &self.config)
            .field("routes", &self.router.route_count())
            .field("middleware", &self.middleware.len())
            .field("frozen", &self.is_frozen())
            .finish()
    }
}

impl App {
    async fn handle(&self, req: HttpRequest) -> (HttpResponse, Completion) {
        let res = ResponseWriter::new();

        if req.body.len() > self.config.body_limit {
            write_error(&res, &HttpError::payload_too_large());
            return res.finish();
        }

        let router = self.router.clone();
        let endpoint: EndpointFn = Arc::new(
            move |mut req: HttpRequest, res: ResponseWriter| -> BoxFuture<'static, Result<(), HttpError>> {
                let router = router.clone();
                Box::pin(async move {
                    match router.find(&req.method, &req.path) {
                        Some(matched) => {
                            req.params = matched.params;
                            (matched.handler)(req, res).await;
                        }
                        None => write_error(&res, &HttpError::not_found()),
                    }
                    Ok(())
                })
            },
        );

        let method = req.method.clone();
        let path = req.path.clone();
        let outcome = AssertUnwindSafe(self.middleware.apply(req, res.clone(), endpoint))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(method = %method, path = %path, status = err.status_code(), "Request rejected");
                write_error(&res, &err);
            }
            Err(_) => {
                error!(method = %method, path = %path, "Request handler panicked");
                write_error(&res, &HttpError::internal());
            }
        }

        res.finish()
    }

    async fn handle_hyper(&self, req: Request<Incoming>) -> Response<CompletionBody> {
        match self.read_request(req).await {
            Ok(request) => {
                let (response, completion) = self.handle(request).await;
                into_hyper(response, completion)
            }
            Err(err) => {
                let res = ResponseWriter::new();
                write_error(&res, &err);
                let (response, completion) = res.finish();
                into_hyper(response, completion)
            }
        }
    }

    async fn read_request(&self, req: Request<Incoming>) -> Result<HttpRequest, HttpError> {
        let limit = self.config.body_limit;
        let declared = req
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > limit) {
            return Err(HttpError::payload_too_large());
        }

        let (parts, body) = req.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let mut request = HttpRequest::new(parts.method.as_str(), url);
        for (name, value) in parts.headers.iter() {
            if let Ok(value) = value.to_str() {
                request = request.with_header(name.as_str(), value);
            }
        }

        let body = Limited::new(body, limit).collect().await.map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                HttpError::payload_too_large()
            } else {
                HttpError::bad_request().with_message(format!("Failed to read request body: {}", e))
            }
        })?;
        Ok(request.with_body(body.to_bytes()))
    }
}

/// Response body that spawns the finish hooks once hyper is done with it.
struct CompletionBody {
    inner: Full<Bytes>,
    completion: Option<Completion>,
}

impl Body for CompletionBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        Pin::new(&mut self.get_mut().inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for CompletionBody {
    fn drop(&mut self) {
        if let Some(completion) = self.completion.take() {
            let _ = completion.spawn();
        }
    }
}

fn into_hyper(response: HttpResponse, completion: Completion) -> Response<CompletionBody> {
    let body = CompletionBody {
        inner: Full::new(response.body),
        completion: Some(completion),
    };
    let mut out = Response::new(body);
    *out.status_mut() = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    for (name, value) in response.headers {
        match (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().append(name, value);
            }
            _ => warn!(header = %name, "Dropping invalid response header"),
        }
    }
    out
}

async fn serve(listener: TcpListener, app: Arc<App>, mut shutdown: watch::Receiver<bool>) {
    let graceful = GracefulShutdown::new();
    let timeout = app.config.shutdown_timeout;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let io = TokioIo::new(stream);
                let app = app.clone();
                let service = service_fn(move |req: Request<Incoming>| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(app.handle_hyper(req).await) }
                });

                let conn = graceful.watch(http1::Builder::new().serve_connection(io, service));
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!(remote = %remote, error = %err, "Error serving connection");
                    }
                });
            }
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    tokio::select! {
        _ = graceful.shutdown() => debug!("All connections closed"),
        _ = tokio::time::sleep(timeout) => warn!(timeout_ms = timeout.as_millis() as u64, "Timed out waiting for connections to close"),
    }
}

/// Handle of a server started with [`HttpServer::bind`].
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address; useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting connections and wait for in-flight ones.
    pub async fn close(self) -> Result<(), Error> {
        // The receiver is gone only if the accept loop already stopped.
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|e| Error::configuration(format!("Server task failed: {}", e)))?;
        info!(address = %self.local_addr, "Server closed");
        Ok(())
    }
}

// Middleware system for request/response processing

use crate::{HttpError, HttpRequest, ResponseWriter};
use async_trait::async_trait;
use futures_util::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Type alias for the next handler in the middleware chain
pub type Next = Box<dyn FnOnce(HttpRequest) -> BoxFuture<'static, Result<(), HttpError>> + Send>;

/// Final handler of a middleware chain
pub type EndpointFn =
    Arc<dyn Fn(HttpRequest, ResponseWriter) -> BoxFuture<'static, Result<(), HttpError>> + Send + Sync>;

/// Middleware run before routing.
///
/// A middleware may change the request before calling `next`, register
/// response hooks, or answer by itself and not call `next` at all. A
/// returned error is written as the error envelope.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: HttpRequest, res: ResponseWriter, next: Next) -> Result<(), HttpError>;
}

/// Middleware built from an async closure.
pub struct MiddlewareFn<F>(F);

/// Wrap an async closure as middleware.
pub fn middleware_fn<F, Fut>(f: F) -> MiddlewareFn<F>
where
    F: Fn(HttpRequest, ResponseWriter, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HttpError>> + Send + 'static,
{
    MiddlewareFn(f)
}

#[async_trait]
impl<F, Fut> Middleware for MiddlewareFn<F>
where
    F: Fn(HttpRequest, ResponseWriter, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HttpError>> + Send + 'static,
{
    async fn handle(&self, req: HttpRequest, res: ResponseWriter, next: Next) -> Result<(), HttpError> {
        (self.0)(req, res, next).await
    }
}

/// Middleware chain executor
#[derive(Clone, Default)]
pub struct MiddlewareChain {
    middlewares: Arc<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn use_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        let mut mws = (*self.middlewares).clone();
        mws.push(Arc::new(middleware));
        self.middlewares = Arc::new(mws);
    }

    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Execute the middleware chain with a handler
    pub async fn apply(&self, req: HttpRequest, res: ResponseWriter, endpoint: EndpointFn) -> Result<(), HttpError> {
        debug!(
            middleware_count = self.middlewares.len(),
            path = %req.path,
            method = %req.method,
            "Executing middleware chain"
        );
        self.execute_from(0, req, res, endpoint).await
    }

    fn execute_from(
        &self,
        index: usize,
        req: HttpRequest,
        res: ResponseWriter,
        endpoint: EndpointFn,
    ) -> BoxFuture<'static, Result<(), HttpError>> {
        if index >= self.middlewares.len() {
            trace!("Middleware chain complete, calling handler");
            endpoint(req, res)
        } else {
            let middleware = self.middlewares[index].clone();
            let chain = self.clone();
            let next_res = res.clone();

            trace!(middleware_index = index, "Executing middleware");
            Box::pin(async move {
                middleware
                    .handle(
                        req,
                        res,
                        Box::new(move |req| chain.execute_from(index + 1, req, next_res, endpoint)),
                    )
                    .await
            })
        }
    }
}

/// Request logging middleware
#[derive(Debug, Clone, Default)]
pub struct LoggerMiddleware {
    pub log_body: bool,
}

impl LoggerMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(mut self) -> Self {
        self.log_body = true;
        self
    }
}

#[async_trait]
impl Middleware for LoggerMiddleware {
    async fn handle(&self, req: HttpRequest, res: ResponseWriter, next: Next) -> Result<(), HttpError> {
        let start = std::time::Instant::now();
        let method = req.method.clone();
        let path = req.path.clone();

        if self.log_body && !req.body.is_empty() {
            info!(method = %method, path = %path, body_bytes = req.body.len(), "Request started");
        } else {
            info!(method = %method, path = %path, "Request started");
        }

        let result = next(req).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => info!(
                method = %method,
                path = %path,
                status = res.status_code(),
                duration_ms,
                "Request completed"
            ),
            Err(e) => info!(
                method = %method,
                path = %path,
                status = e.status_code(),
                duration_ms,
                "Request failed"
            ),
        }

        result
    }
}

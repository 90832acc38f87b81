// Routing system for HTTP requests

use crate::route::RoutePath;
use crate::{HttpRequest, ResponseWriter};
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A route handler function type
pub type HandlerFn = Arc<dyn Fn(HttpRequest, ResponseWriter) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`HandlerFn`].
pub fn handler_fn<F, Fut>(f: F) -> HandlerFn
where
    F: Fn(HttpRequest, ResponseWriter) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |req: HttpRequest, res: ResponseWriter| -> BoxFuture<'static, ()> { Box::pin(f(req, res)) })
}

/// Route definition with handler
#[derive(Clone)]
pub struct Route {
    /// Lower-case verb, `all` for every verb.
    pub verb: String,
    pub path: RoutePath,
    pub handler: HandlerFn,
}

impl Route {
    fn accepts(&self, method: &str) -> bool {
        self.verb == "all" || self.verb.eq_ignore_ascii_case(method)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("verb", &self.verb)
            .field("path", &self.path)
            .finish()
    }
}

#[derive(Clone)]
enum Layer {
    Route(Route),
    Mount { prefix: String, router: Arc<Router> },
}

/// A matched route.
#[derive(Clone)]
pub struct RouteMatch {
    pub handler: HandlerFn,
    pub params: HashMap<String, String>,
}

/// Mountable router. Routes and mounted routers are tried in registration
/// order; the first match wins.
#[derive(Clone, Default)]
pub struct Router {
    layers: Vec<Layer>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route to the router
    pub fn add_route(&mut self, route: Route) {
        self.layers.push(Layer::Route(route));
    }

    /// Register `handler` for `verb` (`all` for every verb).
    pub fn on(&mut self, verb: &str, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.add_route(Route {
            verb: verb.to_ascii_lowercase(),
            path: path.into(),
            handler,
        });
        self
    }

    pub fn get(&mut self, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.on("get", path, handler)
    }

    pub fn post(&mut self, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.on("post", path, handler)
    }

    pub fn put(&mut self, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.on("put", path, handler)
    }

    pub fn patch(&mut self, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.on("patch", path, handler)
    }

    pub fn delete(&mut self, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.on("delete", path, handler)
    }

    pub fn all(&mut self, path: impl Into<RoutePath>, handler: HandlerFn) -> &mut Self {
        self.on("all", path, handler)
    }

    /// Mount `router` under `prefix`.
    pub fn mount(&mut self, prefix: &str, router: Router) -> &mut Self {
        let prefix = normalize_prefix(prefix);
        self.layers.push(Layer::Mount {
            prefix,
            router: Arc::new(router),
        });
        self
    }

    /// Number of routes, including mounted ones.
    pub fn route_count(&self) -> usize {
        self.layers
            .iter()
            .map(|layer| match layer {
                Layer::Route(_) => 1,
                Layer::Mount { router, .. } => router.route_count(),
            })
            .sum()
    }

    /// Find the first route matching `method` and `path`.
    pub fn find(&self, method: &str, path: &str) -> Option<RouteMatch> {
        for layer in &self.layers {
            match layer {
                Layer::Route(route) => {
                    if !route.accepts(method) {
                        continue;
                    }
                    if let Some(params) = match_route(&route.path, path) {
                        return Some(RouteMatch {
                            handler: route.handler.clone(),
                            params,
                        });
                    }
                }
                Layer::Mount { prefix, router } => {
                    if let Some(rest) = strip_prefix(prefix, path) {
                        if let Some(found) = router.find(method, rest) {
                            return Some(found);
                        }
                    }
                }
            }
        }
        None
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.route_count())
            .finish()
    }
}

fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}

/// Remaining path below `prefix`, matching on segment boundaries.
fn strip_prefix<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix.is_empty() {
        return Some(path);
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some("/")
    } else if rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

fn match_route(pattern: &RoutePath, path: &str) -> Option<HashMap<String, String>> {
    match pattern {
        RoutePath::Literal(pattern) => match_path(pattern, path),
        RoutePath::Pattern(regex) => {
            let captures = regex.captures(path)?;
            let mut params = HashMap::new();
            let mut position = 0;
            for (i, name) in regex.capture_names().enumerate().skip(1) {
                if let Some(value) = captures.get(i) {
                    let key = match name {
                        Some(name) => name.to_string(),
                        None => position.to_string(),
                    };
                    params.insert(key, decode(value.as_str()));
                }
                if name.is_none() {
                    position += 1;
                }
            }
            Some(params)
        }
    }
}

/// Match a route path pattern against a request path
/// Returns Some(params) if matched, None otherwise
fn match_path(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_parts: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();
    let path_parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut params = HashMap::new();

    for (i, pattern_part) in pattern_parts.iter().enumerate() {
        if *pattern_part == "*" {
            // Wildcard consumes the rest of the path
            params.insert("*".to_string(), decode(&path_parts[i.min(path_parts.len())..].join("/")));
            return Some(params);
        }

        let path_part = path_parts.get(i)?;
        if let Some(param_name) = pattern_part.strip_prefix(':') {
            params.insert(param_name.to_string(), decode(path_part));
        } else if pattern_part != path_part {
            return None;
        }
    }

    if pattern_parts.len() != path_parts.len() {
        return None;
    }

    Some(params)
}

fn decode(value: &str) -> String {
    urlencoding::decode(value)
        .map(|v| v.into_owned())
        .unwrap_or_else(|_| value.to_string())
}

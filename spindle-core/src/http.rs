// HTTP request and response types

use crate::{Error, Extensions, HttpError};
use bytes::Bytes;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Incoming HTTP request as seen by middleware, resolvers and handlers.
///
/// Header names are stored lower-cased. `params` is filled by the router
/// with the captures of the matched route.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub extensions: Extensions,
}

impl HttpRequest {
    /// Create a request from a method and a URL (path plus optional query).
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path.to_string(), parse_query(query)),
            None => (url.clone(), HashMap::new()),
        };

        Self {
            method: method.into().to_ascii_uppercase(),
            path: if path.is_empty() { "/".to_string() } else { path },
            url,
            headers: HashMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            query,
            extensions: Extensions::new(),
        }
    }

    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the JSON body.
    pub fn with_json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let body = serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self
            .with_header("content-type", "application/json")
            .with_body(body))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// Cookies sent in the `Cookie` header.
    pub fn cookies(&self) -> HashMap<String, String> {
        self.header("cookie").map(parse_cookies).unwrap_or_default()
    }

    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies().remove(name)
    }

    /// Deserialize the JSON body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            HttpError::bad_request().with_message(format!("Invalid JSON body: {}", e))
        })
    }

    /// The body as a JSON value; an empty body reads as `{}`.
    pub fn body_value(&self) -> Result<serde_json::Value, HttpError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        self.json()
    }

    /// Route captures as a JSON object.
    pub fn params_value(&self) -> serde_json::Value {
        string_map_to_value(&self.params)
    }

    /// Query parameters as a JSON object.
    pub fn query_value(&self) -> serde_json::Value {
        string_map_to_value(&self.query)
    }
}

fn string_map_to_value(map: &HashMap<String, String>) -> serde_json::Value {
    serde_json::Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect(),
    )
}

pub(crate) fn parse_query(query: &str) -> HashMap<String, String> {
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .unwrap_or_default()
        .into_iter()
        .collect()
}

fn parse_cookies(header: &str) -> HashMap<String, String> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let value = value.trim().trim_matches('"');
            let value = urlencoding::decode(value)
                .map(|v| v.into_owned())
                .unwrap_or_else(|_| value.to_string());
            Some((name.trim().to_string(), value))
        })
        .collect()
}

/// Options for `Set-Cookie`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieOptions {
    pub max_age: Option<Duration>,
    pub http_only: bool,
    pub secure: bool,
    pub path: Option<String>,
    pub same_site: Option<String>,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            max_age: None,
            http_only: false,
            secure: false,
            path: Some("/".to_string()),
            same_site: None,
        }
    }
}

impl CookieOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn http_only(mut self, enable: bool) -> Self {
        self.http_only = enable;
        self
    }

    pub fn secure(mut self, enable: bool) -> Self {
        self.secure = enable;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn same_site(mut self, same_site: impl Into<String>) -> Self {
        self.same_site = Some(same_site.into());
        self
    }

    /// Render a `Set-Cookie` header value.
    pub fn serialize(&self, name: &str, value: &str) -> String {
        let mut cookie = format!("{}={}", name, urlencoding::encode(value));
        if let Some(max_age) = self.max_age {
            cookie.push_str(&format!("; Max-Age={}", max_age.as_secs()));
        }
        if let Some(path) = &self.path {
            cookie.push_str(&format!("; Path={}", path));
        }
        if let Some(same_site) = &self.same_site {
            cookie.push_str(&format!("; SameSite={}", same_site));
        }
        if self.http_only {
            cookie.push_str("; HttpOnly");
        }
        if self.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

/// Hook run right before the response is committed.
pub type HeadersHook = Box<dyn FnOnce(&ResponseWriter) + Send>;

/// Hook run once the response is final.
pub type FinishHook = Box<dyn FnOnce(HttpResponse) -> BoxFuture<'static, ()> + Send>;

/// Finish hooks of a delivered response.
#[must_use = "finish hooks only run when the completion is run or spawned"]
pub struct Completion {
    response: HttpResponse,
    hooks: Vec<FinishHook>,
}

impl Completion {
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run the hooks in registration order.
    pub async fn run(self) {
        for hook in self.hooks {
            hook(self.response.clone()).await;
        }
    }

    /// Run the hooks on the current runtime without waiting for them.
    pub fn spawn(self) -> Option<tokio::task::JoinHandle<()>> {
        if self.hooks.is_empty() {
            return None;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => Some(runtime.spawn(self.run())),
            Err(_) => {
                tracing::warn!(hooks = self.hooks.len(), "No runtime to run finish hooks, dropping them");
                None
            }
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("status", &self.response.status)
            .field("hooks", &self.hooks.len())
            .finish()
    }
}

struct ResponseState {
    status: u16,
    headers: Vec<(String, String)>,
    body: Bytes,
    sent: bool,
    extensions: Extensions,
    headers_hooks: Vec<HeadersHook>,
    finish_hooks: Vec<FinishHook>,
}

/// Shared handle to the response of one request.
///
/// Cloning yields another handle to the same response; identity is checked
/// with [`ResponseWriter::ptr_eq`]. The first `send`/`json`/`end` commits
/// the response, later writes are ignored.
#[derive(Clone)]
pub struct ResponseWriter {
    inner: Arc<Mutex<ResponseState>>,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.lock();
        f.debug_struct("ResponseWriter")
            .field("status", &state.status)
            .field("sent", &state.sent)
            .finish()
    }
}

impl ResponseWriter {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ResponseState {
                status: 200,
                headers: Vec::new(),
                body: Bytes::new(),
                sent: false,
                extensions: Extensions::new(),
                headers_hooks: Vec::new(),
                finish_hooks: Vec::new(),
            })),
        }
    }

    pub fn status(&self, code: u16) -> &Self {
        self.inner.lock().status = code;
        self
    }

    pub fn status_code(&self) -> u16 {
        self.inner.lock().status
    }

    /// Set a header, replacing previous values of the same name.
    pub fn header(&self, name: &str, value: impl Into<String>) -> &Self {
        let mut state = self.inner.lock();
        state
            .headers
            .retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        state.headers.push((name.to_ascii_lowercase(), value.into()));
        self
    }

    pub fn get_header(&self, name: &str) -> Option<String> {
        self.inner
            .lock()
            .headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    /// Append a `Set-Cookie` header.
    pub fn cookie(&self, name: &str, value: &str, options: &CookieOptions) -> &Self {
        self.inner
            .lock()
            .headers
            .push(("set-cookie".to_string(), options.serialize(name, value)));
        self
    }

    /// Send a JSON body.
    pub fn json<T: Serialize + ?Sized>(&self, body: &T) -> Result<(), Error> {
        let bytes = serde_json::to_vec(body).map_err(|e| Error::Serialization(e.to_string()))?;
        self.commit(Bytes::from(bytes), Some("application/json"));
        Ok(())
    }

    /// Send a raw body.
    pub fn send(&self, body: impl Into<Bytes>) {
        self.commit(body.into(), None);
    }

    /// Finish the response without a body.
    pub fn end(&self) {
        self.commit(Bytes::new(), None);
    }

    pub fn is_sent(&self) -> bool {
        self.inner.lock().sent
    }

    pub fn ptr_eq(&self, other: &ResponseWriter) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Register a hook that runs right before the response is committed,
    /// while headers can still change.
    pub fn on_headers(&self, hook: impl FnOnce(&ResponseWriter) + Send + 'static) {
        self.inner.lock().headers_hooks.push(Box::new(hook));
    }

    /// Register a hook that runs once the response is final.
    pub fn on_finish<F, Fut>(&self, hook: F)
    where
        F: FnOnce(HttpResponse) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        self.inner
            .lock()
            .finish_hooks
            .push(Box::new(move |response| Box::pin(hook(response))));
    }

    pub fn insert_extension<T: Send + Sync + 'static>(&self, value: T) {
        self.inner.lock().extensions.insert(value);
    }

    pub fn insert_extension_arc<T: Send + Sync + 'static>(&self, value: Arc<T>) {
        self.inner.lock().extensions.insert_arc(value);
    }

    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.lock().extensions.get_arc::<T>()
    }

    /// Current state of the response.
    pub fn snapshot(&self) -> HttpResponse {
        let state = self.inner.lock();
        HttpResponse {
            status: state.status,
            headers: state.headers.clone(),
            body: state.body.clone(),
        }
    }

    /// Commit the response if nothing was sent and hand back the final
    /// response together with its pending finish hooks.
    ///
    /// The hooks do not run here. The caller delivers the response first and
    /// then runs or spawns the [`Completion`].
    pub fn finish(&self) -> (HttpResponse, Completion) {
        if !self.is_sent() {
            self.end();
        }
        let hooks = std::mem::take(&mut self.inner.lock().finish_hooks);
        let response = self.snapshot();
        let completion = Completion {
            response: response.clone(),
            hooks,
        };
        (response, completion)
    }

    fn commit(&self, body: Bytes, content_type: Option<&str>) {
        let hooks = {
            let mut state = self.inner.lock();
            if state.sent {
                tracing::warn!(status = state.status, "Response already sent, ignoring write");
                return;
            }
            std::mem::take(&mut state.headers_hooks)
        };

        for hook in hooks {
            hook(self);
        }

        let mut state = self.inner.lock();
        if state.sent {
            return;
        }
        if let Some(content_type) = content_type {
            if !state
                .headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("content-type"))
            {
                state
                    .headers
                    .push(("content-type".to_string(), content_type.to_string()));
            }
        }
        state.body = body;
        state.sent = true;
    }
}

/// Final response handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// First value of a header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// All values of a header.
    pub fn header_all(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect()
    }

    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

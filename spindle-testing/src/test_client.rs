// In-process test client

use parking_lot::Mutex;
use spindle_core::{Error, HttpRequest, HttpResponse, HttpServer};
use std::collections::HashMap;
use std::sync::Arc;

/// Drives an [`HttpServer`] without opening a socket.
///
/// Requests go through the full middleware and routing stack. Once the
/// server has produced the response, its finish hooks (session persistence)
/// are awaited so the next request sees their effects.
#[derive(Clone)]
pub struct TestClient {
    server: Arc<HttpServer>,
    default_headers: HashMap<String, String>,
    cookies: Option<Arc<Mutex<HashMap<String, String>>>>,
}

impl TestClient {
    pub fn new(server: HttpServer) -> Self {
        Self::from_arc(Arc::new(server))
    }

    pub fn from_arc(server: Arc<HttpServer>) -> Self {
        Self {
            server,
            default_headers: HashMap::new(),
            cookies: None,
        }
    }

    /// Send `value` as header `name` on every request.
    pub fn with_default_header(mut self, name: &str, value: &str) -> Self {
        self.default_headers
            .insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Keep cookies set by responses and send them back on later requests.
    pub fn with_cookie_jar(mut self) -> Self {
        self.cookies = Some(Arc::new(Mutex::new(HashMap::new())));
        self
    }

    /// Current value of a stored cookie.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.cookies.as_ref()?.lock().get(name).cloned()
    }

    pub fn server(&self) -> &HttpServer {
        &self.server
    }

    pub async fn get(&self, url: &str) -> TestResponse {
        self.request("GET", url).send().await
    }

    pub async fn post(&self, url: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request("POST", url).body(body).send().await
    }

    pub async fn put(&self, url: &str, body: impl Into<Vec<u8>>) -> TestResponse {
        self.request("PUT", url).body(body).send().await
    }

    pub async fn delete(&self, url: &str) -> TestResponse {
        self.request("DELETE", url).send().await
    }

    /// Start a request with any verb.
    pub fn request(&self, method: &str, url: &str) -> TestRequestBuilder<'_> {
        TestRequestBuilder::new(self, method, url)
    }

    async fn execute(&self, mut req: HttpRequest) -> TestResponse {
        for (name, value) in &self.default_headers {
            req.headers
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }

        if let Some(jar) = &self.cookies {
            let jar = jar.lock();
            if !jar.is_empty() && !req.headers.contains_key("cookie") {
                let header = jar
                    .iter()
                    .map(|(name, value)| format!("{}={}", name, value))
                    .collect::<Vec<_>>()
                    .join("; ");
                req.headers.insert("cookie".to_string(), header);
            }
        }

        let (response, completion) = self.server.respond(req).await;
        completion.run().await;

        if let Some(jar) = &self.cookies {
            let mut jar = jar.lock();
            for set_cookie in response.header_all("set-cookie") {
                let pair = set_cookie.split(';').next().unwrap_or_default();
                if let Some((name, value)) = pair.split_once('=') {
                    jar.insert(name.trim().to_string(), value.trim().to_string());
                }
            }
        }

        TestResponse(response)
    }
}

/// Builder for test requests
pub struct TestRequestBuilder<'a> {
    client: &'a TestClient,
    method: String,
    url: String,
    headers: Vec<(String, String)>,
    query: Vec<(String, String)>,
    body: Vec<u8>,
}

impl<'a> TestRequestBuilder<'a> {
    fn new(client: &'a TestClient, method: &str, url: &str) -> Self {
        Self {
            client,
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            query: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// `Authorization: Bearer <token>`
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", &format!("Bearer {}", token))
    }

    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `data` as the JSON body.
    pub fn json<T: serde::Serialize>(mut self, data: &T) -> Result<Self, Error> {
        self.body = serde_json::to_vec(data).map_err(|e| Error::Serialization(e.to_string()))?;
        self.headers
            .push(("Content-Type".to_string(), "application/json".to_string()));
        Ok(self)
    }

    /// Build the request without sending it.
    pub fn build(self) -> HttpRequest {
        let mut url = self.url;
        if !self.query.is_empty() {
            let query = serde_urlencoded::to_string(&self.query).unwrap_or_default();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&query);
        }

        let mut req = HttpRequest::new(self.method, url).with_body(self.body);
        for (name, value) in self.headers {
            req = req.with_header(name, value);
        }
        req
    }

    pub async fn send(self) -> TestResponse {
        let client = self.client;
        client.execute(self.build()).await
    }
}

/// Response from a test request
#[derive(Debug, Clone)]
pub struct TestResponse(pub HttpResponse);

impl TestResponse {
    pub fn status(&self) -> u16 {
        self.0.status
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.0.header(name)
    }

    pub fn body_string(&self) -> String {
        self.0.body_string()
    }

    /// Get the response body as JSON
    pub fn body_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        self.0
            .json()
            .map_err(|e| format!("Serialization error: {}", e))
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0.status)
    }

    pub fn into_inner(self) -> HttpResponse {
        self.0
    }
}

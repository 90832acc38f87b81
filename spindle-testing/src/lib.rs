//! Testing utilities for Spindle applications.
//!
//! - **TestClient** drives an [`HttpServer`](spindle_core::HttpServer)
//!   in-process, with optional default headers and a cookie jar
//! - **Assertions** on status, headers, JSON bodies and error envelopes
//! - **MockResolver** records what a parameter chain hands to it
//!
//! ## Quick Start
//!
//! ```
//! use spindle_core::*;
//! use spindle_testing::*;
//! use std::sync::Arc;
//!
//! struct Hello;
//!
//! # tokio_test::block_on(async {
//! let registry = Arc::new(Registry::new());
//! registry
//!     .controller::<Hello>()
//!     .method("hello", |_: Arc<Hello>, args: Args| async move {
//!         Ok::<_, HttpError>(Json(serde_json::json!({ "hello": args.get(0).as_json() })))
//!     })
//!     .route("hello", "get", "/hello/:name")
//!     .param("hello", 0, params::path("name"));
//!
//! let mut server = HttpServer::with_registry(registry, ServerConfig::default());
//! server.register_controller_instance("/", Arc::new(Hello)).unwrap();
//!
//! let client = TestClient::new(server);
//! let response = client.get("/hello/world").await;
//! assert_status(&response, 200);
//! assert_json(&response, &serde_json::json!({ "hello": "world" }));
//! # });
//! ```

mod assertions;
mod mock;
mod test_client;

pub use assertions::{
    assert_body_contains, assert_client_error, assert_error, assert_header, assert_json, assert_server_error,
    assert_status, assert_success,
};
pub use mock::MockResolver;
pub use test_client::{TestClient, TestRequestBuilder, TestResponse};

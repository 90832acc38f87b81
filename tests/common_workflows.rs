//! Integration tests for common Spindle workflows.
//!
//! These tests wire controllers, sessions and RPC into one server and drive
//! it both in process and over a real socket.

use serde_json::{Value, json};
use spindle::prelude::*;
use spindle::spindle_rpc::RpcManager;
use spindle::spindle_session::{SessionResult, SessionStorage};
use spindle::{Args, params};
use spindle_testing::{TestClient, assert_error, assert_json, assert_status};
use std::sync::Arc;
use std::time::Duration;

// =============================================================================
// Application
// =============================================================================

struct Notes {
    prefix: String,
}

impl Injectable for Notes {
    fn create(container: &Container) -> Result<Self, Error> {
        let config = container.resolve::<NotesConfig>()?;
        Ok(Self {
            prefix: config.prefix.clone(),
        })
    }
}

struct NotesConfig {
    prefix: String,
}

impl Injectable for NotesConfig {
    fn create(_: &Container) -> Result<Self, Error> {
        Ok(Self {
            prefix: "note".to_string(),
        })
    }
}

struct Math;

fn registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    registry
        .controller::<Notes>()
        .method("create", |notes: Arc<Notes>, args: Args| async move {
            let title: String = args.arg(0)?;
            let handle = args.downcast::<SessionHandle>(1)?;
            let count = handle.get("count").and_then(|v| v.as_u64()).unwrap_or(0) + 1;
            handle
                .set("count", count)
                .map_err(|e| HttpError::internal().with_message(e.to_string()))?;
            Ok::<_, HttpError>(Json(json!({
                "id": format!("{}-{}", notes.prefix, count),
                "title": title,
            })))
        })
        .route("create", "post", "/")
        .param("create", 0, params::body("title"))
        .param("create", 0, params::map(|value: ParamValue| match value.as_str() {
            Some(title) if !title.trim().is_empty() => Ok(ParamValue::from(title.trim())),
            _ => Err(HttpError::unprocessable_entity().with_message("title is required")),
        }))
        .param("create", 1, session_handle())
        .method("count", |_: Arc<Notes>, args: Args| async move {
            Ok::<_, HttpError>(Json(json!({ "count": args.get(0).as_json() })))
        })
        .route("count", "get", "/count")
        .param("count", 0, session("count"));
    registry
}

fn rpc(registry: &Registry) -> RpcManager {
    RpcManager::builder()
        .controller(
            RpcController::with_registry(registry, Arc::new(Math))
                .prefix("math.")
                .rpc_method("add", "add", |_: Arc<Math>, args: Args| async move {
                    let a: i64 = args.arg(0)?;
                    let b: i64 = args.arg(1)?;
                    Ok::<_, HttpError>(Json(a + b))
                })
                .param("add", 0, rpc_param("a"))
                .param("add", 1, rpc_param("b")),
        )
        .encoder(RpcEncoder::JsonRpc)
        .build()
        .unwrap()
}

fn app(config: ServerConfig) -> HttpServer {
    app_with_storage(config, InMemorySessionStorage::new())
}

fn app_with_storage<S: SessionStorage + 'static>(config: ServerConfig, storage: S) -> HttpServer {
    let registry = registry();
    let manager = Arc::new(rpc(&registry));

    let mut server = HttpServer::with_registry(registry, config).with_container(Container::new());
    server
        .use_middleware(SessionLayer::new(SessionIdSource::bearer(), storage))
        .unwrap();
    server.register_controller::<Notes>("/notes").unwrap();
    HttpPathRpcLinker::new(manager).mount(&mut server, "/rpc").unwrap();
    server
}

// =============================================================================
// In-process
// =============================================================================

#[tokio::test]
async fn test_controller_with_session_counter() {
    let client = TestClient::new(app(ServerConfig::default())).with_default_header("Authorization", "Bearer s1");

    for expected in 1..=2 {
        let response = client
            .request("POST", "/notes")
            .json(&json!({"title": "  groceries "}))
            .unwrap()
            .send()
            .await;
        assert_json(
            &response,
            &json!({"id": format!("note-{}", expected), "title": "groceries"}),
        );
    }

    let response = client.get("/notes/count").await;
    assert_json(&response, &json!({"count": 2}));
}

#[tokio::test]
async fn test_resolver_rejection() {
    let client = TestClient::new(app(ServerConfig::default()));
    let response = client
        .request("POST", "/notes")
        .json(&json!({"title": " "}))
        .unwrap()
        .send()
        .await;

    assert_error(&response, 422, -32600);
    assert_eq!(response.body_json::<Value>().unwrap()["message"], "title is required");
}

#[tokio::test]
async fn test_rpc_through_linker() {
    let client = TestClient::new(app(ServerConfig::default()));

    // Query values are strings.
    let response = client.get("/rpc/math.add?a=2&b=3").await;
    assert_error(&response, 422, -32600);

    let response = client
        .request("POST", "/rpc/math.add")
        .json(&json!({"a": 2, "b": 3}))
        .unwrap()
        .send()
        .await;
    assert_status(&response, 200);
    assert_json(&response, &json!({"result": 5}));
}

// =============================================================================
// Over a socket
// =============================================================================

#[tokio::test]
async fn test_bind_serve_and_close() {
    let config = ServerConfig::new()
        .host("127.0.0.1")
        .port(0)
        .shutdown_timeout(Duration::from_secs(1));
    let server = app(config);
    let handle = server.bind().await.unwrap();
    let base = format!("http://{}", handle.local_addr());

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/rpc/math.add", base))
        .json(&json!({"a": 40, "b": 2}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"result": 42}));

    let missing = client.get(format!("{}/missing", base)).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    drop(client);
    handle.close().await.unwrap();
}

/// A store whose writes never complete.
struct StalledStorage;

#[async_trait]
impl SessionStorage for StalledStorage {
    async fn get(&self, _id: &str) -> SessionResult<Value> {
        Ok(json!({}))
    }

    async fn set(&self, _id: &str, _session: Value, _previous: Option<Value>) -> SessionResult<()> {
        std::future::pending().await
    }

    async fn delete(&self, _id: &str) -> SessionResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_response_sent_before_session_is_persisted() {
    let config = ServerConfig::new()
        .host("127.0.0.1")
        .port(0)
        .shutdown_timeout(Duration::from_secs(1));
    let handle = app_with_storage(config, StalledStorage).bind().await.unwrap();

    let client = reqwest::Client::new();
    let response = tokio::time::timeout(
        Duration::from_secs(2),
        client
            .post(format!("http://{}/notes", handle.local_addr()))
            .bearer_auth("s1")
            .json(&json!({"title": "groceries"}))
            .send(),
    )
    .await
    .unwrap()
    .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    assert_eq!(
        response.json::<Value>().await.unwrap(),
        json!({"id": "note-1", "title": "groceries"})
    );

    drop(client);
    handle.close().await.unwrap();
}

use serde_json::{Value, json};
use spindle_core::{Args, HttpError, HttpRequest, HttpServer, Json, Registry, ServerConfig};
use spindle_rpc::*;
use std::sync::Arc;

struct DefaultController;

struct ApiController {
    status: &'static str,
}

fn manager(registry: &Registry, encoder: RpcEncoder) -> RpcManager {
    let ping = RpcController::with_registry(registry, Arc::new(DefaultController)).rpc_method(
        "ping",
        "index",
        |_: Arc<DefaultController>, _: Args| async { Ok::<_, HttpError>(Json(json!({ "ping": "ok" }))) },
    );

    let api = RpcController::with_registry(registry, Arc::new(ApiController { status: "ok" }))
        .prefix("data.")
        .rpc_method(["put", "get"], "index", |ctrl: Arc<ApiController>, args: Args| async move {
            Ok::<_, HttpError>(Json(json!({
                "api": ctrl.status,
                "key": args.get(0).as_json(),
                "payload": args.get(1).as_json(),
            })))
        })
        .param("index", 0, rpc_param("key"))
        .param("index", 1, rpc_payload())
        .rpc_method("fail", "fail", |_: Arc<ApiController>, _: Args| async {
            Err::<(), _>(HttpError::locked().with_message("Already stored"))
        })
        .rpc_method("clear", "clear", |_: Arc<ApiController>, _: Args| async { Ok::<_, HttpError>(()) });

    RpcManager::builder()
        .controller(api)
        .controller(ping)
        .encoder(encoder)
        .build()
        .unwrap()
}

fn server(linker: impl FnOnce(Arc<RpcManager>) -> HttpPathRpcLinker) -> HttpServer {
    let registry = Arc::new(Registry::new());
    let manager = Arc::new(manager(&registry, RpcEncoder::Plain));
    let mut server = HttpServer::with_registry(registry, ServerConfig::default());
    linker(manager).mount(&mut server, "/api").unwrap();
    server
}

#[test]
fn test_available_methods_in_registration_order() {
    let manager = manager(&Registry::new(), RpcEncoder::Plain);
    assert_eq!(
        manager.available_methods(),
        ["data.put", "data.get", "data.fail", "data.clear", "ping"]
    );
    assert!(manager.has_method("ping"));
    assert!(!manager.has_method("index"));
}

#[tokio::test]
async fn test_call_resolves_payload_params() {
    let manager = manager(&Registry::new(), RpcEncoder::Plain);

    let result = manager.call("data.get", json!({"key": "a", "extra": 1})).await.unwrap();
    assert_eq!(
        result,
        json!({"api": "ok", "key": "a", "payload": {"key": "a", "extra": 1}})
    );

    let result = manager.call("data.put", Value::Null).await.unwrap();
    assert_eq!(result, json!({"api": "ok", "key": null, "payload": null}));
}

#[tokio::test]
async fn test_call_without_result_is_null() {
    let manager = manager(&Registry::new(), RpcEncoder::Plain);
    assert_eq!(manager.call("data.clear", json!({})).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_handler_failure_is_reported() {
    let manager = manager(&Registry::new(), RpcEncoder::Plain);
    let err = manager.call("data.fail", json!({})).await.unwrap_err();
    assert!(matches!(err, RpcError::Failed(_)));
    assert!(err.to_string().ends_with("Already stored"));
}

#[tokio::test]
async fn test_json_rpc_encoding() {
    let manager = manager(&Registry::new(), RpcEncoder::JsonRpc);
    let result = manager.call("ping", json!({})).await.unwrap();
    assert_eq!(manager.encode(result), json!({"result": {"ping": "ok"}}));
}

#[tokio::test]
async fn test_linker_get_uses_query() {
    let server = server(HttpPathRpcLinker::new);
    let response = server.dispatch(HttpRequest::new("GET", "/api/data.get?key=b")).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.json::<Value>().unwrap(),
        json!({"api": "ok", "key": "b", "payload": {"key": "b"}})
    );
}

#[tokio::test]
async fn test_linker_post_uses_body() {
    let server = server(HttpPathRpcLinker::new);
    let req = HttpRequest::new("POST", "/api/data.put")
        .with_json(&json!({"key": "c"}))
        .unwrap();
    let response = server.dispatch(req).await;

    assert_eq!(
        response.json::<Value>().unwrap(),
        json!({"api": "ok", "key": "c", "payload": {"key": "c"}})
    );
}

#[tokio::test]
async fn test_linker_strips_prefix_and_suffix() {
    let server = server(|manager| HttpPathRpcLinker::new(manager).prefix("v1_").suffix(".json"));
    let response = server.dispatch(HttpRequest::new("POST", "/api/v1_ping.json")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.json::<Value>().unwrap(), json!({"ping": "ok"}));
}

#[tokio::test]
async fn test_linker_errors() {
    let server = server(HttpPathRpcLinker::new);

    let unknown = server.dispatch(HttpRequest::new("GET", "/api/nope")).await;
    assert_eq!(unknown.status, 404);
    assert_eq!(
        unknown.json::<Value>().unwrap()["message"],
        json!("Unknown RPC method: nope")
    );

    let failed = server.dispatch(HttpRequest::new("POST", "/api/data.fail")).await;
    assert_eq!(failed.status, 423);
    assert_eq!(failed.json::<Value>().unwrap()["message"], json!("Already stored"));

    let wrong_verb = server.dispatch(HttpRequest::new("DELETE", "/api/ping")).await;
    assert_eq!(wrong_verb.status, 404);
}

use serde_json::{Value, json};
use spindle_core::*;
use spindle_testing::*;
use std::sync::Arc;

struct Account;

fn server(mock: &MockResolver) -> HttpServer {
    let registry = Arc::new(Registry::new());
    registry
        .controller::<Account>()
        .method("login", |_: Arc<Account>, args: Args| async move {
            let res = args.response(1)?;
            res.status(201).cookie("token", "t-1", &CookieOptions::new());
            Ok::<_, HttpError>(())
        })
        .route("login", "post", "/login")
        .method("me", |_: Arc<Account>, args: Args| async move {
            let req = args.request(0)?;
            Ok::<_, HttpError>(Json(json!({
                "token": req.cookie("token"),
                "client": req.header("x-client"),
            })))
        })
        .route("me", "get", "/me")
        .method("echo", |_: Arc<Account>, args: Args| async move {
            Ok::<_, HttpError>(Json(json!({ "name": args.get(0).as_json() })))
        })
        .route("echo", "post", "/echo")
        .param("echo", 0, params::body("name"))
        .param("echo", 0, mock.declaration("mock"));

    let mut server = HttpServer::with_registry(registry, ServerConfig::default());
    server
        .register_controller_instance("/account", Arc::new(Account))
        .unwrap();
    server
}

#[tokio::test]
async fn test_cookie_jar_round_trip() {
    let client = TestClient::new(server(&MockResolver::passthrough()))
        .with_cookie_jar()
        .with_default_header("X-Client", "tests");

    let response = client.post("/account/login", Vec::new()).await;
    assert_status(&response, 201);
    assert_eq!(client.cookie("token").as_deref(), Some("t-1"));

    let response = client.get("/account/me").await;
    assert_json(&response, &json!({"token": "t-1", "client": "tests"}));
}

#[tokio::test]
async fn test_without_cookie_jar() {
    let client = TestClient::new(server(&MockResolver::passthrough()));
    client.post("/account/login", Vec::new()).await;

    let response = client.get("/account/me").await;
    assert_eq!(response.body_json::<Value>().unwrap()["token"], Value::Null);
    assert_eq!(client.cookie("token"), None);
}

#[tokio::test]
async fn test_mock_resolver_sees_chain_value() {
    let mock = MockResolver::returning("stubbed");
    let client = TestClient::new(server(&mock));

    let response = client
        .request("POST", "/account/echo")
        .json(&json!({"name": "ada"}))
        .unwrap()
        .send()
        .await;

    assert_json(&response, &json!({"name": "stubbed"}));
    assert_eq!(mock.call_count(), 1);
    assert_eq!(mock.received()[0].as_str(), Some("ada"));
}

#[tokio::test]
async fn test_unknown_route_error_envelope() {
    let client = TestClient::new(server(&MockResolver::passthrough()));
    let response = client.delete("/nowhere").await;
    assert_error(&response, 404, NOT_FOUND_CODE);
    assert_client_error(&response);
}

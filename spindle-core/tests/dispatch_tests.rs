//! End-to-end dispatch through `HttpServer::dispatch`.

use serde_json::{Value, json};
use spindle_core::*;
use std::sync::Arc;
use std::time::Duration;

fn server(registry: &Arc<Registry>) -> HttpServer {
    HttpServer::with_registry(registry.clone(), ServerConfig::default())
}

struct TestController;

#[tokio::test]
async fn test_end_to_end_put_with_query() {
    let registry = Arc::new(Registry::new());
    registry
        .controller::<TestController>()
        .method("index", |_ctrl: Arc<TestController>, args: Args| async move {
            let req = args.request(0)?;
            args.response(1)?;
            Ok::<_, HttpError>(Json(json!({ "id": req.param("id"), "test": "ok" })))
        })
        .route("index", "put", "/:id");

    let mut server = server(&registry);
    server.register_controller_instance("/test", Arc::new(TestController)).unwrap();

    let response = server.dispatch(HttpRequest::new("PUT", "/test/a?foo=foo")).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.json::<Value>().unwrap(), json!({"id": "a", "test": "ok"}));
    assert_eq!(response.header("content-type"), Some("application/json"));
}

#[tokio::test]
async fn test_resolvers_apply_in_declaration_order() {
    struct Chained;
    let registry = Arc::new(Registry::new());
    registry
        .action::<Chained>("show")
        .with_verbs("get")
        .with_path("/")
        .param(
            2,
            ParamDeclaration::function("f", |_, previous| {
                Resolved::ready(format!("f({})", previous.as_str().unwrap_or("x0")))
            }),
        )
        .param(
            2,
            ParamDeclaration::function("g", |_, previous| {
                Resolved::ready(format!("g({})", previous.as_str().unwrap_or("?")))
            }),
        )
        .handler(|_: Arc<Chained>, args: Args| async move { Ok::<_, HttpError>(args.get(2).clone()) });
    registry.controller::<Chained>();

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Chained)).unwrap();

    let response = server.dispatch(HttpRequest::new("GET", "/")).await;
    assert_eq!(response.json::<Value>().unwrap(), json!("g(f(x0))"));
}

#[tokio::test(start_paused = true)]
async fn test_parameter_indices_resolve_concurrently() {
    struct Slow;

    fn delayed(label: &'static str, millis: u64) -> ParamDeclaration {
        ParamDeclaration::function(label, move |_, _| {
            Resolved::pending(async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok::<_, BoxError>(ParamValue::from(label))
            })
        })
    }

    let registry = Arc::new(Registry::new());
    registry
        .action::<Slow>("both")
        .with_verbs("get")
        .with_path("/")
        .param(0, delayed("fast", 50))
        .param(1, delayed("slow", 100))
        .handler(|_: Arc<Slow>, args: Args| async move {
            Ok::<_, HttpError>(Json(json!([args.str(0), args.str(1)])))
        });
    registry.controller::<Slow>();

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Slow)).unwrap();

    let start = tokio::time::Instant::now();
    let response = server.dispatch(HttpRequest::new("GET", "/")).await;
    let elapsed = start.elapsed();

    assert_eq!(response.json::<Value>().unwrap(), json!(["fast", "slow"]));
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(150));
}

#[tokio::test]
async fn test_declarations_after_first_dispatch_are_ignored() {
    struct Frozen;
    let registry = Arc::new(Registry::new());
    registry
        .action::<Frozen>("read")
        .with_verbs("get")
        .with_path("/")
        .param(2, params::value("first"))
        .handler(|_: Arc<Frozen>, args: Args| async move { Ok::<_, HttpError>(args.get(2).clone()) });
    registry.controller::<Frozen>();

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Frozen)).unwrap();

    let first = server.dispatch(HttpRequest::new("GET", "/")).await;
    assert_eq!(first.json::<Value>().unwrap(), json!("first"));

    registry.register::<Frozen>("read", 2, params::value("second"));
    let second = server.dispatch(HttpRequest::new("GET", "/")).await;
    assert_eq!(second.json::<Value>().unwrap(), json!("first"));
}

#[tokio::test]
async fn test_unknown_verbs_are_dropped() {
    struct Verbs;
    let registry = Arc::new(Registry::new());
    registry
        .action::<Verbs>("only_get")
        .with_verbs(["get", "banana"])
        .with_path("/fruit")
        .handler(|_: Arc<Verbs>, _args: Args| async { Ok::<_, HttpError>("ok") });
    registry.controller::<Verbs>();

    let meta = registry.metadata::<Verbs>();
    assert_eq!(meta.routes().get("only_get").unwrap().methods, vec!["get"]);

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Verbs)).unwrap();

    assert_eq!(server.dispatch(HttpRequest::new("GET", "/fruit")).await.status, 200);
    assert_eq!(server.dispatch(HttpRequest::new("POST", "/fruit")).await.status, 404);
}

#[tokio::test]
async fn test_fallback_never_masks_routes() {
    struct Catchy;
    let registry = Arc::new(Registry::new());
    registry
        .action::<Catchy>("home")
        .with_path("/home")
        .handler(|_: Arc<Catchy>, _args: Args| async { Ok::<_, HttpError>(Json(json!({"home": true}))) });
    registry.controller::<Catchy>();

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Catchy)).unwrap();

    // No verbs: every method matches.
    let home = server.dispatch(HttpRequest::new("DELETE", "/home")).await;
    assert_eq!(home.status, 200);

    let missing = server.dispatch(HttpRequest::new("GET", "/nowhere")).await;
    assert_eq!(missing.status, 404);
    assert_eq!(
        missing.json::<Value>().unwrap(),
        json!({"code": -32601, "message": "Not Found"})
    );
}

#[tokio::test]
async fn test_error_classification() {
    struct Failing;
    let registry = Arc::new(Registry::new());
    registry
        .controller::<Failing>()
        .method("typed", |_: Arc<Failing>, _args: Args| async {
            Err::<(), _>(HttpError::not_found().with_message("X"))
        })
        .method("generic", |_: Arc<Failing>, _args: Args| async {
            Err::<(), BoxError>("boom".into())
        })
        .method("panics", |_: Arc<Failing>, _args: Args| async {
            if true {
                panic!("kaboom");
            }
            Ok::<(), HttpError>(())
        })
        .route("typed", "get", "/typed")
        .route("generic", "get", "/generic")
        .route("panics", "get", "/panics");

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Failing)).unwrap();

    let typed = server.dispatch(HttpRequest::new("GET", "/typed")).await;
    assert_eq!(typed.status, 404);
    assert_eq!(typed.json::<Value>().unwrap(), json!({"code": -32601, "message": "X"}));

    let generic = server.dispatch(HttpRequest::new("GET", "/generic")).await;
    assert_eq!(generic.status, 500);
    let body = generic.json::<Value>().unwrap();
    assert_eq!(body["code"], json!(-32603));
    assert_eq!(body["message"], json!("Error: boom"));
    assert!(body["details"]["stack"].is_array());

    let panicked = server.dispatch(HttpRequest::new("GET", "/panics")).await;
    assert_eq!(panicked.status, 500);
    assert_eq!(panicked.json::<Value>().unwrap()["code"], json!(-32603));
}

#[tokio::test]
async fn test_stack_hidden_when_disabled() {
    struct Quiet;
    let registry = Arc::new(Registry::new());
    registry
        .action::<Quiet>("fail")
        .with_path("/")
        .handler(|_: Arc<Quiet>, _args: Args| async { Err::<(), BoxError>("boom".into()) });
    registry.controller::<Quiet>();

    let mut server = HttpServer::with_registry(registry, ServerConfig::default().expose_stack(false));
    server.register_controller_instance("/", Arc::new(Quiet)).unwrap();

    let response = server.dispatch(HttpRequest::new("GET", "/")).await;
    assert_eq!(
        response.json::<Value>().unwrap(),
        json!({"code": -32603, "message": "Error: boom"})
    );
}

#[tokio::test]
async fn test_error_hook_owns_the_response() {
    struct Hooked;
    let registry = Arc::new(Registry::new());
    registry
        .controller::<Hooked>()
        .method("fail", |_: Arc<Hooked>, _args: Args| async {
            Err::<(), _>(HttpError::internal().with_message("hidden"))
        })
        .method("quiet", |_: Arc<Hooked>, _args: Args| async {
            Err::<(), _>(HttpError::teapot())
        })
        .route("fail", "get", "/fail")
        .route("quiet", "get", "/quiet")
        .on_error(|_ctrl, req, res, err| async move {
            if req.path.ends_with("quiet") {
                res.status(err.status_code());
                return;
            }
            res.status(400);
            res.json(&json!({"custom": true, "was": err.status_code()})).unwrap();
        });

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Hooked)).unwrap();

    let response = server.dispatch(HttpRequest::new("GET", "/fail")).await;
    assert_eq!(response.status, 400);
    assert_eq!(response.json::<Value>().unwrap(), json!({"custom": true, "was": 500}));

    // Left unsent by the hook: ended with the status it set.
    let quiet = server.dispatch(HttpRequest::new("GET", "/quiet")).await;
    assert_eq!(quiet.status, 418);
    assert!(quiet.body.is_empty());
}

#[tokio::test]
async fn test_builtin_params() {
    struct Users;
    let registry = Arc::new(Registry::new());
    registry
        .action::<Users>("update")
        .with_verbs("post")
        .with_path("/users/:id")
        .param(0, params::path("id"))
        .param(1, params::query("verbose"))
        .param(2, params::body("name"))
        .param(3, params::header("x-trace"))
        .handler(|_: Arc<Users>, args: Args| async move {
            Ok::<_, HttpError>(Json(json!({
                "id": args.str(0),
                "verbose": args.str(1),
                "name": args.str(2),
                "trace": args.str(3),
            })))
        });
    registry.controller::<Users>();

    let mut server = server(&registry);
    server.register_controller_instance("/api", Arc::new(Users)).unwrap();

    let req = HttpRequest::new("POST", "/api/users/u%201?verbose=yes")
        .with_header("X-Trace", "abc")
        .with_json(&json!({"name": "Ada"}))
        .unwrap();
    let response = server.dispatch(req).await;

    assert_eq!(response.status, 200);
    assert_eq!(
        response.json::<Value>().unwrap(),
        json!({"id": "u 1", "verbose": "yes", "name": "Ada", "trace": "abc"})
    );
}

#[tokio::test]
async fn test_returning_nothing_ends_with_status() {
    struct Manual;
    let registry = Arc::new(Registry::new());
    registry
        .controller::<Manual>()
        .method("created", |_: Arc<Manual>, args: Args| async move {
            args.response(1)?.status(201);
            Ok::<_, HttpError>(())
        })
        .method("written", |_: Arc<Manual>, args: Args| async move {
            let res = args.response(1)?;
            res.header("content-type", "text/plain").send("hand written");
            Ok::<_, HttpError>(res)
        })
        .route("created", "post", "/created")
        .route("written", "get", "/written");

    let mut server = server(&registry);
    server.register_controller_instance("/", Arc::new(Manual)).unwrap();

    let created = server.dispatch(HttpRequest::new("POST", "/created")).await;
    assert_eq!(created.status, 201);
    assert!(created.body.is_empty());

    let written = server.dispatch(HttpRequest::new("GET", "/written")).await;
    assert_eq!(written.status, 200);
    assert_eq!(written.body_string(), "hand written");
}

#[tokio::test]
async fn test_register_controller_through_container() {
    struct Greeting(String);

    struct Greeter {
        greeting: Arc<Greeting>,
    }

    impl Injectable for Greeter {
        fn create(container: &Container) -> Result<Self, Error> {
            Ok(Self {
                greeting: container.get::<Greeting>()?,
            })
        }
    }

    let registry = Arc::new(Registry::new());
    registry
        .action::<Greeter>("hello")
        .with_verbs("get")
        .with_path("/hello")
        .handler(|ctrl: Arc<Greeter>, _args: Args| async move {
            Ok::<_, HttpError>(ctrl.greeting.0.clone())
        });
    registry.controller::<Greeter>();

    let mut server = server(&registry);
    assert!(server.register_controller::<Greeter>("/").is_err());

    server.container().register(Greeting("hi".to_string()));
    server.register_controller::<Greeter>("/").unwrap();

    let response = server.dispatch(HttpRequest::new("GET", "/hello")).await;
    assert_eq!(response.json::<Value>().unwrap(), json!("hi"));
}

#[tokio::test]
async fn test_route_handler_must_exist() {
    struct Missing;
    let registry = Arc::new(Registry::new());
    registry.controller::<Missing>().route("ghost", "get", "/ghost");

    let mut server = server(&registry);
    let err = server.register_controller_instance("/", Arc::new(Missing)).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert!(err.to_string().contains("\"ghost\""));
}

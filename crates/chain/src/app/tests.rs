use super::*;
use crate::handler::{Handler, HandlerResult, done, error_handler_fn, handler_fn, next};
use crate::view::MockViewEngine;
use http::{StatusCode, header};
use serde::Deserialize;
use serde_json::{Map, json};
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, thiserror::Error)]
#[error("widget {0} is out of stock")]
struct OutOfStock(u32);

async fn must_not_run() -> HandlerResult {
    panic!("must not run")
}

async fn fail(message: &'static str) -> HandlerResult {
    Err(message.into())
}

async fn out_of_stock() -> HandlerResult {
    Err(Box::new(OutOfStock(7)))
}

async fn kaboom() -> HandlerResult {
    panic!("kaboom")
}

fn sender(body: &'static str) -> Handler {
    handler_fn(move |_req, res| {
        Box::pin(async move {
            res.send(body)?;
            done()
        })
    })
    .into()
}

fn echo_error() -> Handler {
    error_handler_fn(|error, _req, res| {
        Box::pin(async move {
            res.status(StatusCode::SERVICE_UNAVAILABLE).send(error.to_string())?;
            done()
        })
    })
    .into()
}

fn test_app() -> Application {
    let app = Application::new();
    app.set(keys::ENV, "test");
    app
}

fn request(method: &str, uri: &str) -> http::Request<Bytes> {
    http::Request::builder().method(method).uri(uri).body(Bytes::new()).unwrap()
}

fn text(response: &http::Response<Bytes>) -> &str {
    std::str::from_utf8(response.body()).unwrap()
}

#[tokio::test]
async fn test_items_scenario() {
    let app = test_app();
    app.get(
        "/items/:id",
        handler_fn(|req, res| {
            Box::pin(async move {
                let id = req.param("id").unwrap_or_default().to_owned();
                res.send(id)?;
                done()
            })
        }),
    )
    .unwrap();

    let response = app.handle(request("GET", "/items/42")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "42");

    let response = app.handle(request("GET", "/items/42/extra")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(text(&response).contains("Cannot GET /items/42/extra"));
}

#[tokio::test]
async fn test_registration_order_wins() {
    let app = test_app();
    let b_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&b_calls);

    app.get("/x", sender("A")).unwrap();
    app.get(
        "/x",
        handler_fn(move |_req, res| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                res.send("B")?;
                done()
            })
        }),
    )
    .unwrap();

    let response = app.handle(request("GET", "/x")).await;
    assert_eq!(text(&response), "A");
    assert_eq!(b_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_mount_merge_params() {
    for (merge_params, expected) in [(true, "id=5"), (false, "id=")] {
        let app = test_app();
        let books = Router::with_options(app.router_options().merge_params(merge_params));
        books
            .get(
                "/books",
                handler_fn(|req, res| {
                    Box::pin(async move {
                        let body = format!("id={}", req.param("id").unwrap_or_default());
                        res.send(body)?;
                        done()
                    })
                }),
            )
            .unwrap();
        app.mount("/users/:id", &books).unwrap();

        let response = app.handle(request("GET", "/users/5/books")).await;
        assert_eq!(text(&response), expected, "merge_params {merge_params}");
    }
}

#[tokio::test]
async fn test_empty_sub_router_resumes_parent() {
    let app = test_app();
    app.mount("/a", &Router::new()).unwrap();
    app.get("/a", sender("parent")).unwrap();

    let response = app.handle(request("GET", "/a")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "parent");
}

#[tokio::test]
async fn test_error_reaches_nearest_error_layer() {
    let app = test_app();
    app.get("/", handler_fn(|_req, _res| Box::pin(fail("x")))).unwrap();
    app.middleware(handler_fn(|_req, _res| Box::pin(must_not_run()))).unwrap();
    app.middleware(echo_error()).unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(text(&response), "x");
}

#[tokio::test]
async fn test_unhandled_error_uses_terminal_handler_once() {
    let app = test_app();
    app.get("/", handler_fn(|_req, _res| Box::pin(fail("x")))).unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(text(&response).matches("<pre>").count(), 1);
    assert!(text(&response).contains("<pre>x</pre>"));
    assert_eq!(response.headers().get(header::CONTENT_SECURITY_POLICY).unwrap(), "default-src 'none'");
}

#[tokio::test]
async fn test_error_thrown_by_error_handler_replaces_error() {
    let app = test_app();
    app.get("/", handler_fn(|_req, _res| Box::pin(fail("first")))).unwrap();
    app.middleware(error_handler_fn(|_error, _req, _res| Box::pin(fail("second")))).unwrap();
    app.middleware(handler_fn(|_req, _res| Box::pin(must_not_run()))).unwrap();
    app.middleware(echo_error()).unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(text(&response), "second");
}

#[tokio::test]
async fn test_double_send_is_rejected() {
    let app = test_app();
    let error_calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&error_calls);

    app.get(
        "/twice",
        handler_fn(|_req, res| {
            Box::pin(async move {
                res.send("first")?;
                res.send("second")?;
                done()
            })
        }),
    )
    .unwrap();
    app.middleware(error_handler_fn(move |_error, _req, _res| {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { next() })
    }))
    .unwrap();

    let response = app.handle(request("GET", "/twice")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text(&response), "first");
    assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
    assert_eq!(error_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_error_object_survives_mounts() {
    let app = test_app();
    let api = app.new_router();
    api.post("/widgets", handler_fn(|_req, _res| Box::pin(out_of_stock()))).unwrap();
    app.mount("/api", &api).unwrap();
    app.middleware(error_handler_fn(|error, _req, res| {
        Box::pin(async move {
            match error.downcast_ref::<OutOfStock>() {
                Some(OutOfStock(id)) => res.status(StatusCode::CONFLICT).send(format!("no stock for {id}"))?,
                None => res.status(StatusCode::INTERNAL_SERVER_ERROR).send("wrapped")?,
            }
            done()
        })
    }))
    .unwrap();

    let response = app.handle(request("POST", "/api/widgets")).await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(text(&response), "no stock for 7");
}

#[tokio::test]
async fn test_panic_becomes_500() {
    let app = test_app();
    app.get("/", handler_fn(|_req, _res| Box::pin(kaboom()))).unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(text(&response).contains("handler panicked: kaboom"));

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_http_error_status_from_handler() {
    #[derive(Deserialize)]
    struct Paging {
        #[allow(dead_code, reason = "only parsed")]
        page: u32,
    }

    let app = test_app();
    app.get(
        "/list",
        handler_fn(|req, res| {
            Box::pin(async move {
                let _paging: Paging = req.query()?;
                res.send("listed")?;
                done()
            })
        }),
    )
    .unwrap();

    assert_eq!(app.handle(request("GET", "/list?page=1")).await.status(), StatusCode::OK);
    assert_eq!(app.handle(request("GET", "/list?page=one")).await.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_malformed_param_is_400() {
    let app = test_app();
    app.get("/items/:id", handler_fn(|_req, _res| Box::pin(must_not_run()))).unwrap();

    let response = app.handle(request("GET", "/items/%FF")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(text(&response).contains("Failed to decode param"));
}

#[tokio::test]
async fn test_production_hides_error_details() {
    let app = test_app();
    app.set(keys::ENV, "production");
    app.get("/", handler_fn(|_req, _res| Box::pin(fail("secret detail")))).unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!text(&response).contains("secret detail"));
    assert!(text(&response).contains("Internal Server Error"));
}

#[tokio::test]
async fn test_automatic_options() {
    let app = test_app();
    app.route("/items").unwrap().get(sender("list")).post(sender("create"));

    let response = app.handle(request("OPTIONS", "/items")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::ALLOW).unwrap(), "GET,POST,HEAD");

    let response = app.handle(request("OPTIONS", "/nothing")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_head_is_served_by_get() {
    let app = test_app();
    app.get("/doc", sender("hello")).unwrap();

    let response = app.handle(request("HEAD", "/doc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "5");
    assert!(response.body().is_empty());
}

#[tokio::test]
async fn test_routing_settings_are_read_once() {
    let app = test_app();
    app.enable(keys::CASE_SENSITIVE_ROUTING);
    app.get("/Users", sender("users")).unwrap();
    app.disable(keys::CASE_SENSITIVE_ROUTING);

    assert_eq!(app.handle(request("GET", "/Users")).await.status(), StatusCode::OK);
    assert_eq!(app.handle(request("GET", "/users")).await.status(), StatusCode::NOT_FOUND);
    assert!(!app.new_router().config().case_sensitive);
}

#[tokio::test]
async fn test_strict_routing() {
    let app = test_app();
    app.enable(keys::STRICT_ROUTING);
    app.get("/dir/", sender("dir")).unwrap();

    assert_eq!(app.handle(request("GET", "/dir/")).await.status(), StatusCode::OK);
    assert_eq!(app.handle(request("GET", "/dir")).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_powered_by_header() {
    let app = test_app();
    app.get("/", sender("home")).unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(response.headers().get("x-powered-by").unwrap(), "micro-chain");

    app.disable(keys::X_POWERED_BY);
    let response = app.handle(request("GET", "/")).await;
    assert!(response.headers().get("x-powered-by").is_none());
}

#[tokio::test]
async fn test_abandoned_request_stops_dispatch() {
    let app = test_app();
    let token = CancellationToken::new();
    let cancel = token.clone();

    app.middleware(handler_fn(move |_req, _res| {
        cancel.cancel();
        Box::pin(async { next() })
    }))
    .unwrap();
    app.middleware(handler_fn(|_req, _res| Box::pin(must_not_run()))).unwrap();

    assert!(app.handle_until(request("GET", "/"), token).await.is_none());
}

#[tokio::test]
async fn test_handle_until_without_cancellation() {
    let app = test_app();
    app.get("/", sender("home")).unwrap();

    let response = app.handle_until(request("GET", "/"), CancellationToken::new()).await.unwrap();
    assert_eq!(text(&response), "home");
}

#[tokio::test]
async fn test_render_through_application() {
    let mut engine = MockViewEngine::new();
    engine
        .expect_render()
        .withf(|path, locals| path.ends_with("home.tpl") && locals.get("site") == Some(&json!("shop")))
        .returning(|_, locals| Ok(format!("<h1>{}</h1>", locals["title"].as_str().unwrap_or_default())));

    let app = test_app();
    app.engine("tpl", engine).set(keys::VIEW_ENGINE, "tpl");
    app.locals().set("site", "shop");
    app.get(
        "/",
        handler_fn(|_req, res| {
            Box::pin(async move {
                let mut locals = Map::new();
                locals.insert("title".to_owned(), json!("Welcome"));
                res.render("home", locals)?;
                done()
            })
        }),
    )
    .unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(text(&response), "<h1>Welcome</h1>");
}

#[tokio::test]
async fn test_concurrent_requests_keep_their_params() {
    let app = test_app();
    app.get(
        "/items/:id",
        handler_fn(|req, res| {
            Box::pin(async move {
                tokio::task::yield_now().await;
                let id = req.param("id").unwrap_or_default().to_owned();
                res.send(id)?;
                done()
            })
        }),
    )
    .unwrap();

    let requests = (0..16).map(|i| app.handle(request("GET", &format!("/items/{i}"))));
    let responses = futures::future::join_all(requests).await;
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(text(response), i.to_string());
    }
}

#[tokio::test]
async fn test_settings_loaded_from_json() {
    let app = test_app();
    app.settings().load_json(r#"{"json spaces": 2, "x-powered-by": false}"#).unwrap();
    app.get(
        "/",
        handler_fn(|_req, res| {
            Box::pin(async move {
                res.json(&json!({"ok": true}))?;
                done()
            })
        }),
    )
    .unwrap();

    let response = app.handle(request("GET", "/")).await;
    assert_eq!(text(&response), "{\n  \"ok\": true\n}");
    assert!(response.headers().get("x-powered-by").is_none());
}

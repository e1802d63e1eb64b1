use bytes::Bytes;
use http::StatusCode;
use micro_chain::{Application, HandlerResult, HttpError, Router, done, error_handler_fn, handler_fn, keys, next};
use serde::Deserialize;
use serde_json::json;
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Deserialize, Debug)]
struct Paging {
    page: Option<u32>,
}

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::INFO).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let app = Application::new();
    app.set(keys::JSON_SPACES, 2);

    // request logging
    app.middleware(handler_fn(|req, _res| {
        Box::pin(async move {
            info!(method = %req.method(), url = req.original_url(), "incoming request");
            next()
        })
    }))
    .unwrap();

    let users = Router::with_options(app.router_options().merge_params(true));
    users
        .get(
            "/",
            handler_fn(|req, res| {
                Box::pin(async move {
                    let paging: Paging = req.query()?;
                    let org = req.param("org").unwrap_or_default().to_owned();
                    res.json(&json!({"org": org, "page": paging.page.unwrap_or(1), "users": ["alice", "bob"]}))?;
                    done()
                })
            }),
        )
        .unwrap()
        .get(
            "/:id(\\d+)",
            handler_fn(|req, _res| {
                Box::pin(async move {
                    let id = req.param("id").unwrap_or_default();
                    let result: HandlerResult = Err(HttpError::not_found(format!("user {id} does not exist")).into());
                    result
                })
            }),
        )
        .unwrap();
    app.mount("/orgs/:org/users", &users).unwrap();

    // last resort, answers every error as json
    app.middleware(error_handler_fn(|error, _req, res| {
        Box::pin(async move {
            let status = error.downcast_ref::<HttpError>().map_or(StatusCode::INTERNAL_SERVER_ERROR, HttpError::status);
            res.status(status).json(&json!({"error": error.to_string()}))?;
            done()
        })
    }))
    .unwrap();

    for uri in ["/orgs/acme/users?page=2", "/orgs/acme/users/42", "/nowhere"] {
        let request = http::Request::get(uri).body(Bytes::new()).unwrap();
        let response = app.handle(request).await;
        info!(uri, status = %response.status(), body = %String::from_utf8_lossy(response.body()), "handled");
    }
}

use bytes::Bytes;
use micro_chain::{Application, done, handler_fn};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() {
    let subscriber = FmtSubscriber::builder().with_max_level(Level::DEBUG).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let app = Application::new();
    app.get(
        "/",
        handler_fn(|_req, res| {
            Box::pin(async move {
                res.send("hello world")?;
                done()
            })
        }),
    )
    .unwrap();

    for path in ["/", "/missing"] {
        let request = http::Request::get(path).body(Bytes::new()).unwrap();
        let response = app.handle(request).await;
        info!(path, status = %response.status(), body = ?response.body(), "handled");
    }
}

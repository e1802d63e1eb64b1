//! The application: settings, locals, view engines and a lazily created root router.
//!
//! An [`Application`] turns an [`http::Request`] into an [`http::Response`] by dispatching it
//! through its root router. Requests which fall out of the root router are answered by the
//! terminal handler: `404 Not Found` without an error, the error's status otherwise.
//!
//! # Examples
//!
//! ```
//! use micro_chain::{done, handler_fn, Application};
//!
//! # tokio_test_block(async {
//! let app = Application::new();
//! app.get("/items/:id", handler_fn(|req, res| Box::pin(async move {
//!     let id = req.param("id").unwrap_or_default().to_owned();
//!     res.send(id)?;
//!     done()
//! })))
//! .unwrap();
//!
//! let request = http::Request::get("/items/42").body(bytes::Bytes::new()).unwrap();
//! let response = app.handle(request).await;
//! assert_eq!(response.status(), http::StatusCode::OK);
//! assert_eq!(response.body().as_ref(), b"42");
//! # });
//! # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

mod finalhandler;
pub(crate) mod settings;
mod state;

pub use settings::{ENV_VAR, Locals, Settings, keys};
pub use state::AppState;

use crate::error::ConfigError;
use crate::handler::IntoHandlers;
use crate::router::{Mountable, Outcome, Router, RouterOptions};
use crate::view::ViewEngine;
use crate::{Request, Response, Route};
use bytes::Bytes;
use http::{HeaderName, HeaderValue, Method};
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const X_POWERED_BY: &str = "x-powered-by";
const POWERED_BY: &str = "micro-chain";

pub struct Application {
    state: Arc<AppState>,
    router: OnceCell<Router>,
}

macro_rules! app_method {
    ($name:ident) => {
        #[doc = concat!("Registers `", stringify!($name), "` handlers on the root router, see [`Router::", stringify!($name), "`].")]
        pub fn $name(&self, pattern: &str, handlers: impl IntoHandlers) -> Result<&Self, ConfigError> {
            self.router().$name(pattern, handlers)?;
            Ok(self)
        }
    };
}

impl Application {
    pub fn new() -> Self {
        Self::with_settings(Settings::new())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self { state: Arc::new(AppState::new(settings)), router: OnceCell::new() }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        self.state.settings()
    }

    pub fn locals(&self) -> &Locals {
        self.state.locals()
    }

    /// Assigns a setting.
    ///
    /// The routing settings are read once, when the root router is created by the first
    /// registration or request.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) -> &Self {
        self.state.settings().set(key, value);
        self
    }

    pub fn setting(&self, key: &str) -> Option<Value> {
        self.state.settings().get(key)
    }

    pub fn enable(&self, key: impl Into<String>) -> &Self {
        self.state.settings().enable(key);
        self
    }

    pub fn disable(&self, key: impl Into<String>) -> &Self {
        self.state.settings().disable(key);
        self
    }

    pub fn enabled(&self, key: &str) -> bool {
        self.state.settings().enabled(key)
    }

    pub fn disabled(&self, key: &str) -> bool {
        self.state.settings().disabled(key)
    }

    /// Registers the view engine rendering files with extension `ext`.
    pub fn engine(&self, ext: &str, engine: impl ViewEngine + 'static) -> &Self {
        self.state.register_engine(ext, engine);
        self
    }

    /// The root router, created with the current routing settings on first use.
    pub fn router(&self) -> &Router {
        self.router.get_or_init(|| {
            let options = self.router_options();
            debug!(?options, "creating the root router");
            Router::with_options(options)
        })
    }

    /// Router options derived from the current routing settings.
    pub fn router_options(&self) -> RouterOptions {
        let settings = self.state.settings();
        RouterOptions::default()
            .case_sensitive(settings.enabled(keys::CASE_SENSITIVE_ROUTING))
            .strict(settings.enabled(keys::STRICT_ROUTING))
    }

    /// A new router using the application's routing settings, to be mounted later.
    pub fn new_router(&self) -> Router {
        Router::with_options(self.router_options())
    }

    pub fn route(&self, pattern: &str) -> Result<Route, ConfigError> {
        self.router().route(pattern)
    }

    app_method!(get);
    app_method!(post);
    app_method!(put);
    app_method!(patch);
    app_method!(delete);
    app_method!(head);
    app_method!(options);
    app_method!(all);

    pub fn middleware(&self, middleware: impl Into<Mountable>) -> Result<&Self, ConfigError> {
        self.router().middleware(middleware)?;
        Ok(self)
    }

    pub fn middleware_at(&self, pattern: &str, middleware: impl Into<Mountable>) -> Result<&Self, ConfigError> {
        self.router().middleware_at(pattern, middleware)?;
        Ok(self)
    }

    pub fn mount(&self, pattern: &str, router: &Router) -> Result<&Self, ConfigError> {
        self.router().mount(pattern, router)?;
        Ok(self)
    }

    /// Dispatches one request and returns the response.
    pub async fn handle<B: Into<Bytes>>(&self, request: http::Request<B>) -> http::Response<Bytes> {
        self.run(request, CancellationToken::new()).await.into_http()
    }

    /// Dispatches one request until `cancellation` fires.
    ///
    /// Returns `None` when the client went away: dispatch stops at the next layer boundary and
    /// writes made after cancellation are dropped.
    pub async fn handle_until<B: Into<Bytes>>(
        &self,
        request: http::Request<B>,
        cancellation: CancellationToken,
    ) -> Option<http::Response<Bytes>> {
        let res = self.run(request, cancellation).await;
        if res.is_abandoned() { None } else { Some(res.into_http()) }
    }

    async fn run<B: Into<Bytes>>(&self, request: http::Request<B>, cancellation: CancellationToken) -> Response {
        let head_request = request.method() == Method::HEAD;
        let mut req = Request::from_http(request, Arc::clone(&self.state));
        let mut res = Response::new(Arc::clone(&self.state), cancellation, head_request);

        if self.state.settings().enabled(keys::X_POWERED_BY) {
            res.headers_mut().insert(HeaderName::from_static(X_POWERED_BY), HeaderValue::from_static(POWERED_BY));
        }

        trace!(method = %req.method(), url = req.original_url(), "dispatching request");
        match self.router().handle(&mut req, &mut res).await {
            Outcome::Handled => {
                if !res.is_finished() {
                    warn!(method = %req.method(), url = req.original_url(), "request was reported done but the response was never finalized");
                }
            }
            Outcome::Abandoned => debug!(method = %req.method(), url = req.original_url(), "request abandoned by the client"),
            Outcome::Fallthrough(None) => finalhandler::not_found(&req, &mut res),
            Outcome::Fallthrough(Some(error)) => finalhandler::unhandled_error(error, &req, &mut res),
        }
        res
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application").field("state", &self.state).field("router", &self.router.get()).finish()
    }
}

#[cfg(test)]
mod tests;

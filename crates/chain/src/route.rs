//! A route: one path pattern with an ordered list of method filtered handlers.
//!
//! # Examples
//!
//! ```
//! use micro_chain::{done, handler_fn, Router};
//!
//! let router = Router::new();
//! router
//!     .route("/books/:id")
//!     .unwrap()
//!     .get(handler_fn(|req, res| Box::pin(async move {
//!         res.send(format!("book {}", req.param("id").unwrap_or_default()))?;
//!         done()
//!     })))
//!     .delete(handler_fn(|_req, res| Box::pin(async move {
//!         res.send_status(http::StatusCode::NO_CONTENT)?;
//!         done()
//!     })));
//! ```

use crate::error::BoxError;
use crate::filter::{self, MethodFilter};
use crate::handler::{Flow, Handler};
use crate::router::report_after_finish;
use crate::{Request, Response};
use arc_swap::ArcSwap;
use http::Method;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// A handle to a route registered on a [`Router`](crate::Router).
///
/// Cloning the handle does not copy the route, handlers added through any clone are visible to
/// requests dispatched afterwards.
#[derive(Clone)]
pub struct Route {
    inner: Arc<RouteInner>,
}

struct RouteInner {
    pattern: String,
    entries: ArcSwap<Vec<RouteEntry>>,
}

#[derive(Clone)]
struct RouteEntry {
    filter: MethodFilter,
    handler: Handler,
}

/// How the router continues after a route ran.
pub(crate) enum RouteOutcome {
    /// continue with the next layer, possibly with an error
    Continue(Option<BoxError>),
    /// `next_router` was requested
    ExitRouter,
    /// the response was finalized or the request handled
    Done,
}

macro_rules! route_method {
    ($name:ident, $filter:ident) => {
        #[doc = concat!("Appends a handler for `", stringify!($name), "` requests.")]
        pub fn $name(&self, handler: impl Into<Handler>) -> &Self {
            self.method(filter::$filter(), handler)
        }
    };
}

impl Route {
    pub(crate) fn new(pattern: &str) -> Self {
        Self { inner: Arc::new(RouteInner { pattern: pattern.to_owned(), entries: ArcSwap::from_pointee(Vec::new()) }) }
    }

    pub fn pattern(&self) -> &str {
        &self.inner.pattern
    }

    /// Appends a handler which only runs for requests admitted by `filter`.
    pub fn method(&self, filter: impl Into<MethodFilter>, handler: impl Into<Handler>) -> &Self {
        let entry = RouteEntry { filter: filter.into(), handler: handler.into() };
        self.inner.entries.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(entry.clone());
            next
        });
        self
    }

    /// Appends a handler for every method.
    pub fn all(&self, handler: impl Into<Handler>) -> &Self {
        self.method(MethodFilter::All, handler)
    }

    route_method!(get, get_method);
    route_method!(post, post_method);
    route_method!(put, put_method);
    route_method!(patch, patch_method);
    route_method!(delete, delete_method);
    route_method!(head, head_method);
    route_method!(options, options_method);

    pub fn len(&self) -> usize {
        self.inner.entries.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether some handler of this route runs for `method`, `HEAD` is served by `GET` handlers.
    pub fn handles_method(&self, method: &Method) -> bool {
        let entries = self.inner.entries.load();
        let admitted = |method: &Method| entries.iter().any(|entry| entry.filter.admits(method));
        admitted(method) || (method == Method::HEAD && admitted(&Method::GET))
    }

    /// The methods explicitly handled by this route, `HEAD` is implied by `GET`.
    pub fn allowed_methods(&self) -> Vec<Method> {
        let entries = self.inner.entries.load();
        let mut methods: Vec<Method> = Vec::with_capacity(entries.len() + 1);
        for method in entries.iter().filter_map(|entry| entry.filter.method()) {
            if !methods.contains(method) {
                methods.push(method.clone());
            }
        }
        if methods.contains(&Method::GET) && !methods.contains(&Method::HEAD) {
            methods.push(Method::HEAD);
        }
        methods
    }

    /// Runs the handlers admitted for the request method in registration order.
    pub(crate) async fn dispatch(&self, req: &mut Request, res: &mut Response) -> RouteOutcome {
        let entries = self.inner.entries.load_full();
        let method = self.effective_method(&entries, req.method());

        let mut pending: Option<BoxError> = None;
        for entry in entries.iter().filter(|entry| entry.filter.admits(&method)) {
            trace!(route = %self.inner.pattern, filter = %entry.filter, "calling route handler");
            let result = entry.handler.call(pending.take(), req, res).await;

            if res.is_abandoned() {
                return RouteOutcome::Done;
            }
            if res.is_finished() {
                report_after_finish(&result, &self.inner.pattern);
                return RouteOutcome::Done;
            }

            match result {
                Ok(Flow::Next) => {}
                Ok(Flow::NextRoute) => return RouteOutcome::Continue(None),
                Ok(Flow::NextRouter) => return RouteOutcome::ExitRouter,
                Ok(Flow::Done) => return RouteOutcome::Done,
                Err(error) => pending = Some(error),
            }
        }

        RouteOutcome::Continue(pending)
    }

    fn effective_method(&self, entries: &[RouteEntry], method: &Method) -> Method {
        if method == Method::HEAD && !entries.iter().any(|entry| entry.filter.method() == Some(&Method::HEAD)) {
            Method::GET
        } else {
            method.clone()
        }
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.inner.entries.load();
        let filters: Vec<String> = entries.iter().map(|entry| entry.filter.to_string()).collect();
        f.debug_struct("Route").field("pattern", &self.inner.pattern).field("methods", &filters).finish()
    }
}

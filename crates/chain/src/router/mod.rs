//! Routers: ordered stacks of middleware, routes and mounted routers.
//!
//! A router is a cheap handle, clones share the same stack. Registration appends to the stack
//! and may run while requests are being dispatched: a request walks the snapshot of the stack
//! taken when it entered the router, later registrations are seen by later requests.
//!
//! # Examples
//!
//! ```
//! use micro_chain::{done, handler_fn, next, Router, RouterOptions};
//!
//! let users = Router::with_options(RouterOptions::default().merge_params(true));
//! users
//!     .get("/", handler_fn(|req, res| Box::pin(async move {
//!         res.send(format!("users of {}", req.param("org").unwrap_or_default()))?;
//!         done()
//!     })))
//!     .unwrap();
//!
//! let root = Router::new();
//! root.middleware(handler_fn(|_req, _res| Box::pin(async { next() }))).unwrap();
//! root.mount("/orgs/:org/users", &users).unwrap();
//! ```

mod dispatch;

pub(crate) use dispatch::{Outcome, report_after_finish};

use crate::error::ConfigError;
use crate::filter::MethodFilter;
use crate::handler::{ErrorHandler, FnErrorHandler, FnHandler, Handler, IntoHandlers, RequestHandler};
use crate::layer::{Layer, LayerKind};
use crate::path::{MatchOptions, PathMatcher};
use crate::route::Route;
use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Identifies a router for diagnostics and cycle detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouterId(u64);

impl RouterId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        RouterId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Options fixed when a router is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouterOptions {
    /// route and mount paths compare case sensitively
    pub case_sensitive: bool,
    /// a trailing slash is significant for routes
    pub strict: bool,
    /// parameters bound by the enclosing routers stay visible, own parameters win on collision
    pub merge_params: bool,
}

impl RouterOptions {
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn merge_params(mut self, merge_params: bool) -> Self {
        self.merge_params = merge_params;
        self
    }
}

/// What can be registered as middleware: a handler, or a whole router.
#[derive(Debug)]
pub enum Mountable {
    Handler(Handler),
    Router(Router),
}

impl From<Handler> for Mountable {
    fn from(handler: Handler) -> Self {
        Mountable::Handler(handler)
    }
}

impl From<Router> for Mountable {
    fn from(router: Router) -> Self {
        Mountable::Router(router)
    }
}

impl From<&Router> for Mountable {
    fn from(router: &Router) -> Self {
        Mountable::Router(router.clone())
    }
}

impl<F> From<FnHandler<F>> for Mountable
where
    FnHandler<F>: RequestHandler + 'static,
{
    fn from(handler: FnHandler<F>) -> Self {
        Mountable::Handler(Handler::request(handler))
    }
}

impl<F> From<FnErrorHandler<F>> for Mountable
where
    FnErrorHandler<F>: ErrorHandler + 'static,
{
    fn from(handler: FnErrorHandler<F>) -> Self {
        Mountable::Handler(Handler::error(handler))
    }
}

#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

struct RouterInner {
    id: RouterId,
    options: RouterOptions,
    stack: ArcSwap<Vec<Arc<Layer>>>,
}

macro_rules! router_method {
    ($name:ident) => {
        #[doc = concat!("Registers `", stringify!($name), "` handlers on one route for `pattern`, see [`Route::", stringify!($name), "`].")]
        pub fn $name(&self, pattern: &str, handlers: impl IntoHandlers) -> Result<&Self, ConfigError> {
            let (route, handlers) = self.route_with(pattern, handlers)?;
            for handler in handlers {
                route.$name(handler);
            }
            Ok(self)
        }
    };
}

impl Router {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            inner: Arc::new(RouterInner { id: RouterId::next(), options, stack: ArcSwap::from_pointee(Vec::new()) }),
        }
    }

    pub fn id(&self) -> RouterId {
        self.inner.id
    }

    /// The options this router was created with
    pub fn config(&self) -> RouterOptions {
        self.inner.options
    }

    /// Number of layers registered on this router, mounted routers count as one
    pub fn len(&self) -> usize {
        self.inner.stack.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Creates a route for `pattern` and appends it to the stack.
    ///
    /// The pattern must match the whole request path; handlers are added on the returned
    /// [`Route`].
    pub fn route(&self, pattern: &str) -> Result<Route, ConfigError> {
        let options = MatchOptions::route().case_sensitive(self.inner.options.case_sensitive).strict(self.inner.options.strict);
        let matcher = PathMatcher::compile(pattern, options)?;

        let route = Route::new(pattern);
        self.push(Layer::new(matcher, LayerKind::Route(route.clone())));
        Ok(route)
    }

    router_method!(get);
    router_method!(post);
    router_method!(put);
    router_method!(patch);
    router_method!(delete);
    router_method!(head);
    router_method!(options);

    /// Registers handlers for every method on one route for `pattern`.
    pub fn all(&self, pattern: &str, handlers: impl IntoHandlers) -> Result<&Self, ConfigError> {
        let (route, handlers) = self.route_with(pattern, handlers)?;
        for handler in handlers {
            route.all(handler);
        }
        Ok(self)
    }

    /// Registers handlers for `method` on one route for `pattern`.
    pub fn method(
        &self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        handlers: impl IntoHandlers,
    ) -> Result<&Self, ConfigError> {
        let method = method.into();
        let (route, handlers) = self.route_with(pattern, handlers)?;
        for handler in handlers {
            route.method(method.clone(), handler);
        }
        Ok(self)
    }

    /// Creates the route for a verb registration, an empty handler list registers nothing.
    fn route_with(&self, pattern: &str, handlers: impl IntoHandlers) -> Result<(Route, Vec<Handler>), ConfigError> {
        let handlers = handlers.into_handlers();
        if handlers.is_empty() {
            return Err(ConfigError::NoHandlers { pattern: pattern.to_owned() });
        }
        Ok((self.route(pattern)?, handlers))
    }

    /// Registers middleware for every path.
    pub fn middleware(&self, middleware: impl Into<Mountable>) -> Result<&Self, ConfigError> {
        self.middleware_at("/", middleware)
    }

    /// Registers middleware for the paths starting with `pattern`, on segment boundaries.
    ///
    /// The matched prefix is moved from [`Request::path`](crate::Request::path) to
    /// [`Request::base_url`](crate::Request::base_url) while the middleware runs.
    pub fn middleware_at(&self, pattern: &str, middleware: impl Into<Mountable>) -> Result<&Self, ConfigError> {
        let options = MatchOptions::prefix().case_sensitive(self.inner.options.case_sensitive);
        let matcher = PathMatcher::compile(pattern, options)?;

        let kind = match middleware.into() {
            Mountable::Handler(handler) => LayerKind::Middleware(handler),
            Mountable::Router(child) => {
                if child.reaches(self.id()) {
                    return Err(ConfigError::CyclicMount { parent: self.id().get(), child: child.id().get() });
                }
                debug!(parent = %self.id(), child = %child.id(), pattern, "mounting router");
                LayerKind::Mount(child)
            }
        };

        self.push(Layer::new(matcher, kind));
        Ok(self)
    }

    /// Mounts `router` under `pattern`.
    pub fn mount(&self, pattern: &str, router: &Router) -> Result<&Self, ConfigError> {
        self.middleware_at(pattern, router)
    }

    /// Whether `target` is this router or is mounted somewhere below it.
    fn reaches(&self, target: RouterId) -> bool {
        if self.id() == target {
            return true;
        }
        self.inner.stack.load().iter().any(|layer| match layer.kind() {
            LayerKind::Mount(child) => child.reaches(target),
            _ => false,
        })
    }

    fn push(&self, layer: Layer) {
        let layer = Arc::new(layer);
        self.inner.stack.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(Arc::clone(&layer));
            next
        });
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("id", &self.inner.id)
            .field("options", &self.inner.options)
            .field("stack", &self.inner.stack.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{handler_fn, next};

    fn noop() -> Handler {
        handler_fn(|_req, _res| Box::pin(async { next() })).into()
    }

    #[test]
    fn test_registration_appends_in_order() {
        let router = Router::new();
        router.get("/a", noop()).unwrap().middleware(noop()).unwrap().post("/b", noop()).unwrap();

        let stack = router.inner.stack.load();
        let patterns: Vec<&str> = stack.iter().map(|layer| layer.pattern()).collect();
        assert_eq!(patterns, ["/a", "/", "/b"]);
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let router = Router::new();
        assert!(router.get("users", noop()).is_err());
        assert!(router.get("/:id/:id", noop()).is_err());
        assert!(router.is_empty());
    }

    #[test]
    fn test_several_handlers_share_one_route() {
        let router = Router::new();
        router.get("/x", [noop(), noop()]).unwrap().post("/x", vec![noop()]).unwrap();

        let stack = router.inner.stack.load();
        let sizes: Vec<usize> = stack
            .iter()
            .map(|layer| match layer.kind() {
                LayerKind::Route(route) => route.len(),
                _ => 0,
            })
            .collect();
        assert_eq!(sizes, [2, 1]);
    }

    #[test]
    fn test_empty_handler_list_is_rejected() {
        let router = Router::new();
        assert!(matches!(router.get("/x", Vec::<Handler>::new()), Err(ConfigError::NoHandlers { .. })));
        assert!(router.is_empty());
    }

    #[test]
    fn test_router_ids_are_unique() {
        assert_ne!(Router::new().id(), Router::new().id());
    }

    #[test]
    fn test_cyclic_mount_is_rejected() {
        let root = Router::new();
        let child = Router::new();
        let grandchild = Router::new();
        root.mount("/child", &child).unwrap();
        child.mount("/grandchild", &grandchild).unwrap();

        assert!(matches!(grandchild.mount("/root", &root), Err(ConfigError::CyclicMount { .. })));
        assert!(matches!(root.mount("/self", &root), Err(ConfigError::CyclicMount { .. })));
        assert_eq!(grandchild.len(), 0);
    }

    #[test]
    fn test_same_router_mounted_twice() {
        let root = Router::new();
        let shared = Router::new();
        root.mount("/a", &shared).unwrap();
        root.mount("/b", &shared).unwrap();
        assert_eq!(root.len(), 2);
    }

    #[test]
    fn test_clones_share_the_stack() {
        let router = Router::new();
        let clone = router.clone();
        clone.get("/late", noop()).unwrap();
        assert_eq!(router.len(), 1);
        assert_eq!(router.id(), clone.id());
    }
}

//! Request and error handlers.
//!
//! A handler either completes the response, or tells the dispatch loop how to continue through
//! the returned [`Flow`]. Returning `Err(error)` is the equivalent of `next(error)`: the loop
//! stops offering the request to request handlers and looks for the next [`ErrorHandler`].
//!
//! Whether a handler deals with errors is part of its type: [`Handler`] is a sum of the two
//! handler kinds, so the loop never has to guess what kind of call a handler expects.
//!
//! # Examples
//!
//! ```
//! use micro_chain::{done, error_handler_fn, handler_fn, next, Handler};
//!
//! let log = handler_fn(|req, _res| Box::pin(async move {
//!     println!("{} {}", req.method(), req.path());
//!     next()
//! }));
//!
//! let hello = handler_fn(|_req, res| Box::pin(async move {
//!     res.send("hello")?;
//!     done()
//! }));
//!
//! let recover = error_handler_fn(|error, _req, res| Box::pin(async move {
//!     res.status(http::StatusCode::INTERNAL_SERVER_ERROR).send(error.to_string())?;
//!     done()
//! }));
//!
//! let handlers: [Handler; 3] = [log.into(), hello.into(), recover.into()];
//! assert!(handlers[2].is_error_handler());
//! ```

use crate::error::{BoxError, PanicError};
use crate::{Request, Response};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// How the dispatch loop continues after a handler returned successfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// continue with the next matching handler
    Next,
    /// skip the remaining handlers of the current route
    NextRoute,
    /// leave the current router, its parent continues after the mount
    NextRouter,
    /// the request has been handled, nothing else runs
    Done,
}

pub type HandlerResult = Result<Flow, BoxError>;

/// Continue with the next matching handler.
#[inline]
pub fn next() -> HandlerResult {
    Ok(Flow::Next)
}

/// Skip the remaining handlers of the current route.
#[inline]
pub fn next_route() -> HandlerResult {
    Ok(Flow::NextRoute)
}

/// Leave the current router.
#[inline]
pub fn next_router() -> HandlerResult {
    Ok(Flow::NextRouter)
}

/// Stop dispatching, the request has been handled.
#[inline]
pub fn done() -> HandlerResult {
    Ok(Flow::Done)
}

#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn invoke(&self, req: &mut Request, res: &mut Response) -> HandlerResult;
}

#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn invoke(&self, error: BoxError, req: &mut Request, res: &mut Response) -> HandlerResult;
}

/// a closure holder which represents a request handler
pub struct FnHandler<F> {
    f: F,
}

pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: for<'r> Fn(&'r mut Request, &'r mut Response) -> BoxFuture<'r, HandlerResult> + Send + Sync,
{
    FnHandler { f }
}

#[async_trait]
impl<F> RequestHandler for FnHandler<F>
where
    F: for<'r> Fn(&'r mut Request, &'r mut Response) -> BoxFuture<'r, HandlerResult> + Send + Sync,
{
    async fn invoke(&self, req: &mut Request, res: &mut Response) -> HandlerResult {
        (self.f)(req, res).await
    }
}

/// a closure holder which represents an error handler
pub struct FnErrorHandler<F> {
    f: F,
}

pub fn error_handler_fn<F>(f: F) -> FnErrorHandler<F>
where
    F: for<'r> Fn(BoxError, &'r mut Request, &'r mut Response) -> BoxFuture<'r, HandlerResult> + Send + Sync,
{
    FnErrorHandler { f }
}

#[async_trait]
impl<F> ErrorHandler for FnErrorHandler<F>
where
    F: for<'r> Fn(BoxError, &'r mut Request, &'r mut Response) -> BoxFuture<'r, HandlerResult> + Send + Sync,
{
    async fn invoke(&self, error: BoxError, req: &mut Request, res: &mut Response) -> HandlerResult {
        (self.f)(error, req, res).await
    }
}

/// A registered handler: either a request handler or an error handler.
#[derive(Clone)]
pub enum Handler {
    Request(Arc<dyn RequestHandler>),
    Error(Arc<dyn ErrorHandler>),
}

impl Handler {
    pub fn request<H: RequestHandler + 'static>(handler: H) -> Self {
        Handler::Request(Arc::new(handler))
    }

    pub fn error<H: ErrorHandler + 'static>(handler: H) -> Self {
        Handler::Error(Arc::new(handler))
    }

    #[inline]
    pub fn is_error_handler(&self) -> bool {
        matches!(self, Handler::Error(_))
    }

    /// Offers the request to this handler.
    ///
    /// A request handler offered a pending error hands it back untouched, an error handler
    /// offered no error is skipped. Panics are caught and become [`PanicError`]s.
    pub(crate) async fn call(&self, pending: Option<BoxError>, req: &mut Request, res: &mut Response) -> HandlerResult {
        match (self, pending) {
            (Handler::Request(handler), None) => guard(handler.invoke(req, res)).await,
            (Handler::Request(_), Some(error)) => Err(error),
            (Handler::Error(handler), Some(error)) => guard(handler.invoke(error, req, res)).await,
            (Handler::Error(_), None) => Ok(Flow::Next),
        }
    }
}

async fn guard(invocation: BoxFuture<'_, HandlerResult>) -> HandlerResult {
    match AssertUnwindSafe(invocation).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let panic = PanicError::from_payload(payload.as_ref());
            error!(cause = %panic, "handler panicked, converting the panic into an error");
            Err(Box::new(panic))
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Request(_) => f.write_str("Handler::Request"),
            Handler::Error(_) => f.write_str("Handler::Error"),
        }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

impl<F> fmt::Debug for FnErrorHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnErrorHandler")
    }
}

impl<F> From<FnHandler<F>> for Handler
where
    FnHandler<F>: RequestHandler + 'static,
{
    fn from(handler: FnHandler<F>) -> Self {
        Handler::request(handler)
    }
}

impl<F> From<FnErrorHandler<F>> for Handler
where
    FnErrorHandler<F>: ErrorHandler + 'static,
{
    fn from(handler: FnErrorHandler<F>) -> Self {
        Handler::error(handler)
    }
}

/// One or more handlers registered together on a single route.
///
/// `router.get("/x", [a, b])` appends both handlers to one route, so a [`next_route`] from `a`
/// skips `b`. Registering them with two `get` calls creates two routes instead.
pub trait IntoHandlers {
    fn into_handlers(self) -> Vec<Handler>;
}

impl IntoHandlers for Handler {
    fn into_handlers(self) -> Vec<Handler> {
        vec![self]
    }
}

impl<F> IntoHandlers for FnHandler<F>
where
    FnHandler<F>: RequestHandler + 'static,
{
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::request(self)]
    }
}

impl<F> IntoHandlers for FnErrorHandler<F>
where
    FnErrorHandler<F>: ErrorHandler + 'static,
{
    fn into_handlers(self) -> Vec<Handler> {
        vec![Handler::error(self)]
    }
}

impl IntoHandlers for Vec<Handler> {
    fn into_handlers(self) -> Vec<Handler> {
        self
    }
}

impl<const N: usize> IntoHandlers for [Handler; N] {
    fn into_handlers(self) -> Vec<Handler> {
        Vec::from(self)
    }
}

//! The dispatch loop of a router.
//!
//! Every request entering a router gets its own [`DispatchContext`]: a snapshot of the stack, a
//! cursor, the pending error and the request location to restore when it leaves. Handlers never
//! drive the loop themselves, they return a [`Flow`] (or an error) and the loop decides which
//! layer runs next, so a handler can not continue the chain twice.

use super::Router;
use crate::error::BoxError;
use crate::handler::{Flow, HandlerResult};
use crate::layer::{Layer, LayerKind, LayerMatch};
use crate::params::Params;
use crate::route::RouteOutcome;
use crate::{Request, Response};
use futures::future::BoxFuture;
use http::{HeaderValue, Method, header};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

/// How a request left a router.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// a handler finalized the response or reported the request as done
    Handled,
    /// no layer finalized the response; the parent continues with the error, if any
    Fallthrough(Option<BoxError>),
    /// the client went away, nothing else runs
    Abandoned,
}

impl Router {
    /// Dispatches the request through this router's stack.
    pub(crate) fn handle<'a>(&'a self, req: &'a mut Request, res: &'a mut Response) -> BoxFuture<'a, Outcome> {
        Box::pin(async move {
            let mut context = DispatchContext::enter(self, req);
            let outcome = context.walk(req, res).await;
            context.leave(req);
            outcome
        })
    }
}

struct DispatchContext {
    stack: Arc<Vec<Arc<Layer>>>,
    merge_params: bool,
    cursor: usize,
    pending: Option<BoxError>,
    parent_params: Params,
    base_url: String,
    path: String,
    allowed: Vec<Method>,
}

struct Matched {
    layer: Arc<Layer>,
    params: Params,
    consumed: usize,
}

impl DispatchContext {
    fn enter(router: &Router, req: &Request) -> Self {
        trace!(router = %router.id(), path = req.path(), "entering router");
        Self {
            stack: router.inner.stack.load_full(),
            merge_params: router.inner.options.merge_params,
            cursor: 0,
            pending: None,
            parent_params: req.params().clone(),
            base_url: req.base_url().to_owned(),
            path: req.path().to_owned(),
            allowed: Vec::new(),
        }
    }

    async fn walk(&mut self, req: &mut Request, res: &mut Response) -> Outcome {
        loop {
            if res.is_abandoned() {
                debug!(path = %self.path, "client abandoned the request, stop dispatching");
                return Outcome::Abandoned;
            }

            // every layer sees the location the request had when it entered this router
            req.restore_location(&self.base_url, &self.path);

            let Some(Matched { layer, params, consumed }) = self.seek(req.method()) else {
                return self.exhausted(req, res);
            };

            let params = if self.merge_params { params.merged_over(&self.parent_params) } else { params };
            req.replace_params(params);

            match layer.kind() {
                LayerKind::Middleware(handler) => {
                    req.trim_prefix(consumed);
                    let result = handler.call(self.pending.take(), req, res).await;
                    if let Some(outcome) = self.settle(result, res, layer.pattern()) {
                        return outcome;
                    }
                }
                LayerKind::Route(route) => match route.dispatch(req, res).await {
                    RouteOutcome::Continue(error) => self.pending = error,
                    RouteOutcome::ExitRouter => return Outcome::Fallthrough(None),
                    RouteOutcome::Done => return handled(res),
                },
                LayerKind::Mount(router) => {
                    req.trim_prefix(consumed);
                    match router.handle(req, res).await {
                        Outcome::Fallthrough(error) => self.pending = error,
                        outcome => return outcome,
                    }
                }
            }
        }
    }

    /// Advances the cursor to the next layer which should run.
    fn seek(&mut self, method: &Method) -> Option<Matched> {
        while let Some(layer) = self.stack.get(self.cursor).cloned() {
            self.cursor += 1;

            let (params, consumed) = match layer.try_match(&self.path) {
                None => continue,
                Some(LayerMatch::Malformed(e)) => {
                    debug!(pattern = layer.pattern(), cause = %e, "path matched but a parameter is malformed");
                    if self.pending.is_none() {
                        self.pending = Some(Box::new(e));
                    }
                    continue;
                }
                Some(LayerMatch::Matched { params, consumed }) => (params, consumed),
            };

            let runs = match layer.kind() {
                LayerKind::Route(route) if self.pending.is_none() => {
                    let handles = route.handles_method(method);
                    if !handles && method == Method::OPTIONS {
                        for allowed in route.allowed_methods() {
                            if !self.allowed.contains(&allowed) {
                                self.allowed.push(allowed);
                            }
                        }
                    }
                    handles
                }
                LayerKind::Route(_) => false,
                LayerKind::Middleware(handler) => handler.is_error_handler() == self.pending.is_some(),
                LayerKind::Mount(_) => self.pending.is_none(),
            };

            if runs {
                trace!(pattern = layer.pattern(), layer = ?layer, "layer matched");
                return Some(Matched { layer, params, consumed });
            }
        }
        None
    }

    /// Maps the result of a middleware call to the next step, `None` continues the loop.
    fn settle(&mut self, result: HandlerResult, res: &Response, pattern: &str) -> Option<Outcome> {
        if res.is_abandoned() {
            return Some(Outcome::Abandoned);
        }
        if res.is_finished() {
            report_after_finish(&result, pattern);
            return Some(Outcome::Handled);
        }

        match result {
            Ok(Flow::Next | Flow::NextRoute) => None,
            Ok(Flow::NextRouter) => Some(Outcome::Fallthrough(None)),
            Ok(Flow::Done) => Some(Outcome::Handled),
            Err(e) => {
                self.pending = Some(e);
                None
            }
        }
    }

    /// No layer is left: answer `OPTIONS` or fall through to the parent.
    fn exhausted(&mut self, req: &Request, res: &mut Response) -> Outcome {
        if req.method() == Method::OPTIONS && self.pending.is_none() && !self.allowed.is_empty() {
            let allow = self.allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(",");
            return match respond_options(res, allow) {
                Ok(()) => Outcome::Handled,
                Err(e) => Outcome::Fallthrough(Some(e)),
            };
        }
        Outcome::Fallthrough(self.pending.take())
    }

    fn leave(self, req: &mut Request) {
        req.restore_location(&self.base_url, &self.path);
        req.replace_params(self.parent_params);
    }
}

fn handled(res: &Response) -> Outcome {
    if res.is_abandoned() { Outcome::Abandoned } else { Outcome::Handled }
}

fn respond_options(res: &mut Response, allow: String) -> Result<(), BoxError> {
    let value = HeaderValue::try_from(allow.as_str())?;
    res.set(header::ALLOW, value)?.content_type(&mime::TEXT_PLAIN_UTF_8)?;
    res.send(allow)?;
    Ok(())
}

/// Logs a handler result which arrived after the handler finalized the response.
pub(crate) fn report_after_finish(result: &HandlerResult, pattern: &str) {
    match result {
        Ok(Flow::Done) => {}
        Ok(flow) => warn!(pattern, ?flow, "handler finalized the response and asked to continue, dispatch stops here"),
        Err(e) => error!(pattern, cause = %e, "handler failed after finalizing the response"),
    }
}

use crate::error::HttpError;
use crate::handler::Handler;
use crate::params::Params;
use crate::path::PathMatcher;
use crate::route::Route;
use crate::router::Router;
use std::fmt;

/// One entry of a router's stack: a compiled path plus what runs when it matches.
pub(crate) struct Layer {
    matcher: PathMatcher,
    kind: LayerKind,
}

pub(crate) enum LayerKind {
    /// a handler matched by path prefix
    Middleware(Handler),
    /// a child router matched by path prefix
    Mount(Router),
    /// a route matched by the whole path
    Route(Route),
}

pub(crate) enum LayerMatch {
    Matched { params: Params, consumed: usize },
    /// the path matched but a parameter could not be decoded
    Malformed(HttpError),
}

impl Layer {
    pub(crate) fn new(matcher: PathMatcher, kind: LayerKind) -> Self {
        Self { matcher, kind }
    }

    pub(crate) fn pattern(&self) -> &str {
        self.matcher.pattern()
    }

    pub(crate) fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub(crate) fn try_match(&self, path: &str) -> Option<LayerMatch> {
        let matched = self.matcher.test(path)?;
        Some(match matched.decode() {
            Ok(params) => LayerMatch::Matched { params, consumed: matched.consumed() },
            Err(e) => LayerMatch::Malformed(e),
        })
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            LayerKind::Middleware(handler) if handler.is_error_handler() => "error middleware",
            LayerKind::Middleware(_) => "middleware",
            LayerKind::Mount(_) => "mount",
            LayerKind::Route(_) => "route",
        };
        f.debug_struct("Layer").field("pattern", &self.pattern()).field("kind", &kind).finish()
    }
}

//! The request side of a dispatch.
//!
//! A [`Request`] is created once per incoming request by the [`Application`](crate::Application)
//! and is threaded through every layer. While it walks into mounted routers, the matched mount
//! prefix moves from [`Request::path`] to [`Request::base_url`], so handlers inside a mount
//! always see paths relative to their mount point.

use crate::app::AppState;
use crate::error::HttpError;
use crate::params::Params;
use bytes::Bytes;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri, Version};
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

pub struct Request {
    head: Parts,
    original_url: String,
    base_url: String,
    path: String,
    params: Params,
    body: Bytes,
    app: Arc<AppState>,
}

impl Request {
    pub(crate) fn from_http<B: Into<Bytes>>(request: http::Request<B>, app: Arc<AppState>) -> Self {
        let (head, body) = request.into_parts();

        let path = match head.uri.path() {
            "" => "/".to_owned(),
            path => path.to_owned(),
        };
        let original_url = head.uri.path_and_query().map_or_else(|| path.clone(), |pq| pq.as_str().to_owned());

        Self { head, original_url, base_url: String::new(), path, params: Params::empty(), body: body.into(), app }
    }

    /// Returns the HTTP method of the request
    pub fn method(&self) -> &Method {
        &self.head.method
    }

    /// Returns the URI of the request as received
    pub fn uri(&self) -> &Uri {
        &self.head.uri
    }

    /// Returns the HTTP version of the request
    pub fn version(&self) -> Version {
        self.head.version
    }

    /// Returns the HTTP headers of the request
    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    /// Returns a header value if it is present and valid visible ASCII
    pub fn header(&self, name: impl http::header::AsHeaderName) -> Option<&str> {
        self.head.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// The path and query as received, unaffected by mounts
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// The path prefix consumed by the enclosing mounts, empty at the root
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The path relative to the current mount point, always starting with `/`
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The raw query string, without the leading `?`
    pub fn query_string(&self) -> Option<&str> {
        self.head.uri.query()
    }

    /// Deserializes the query string, a missing query string deserializes as an empty one.
    pub fn query<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        let query = self.query_string().unwrap_or_default();
        serde_qs::from_str::<T>(query).map_err(|e| HttpError::bad_request(format!("invalid query string: {e}")))
    }

    /// Path parameters bound by the layer currently handling the request
    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: impl AsRef<str>) -> Option<&str> {
        self.params.get(name)
    }

    /// The raw request body
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Opaque request data, body parsing middleware stores parsed bodies here
    pub fn extensions(&self) -> &Extensions {
        &self.head.extensions
    }

    pub fn extensions_mut(&mut self) -> &mut Extensions {
        &mut self.head.extensions
    }

    /// Application wide settings and locals
    pub fn app(&self) -> &AppState {
        &self.app
    }

    pub(crate) fn replace_params(&mut self, params: Params) -> Params {
        std::mem::replace(&mut self.params, params)
    }

    /// Moves the first `consumed` bytes of the path to the base url.
    pub(crate) fn trim_prefix(&mut self, consumed: usize) {
        if consumed == 0 {
            return;
        }

        let (removed, rest) = self.path.split_at(consumed);
        self.base_url.push_str(removed.strip_suffix('/').unwrap_or(removed));
        self.path = if rest.starts_with('/') { rest.to_owned() } else { format!("/{rest}") };
    }

    pub(crate) fn restore_location(&mut self, base_url: &str, path: &str) {
        if self.base_url != base_url {
            base_url.clone_into(&mut self.base_url);
        }
        if self.path != path {
            path.clone_into(&mut self.path);
        }
    }

    #[cfg(test)]
    pub(crate) fn for_test(method: &str, uri: &str) -> Self {
        let request = http::Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(uri)
            .body(Bytes::new())
            .unwrap();
        Self::from_http(request, Arc::new(AppState::default()))
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", self.method())
            .field("original_url", &self.original_url)
            .field("base_url", &self.base_url)
            .field("path", &self.path)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

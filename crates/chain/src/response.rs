//! The response side of a dispatch.
//!
//! A [`Response`] can be finalized exactly once. Every finalizing operation ([`Response::send`],
//! [`Response::json`], [`Response::redirect`], [`Response::end`] ...) fails with
//! [`ResponseError::AlreadyFinalized`] when the response was finalized before, and header
//! mutations after finalization fail with [`ResponseError::HeadersSent`].
//!
//! When the client abandoned the request the response still accepts writes, but they are
//! silently dropped.

use crate::app::AppState;
use crate::error::ResponseError;
use crate::view;
use bytes::Bytes;
use http::header::{self, AsHeaderName};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use mime::Mime;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::app::settings::keys;

/// Indentation of `json spaces` is capped at this many spaces.
const MAX_JSON_SPACES: usize = 10;

pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    finished: bool,
    locals: Map<String, Value>,
    app: Arc<AppState>,
    cancellation: CancellationToken,
    head_request: bool,
}

impl Response {
    pub(crate) fn new(app: Arc<AppState>, cancellation: CancellationToken, head_request: bool) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::with_capacity(8),
            body: Bytes::new(),
            finished: false,
            locals: Map::new(),
            app,
            cancellation,
            head_request,
        }
    }

    /// Sets the status code. Ignored once the response is finalized.
    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        if self.finished {
            warn!(%status, "status change ignored, the response has already been finalized");
            return self;
        }
        self.status = status;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Sets a header, replacing any previous value with the same name.
    pub fn set<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, ResponseError>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: fmt::Display,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: fmt::Display,
    {
        let (name, value) = header_pair(name, value)?;
        if self.finished {
            return Err(ResponseError::HeadersSent);
        }
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Appends a header value, keeping previous values with the same name.
    pub fn append<K, V>(&mut self, name: K, value: V) -> Result<&mut Self, ResponseError>
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: fmt::Display,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: fmt::Display,
    {
        let (name, value) = header_pair(name, value)?;
        if self.finished {
            return Err(ResponseError::HeadersSent);
        }
        self.headers.append(name, value);
        Ok(self)
    }

    pub fn header(&self, name: impl AsHeaderName) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&mut self, mime: &Mime) -> Result<&mut Self, ResponseError> {
        self.set(header::CONTENT_TYPE, mime.as_ref())
    }

    /// Finalizes with a text body, `text/html; charset=utf-8` unless a content type was set.
    pub fn send(&mut self, body: impl Into<String>) -> Result<(), ResponseError> {
        self.finish(Bytes::from(body.into()), Some(&mime::TEXT_HTML_UTF_8))
    }

    /// Finalizes with a binary body, `application/octet-stream` unless a content type was set.
    pub fn send_bytes(&mut self, body: impl Into<Bytes>) -> Result<(), ResponseError> {
        self.finish(body.into(), Some(&mime::APPLICATION_OCTET_STREAM))
    }

    /// Finalizes with `value` serialized as JSON, indented by the `json spaces` setting.
    pub fn json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), ResponseError> {
        if !self.writable()? {
            return Ok(());
        }

        let spaces = self
            .app
            .settings()
            .get(keys::JSON_SPACES)
            .and_then(|spaces| spaces.as_u64())
            .map_or(0, |spaces| usize::try_from(spaces).unwrap_or(MAX_JSON_SPACES).min(MAX_JSON_SPACES));
        let body = if spaces == 0 {
            serde_json::to_vec(value)?
        } else {
            let indent = " ".repeat(spaces);
            let mut buf = Vec::with_capacity(128);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
            value.serialize(&mut serializer)?;
            buf
        };

        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        }
        self.finish(Bytes::from(body), None)
    }

    /// Sets the status and finalizes with its reason phrase as a plain text body.
    pub fn send_status(&mut self, status: StatusCode) -> Result<(), ResponseError> {
        if !self.writable()? {
            return Ok(());
        }
        self.status = status;
        let reason = status.canonical_reason().map_or_else(|| status.as_str().to_owned(), str::to_owned);
        self.finish(Bytes::from(reason), Some(&mime::TEXT_PLAIN_UTF_8))
    }

    /// Redirects with `302 Found`.
    pub fn redirect(&mut self, location: &str) -> Result<(), ResponseError> {
        self.redirect_with(StatusCode::FOUND, location)
    }

    pub fn redirect_with(&mut self, status: StatusCode, location: &str) -> Result<(), ResponseError> {
        if !self.writable()? {
            return Ok(());
        }
        let value = HeaderValue::try_from(location).map_err(ResponseError::invalid_header)?;
        self.status = status;
        self.headers.insert(header::LOCATION, value);
        let reason = status.canonical_reason().unwrap_or("Redirecting");
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
        self.finish(Bytes::from(format!("{reason}. Redirecting to {location}")), None)
    }

    /// Finalizes without a body.
    pub fn end(&mut self) -> Result<(), ResponseError> {
        self.finish(Bytes::new(), None)
    }

    /// Renders a view and sends it as HTML.
    ///
    /// The view sees the application locals, overridden by the response locals, overridden by
    /// `locals`.
    pub fn render(&mut self, name: &str, locals: Map<String, Value>) -> Result<(), ResponseError> {
        if !self.writable()? {
            return Ok(());
        }

        let mut merged = Map::clone(&self.app.locals().snapshot());
        merged.extend(self.locals.clone());
        merged.extend(locals);

        let html = view::render(&self.app, name, &merged)?;
        self.send(html)
    }

    /// Sends a file, the content type is derived from the file extension.
    pub async fn send_file(&mut self, path: impl AsRef<Path>) -> Result<(), ResponseError> {
        if !self.writable()? {
            return Ok(());
        }

        let path = path.as_ref();
        let content =
            tokio::fs::read(path).await.map_err(|source| ResponseError::File { path: path.to_path_buf(), source })?;

        if !self.headers.contains_key(header::CONTENT_TYPE) {
            self.headers.insert(header::CONTENT_TYPE, content_type_of(path)?);
        }
        self.finish(Bytes::from(content), None)
    }

    /// Whether a finalizing operation already ran
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether the client went away
    pub fn is_abandoned(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Values visible to views rendered for this response only
    pub fn locals(&self) -> &Map<String, Value> {
        &self.locals
    }

    pub fn locals_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.locals
    }

    pub fn app(&self) -> &AppState {
        &self.app
    }

    pub(crate) fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub(crate) fn write_final(&mut self, status: StatusCode, html: String) {
        if self.finished || self.is_abandoned() {
            return;
        }
        self.status = status;
        self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(html.len()));
        self.body = Bytes::from(html);
        self.finished = true;
    }

    pub(crate) fn into_http(self) -> http::Response<Bytes> {
        let body = if self.head_request { Bytes::new() } else { self.body };
        let mut response = http::Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }

    /// `Ok(false)` when the client is gone and the write must be dropped.
    fn writable(&self) -> Result<bool, ResponseError> {
        if self.is_abandoned() {
            debug!("client abandoned the request, dropping the write");
            return Ok(false);
        }
        if self.finished {
            error!(status = %self.status, "response has already been finalized");
            return Err(ResponseError::AlreadyFinalized);
        }
        Ok(true)
    }

    fn finish(&mut self, body: Bytes, default_type: Option<&Mime>) -> Result<(), ResponseError> {
        if !self.writable()? {
            return Ok(());
        }

        if let Some(mime) = default_type
            && !self.headers.contains_key(header::CONTENT_TYPE)
        {
            let value = HeaderValue::try_from(mime.as_ref()).map_err(ResponseError::invalid_header)?;
            self.headers.insert(header::CONTENT_TYPE, value);
        }
        self.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        self.body = body;
        self.finished = true;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn for_test() -> Self {
        Self::for_test_with(Arc::new(AppState::default()))
    }

    #[cfg(test)]
    pub(crate) fn for_test_with(app: Arc<AppState>) -> Self {
        Self::new(app, CancellationToken::new(), false)
    }

    #[cfg(test)]
    pub(crate) fn body(&self) -> &Bytes {
        &self.body
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

fn header_pair<K, V>(name: K, value: V) -> Result<(HeaderName, HeaderValue), ResponseError>
where
    HeaderName: TryFrom<K>,
    <HeaderName as TryFrom<K>>::Error: fmt::Display,
    HeaderValue: TryFrom<V>,
    <HeaderValue as TryFrom<V>>::Error: fmt::Display,
{
    let name = HeaderName::try_from(name).map_err(ResponseError::invalid_header)?;
    let value = HeaderValue::try_from(value).map_err(ResponseError::invalid_header)?;
    Ok((name, value))
}

/// The content type of a file, text types are sent as UTF-8.
fn content_type_of(path: &Path) -> Result<HeaderValue, ResponseError> {
    let guessed = mime_guess::from_path(path).first_or_octet_stream();
    let value = if guessed.type_() == mime::TEXT && guessed.get_param(mime::CHARSET).is_none() {
        HeaderValue::try_from(format!("{guessed}; charset=utf-8"))
    } else {
        HeaderValue::try_from(guessed.as_ref())
    };
    value.map_err(ResponseError::invalid_header)
}

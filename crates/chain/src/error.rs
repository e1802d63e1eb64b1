//! Error types of the dispatch engine.
//!
//! Errors fall into two families:
//! - configuration errors ([`ConfigError`]) which are raised while routes are registered and
//!   never reach request time
//! - request time errors, which travel through the dispatch chain as [`BoxError`] values until
//!   an error handler consumes them or the application's terminal handler renders them

use http::StatusCode;
use std::any::Any;
use std::error::Error;
use std::path::PathBuf;
use thiserror::Error;

/// The error type carried through the dispatch chain.
///
/// Error handlers receive exactly the value a handler returned, so callers may
/// `downcast_ref` to their own error types.
pub type BoxError = Box<dyn Error + Send + Sync>;

/// Raised at registration time, before any request is served.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("duplicate parameter name '{name}' in route pattern '{pattern}'")]
    DuplicateParam { pattern: String, name: String },

    #[error("invalid constraint for parameter '{name}' in route pattern '{pattern}': {source}")]
    InvalidConstraint {
        pattern: String,
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("no handler given for route pattern '{pattern}'")]
    NoHandlers { pattern: String },

    #[error("router {child} can't be mounted into router {parent}: it would be mounted inside its own subtree")]
    CyclicMount { parent: u64, child: u64 },

    #[error("invalid settings document: {source}")]
    InvalidSettings {
        #[from]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn invalid_pattern<P: ToString, R: ToString>(pattern: P, reason: R) -> Self {
        Self::InvalidPattern { pattern: pattern.to_string(), reason: reason.to_string() }
    }

    pub fn duplicate_param<P: ToString, N: ToString>(pattern: P, name: N) -> Self {
        Self::DuplicateParam { pattern: pattern.to_string(), name: name.to_string() }
    }
}

/// An error which knows the response status it should produce.
///
/// The terminal error handler uses [`HttpError::status`] when it is a client or server error
/// status, and falls back to `500 Internal Server Error` for everything else.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new<M: ToString>(status: StatusCode, message: M) -> Self {
        Self { status, message: message.to_string() }
    }

    pub fn bad_request<M: ToString>(message: M) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found<M: ToString>(message: M) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A handler panicked; the panic payload is kept as text.
#[derive(Error, Debug, Clone)]
#[error("handler panicked: {message}")]
pub struct PanicError {
    message: String,
}

impl PanicError {
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&'static str>()
            .map(|s| (*s).to_owned())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_owned());
        Self { message }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Failures while writing a [`Response`](crate::Response).
#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("response has already been finalized")]
    AlreadyFinalized,

    #[error("can't set headers after the response has been finalized")]
    HeadersSent,

    #[error("invalid header: {reason}")]
    InvalidHeader { reason: String },

    #[error("json serialize error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("can't read file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render error: {source}")]
    View {
        #[from]
        source: ViewError,
    },
}

impl ResponseError {
    pub fn invalid_header<S: ToString>(str: S) -> Self {
        Self::InvalidHeader { reason: str.to_string() }
    }
}

/// Failures while resolving or rendering a view.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error("no default engine was specified and no extension was provided for view '{name}'")]
    NoDefaultEngine { name: String },

    #[error("no view engine registered for extension '{ext}'")]
    EngineNotFound { ext: String },

    #[error("failed to render view {path:?}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

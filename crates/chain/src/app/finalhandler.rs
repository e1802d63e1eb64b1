//! The terminal handler of an application.
//!
//! Runs when a request falls out of the root router: without an error it answers `404`, with an
//! error it answers with the status carried by the error. It writes at most one response and
//! does nothing when the response was finalized already.

use crate::app::settings::keys;
use crate::error::{BoxError, HttpError, ResponseError};
use crate::{Request, Response};
use http::{HeaderValue, StatusCode, header};
use std::error::Error;
use std::io;
use tracing::{debug, error};

const CONTENT_SECURITY_POLICY: &str = "default-src 'none'";

pub(crate) fn not_found(req: &Request, res: &mut Response) {
    debug!(method = %req.method(), path = req.uri().path(), "no layer handled the request");
    let message = format!("Cannot {} {}", req.method(), req.uri().path());
    send(res, StatusCode::NOT_FOUND, &message);
}

pub(crate) fn unhandled_error(error: BoxError, req: &Request, res: &mut Response) {
    if res.is_finished() {
        error!(cause = %error, "error reached the application after the response was finalized");
        return;
    }

    let status = status_of(error.as_ref());
    let env = res.app().settings().get_str(keys::ENV).unwrap_or_default();
    if env != "test" {
        error!(cause = %error, %status, method = %req.method(), path = req.uri().path(), "unhandled error");
    }

    let message = if env == "production" {
        status.canonical_reason().unwrap_or("Error").to_owned()
    } else {
        describe(error.as_ref())
    };
    send(res, status, &message);
}

/// The status the error asks for, `500` unless it is a client or server error status.
fn status_of(error: &(dyn Error + Send + Sync + 'static)) -> StatusCode {
    if let Some(http_error) = error.downcast_ref::<HttpError>() {
        let status = http_error.status();
        if status.is_client_error() || status.is_server_error() {
            return status;
        }
    }
    if let Some(ResponseError::File { source, .. }) = error.downcast_ref::<ResponseError>()
        && source.kind() == io::ErrorKind::NotFound
    {
        return StatusCode::NOT_FOUND;
    }
    StatusCode::INTERNAL_SERVER_ERROR
}

/// The error followed by its chain of sources.
fn describe(error: &(dyn Error + Send + Sync + 'static)) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        description.push_str("\n    caused by: ");
        description.push_str(&cause.to_string());
        source = cause.source();
    }
    description
}

fn send(res: &mut Response, status: StatusCode, message: &str) {
    if res.is_finished() || res.is_abandoned() {
        return;
    }

    let headers = res.headers_mut();
    headers.remove(header::CONTENT_ENCODING);
    headers.remove(header::CONTENT_LANGUAGE);
    headers.remove(header::CONTENT_RANGE);
    headers.insert(header::CONTENT_SECURITY_POLICY, HeaderValue::from_static(CONTENT_SECURITY_POLICY));
    headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));

    res.write_final(status, html_document(message));
}

fn html_document(message: &str) -> String {
    let body = escape_html(message).replace('\n', "<br>");
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>Error</title>\n</head>\n<body>\n<pre>{body}</pre>\n</body>\n</html>\n"
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

//! Outgoing HTTP response type and the translation of handler outcomes into it.
//!
//! Handlers never build a [`Response`] themselves. They return an
//! [`Outcome`] and [`translate`] decides status, content type and body:
//!
//! | Outcome                          | Status        | Body                        |
//! |----------------------------------|---------------|-----------------------------|
//! | `Err(Rest(e))`                   | `e.code`      | `e` as JSON                 |
//! | `Err(Failure { message, .. })`   | 500           | message (+ trace)           |
//! | `Err(Failure)` with empty message| per policy    | nothing by default          |
//! | `Ok(Render(r))`                  | 200           | `r.content` as `r.content_type` |
//! | `Ok(Text(s))` / `Ok(Bytes(b))`   | 200           | verbatim                    |
//! | `Ok(Other(v))`                   | 200           | nothing by default          |

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use tracing::warn;

use crate::config::{Config, EmptyErrorPolicy, UnknownReplyPolicy};
use crate::error::BindError;
use crate::reply::{HandlerError, Outcome, Render, Reply, RestError};

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for use with [`Render::new`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,          // text/csv
    Html,         // text/html; charset=utf-8
    Json,         // application/json
    OctetStream,  // application/octet-stream
    Pdf,          // application/pdf
    Text,         // text/plain; charset=utf-8
    Xml,          // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv         => "text/csv",
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Pdf         => "application/pdf",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
#[derive(Debug)]
pub struct Response {
    pub(crate) status: StatusCode,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
}

impl Response {
    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { status: code, headers: HeaderMap::new(), body: Bytes::new() }
    }

    pub(crate) fn with_body(status: StatusCode, content_type: ContentType, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        Self { status, headers, body: body.into() }
    }

    pub(crate) fn text(status: StatusCode, body: impl Into<String>) -> Self {
        Self::with_body(status, ContentType::Text, body.into())
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut response = http::Response::new(Full::new(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

// ── Translation ───────────────────────────────────────────────────────────────

/// Turns a handler outcome into a response, applying `config.policy`.
pub fn translate(outcome: Outcome, config: &Config) -> Response {
    match outcome {
        Err(HandlerError::Rest(e)) => rest(&e),
        Err(err @ HandlerError::Failure { .. }) => failure(&err, config),
        Ok(reply) => success(reply, config),
    }
}

fn rest(e: &RestError) -> Response {
    let status = StatusCode::from_u16(e.code).unwrap_or_else(|_| {
        warn!(code = e.code, "rest error carries an invalid status code");
        StatusCode::INTERNAL_SERVER_ERROR
    });
    match serde_json::to_vec(e) {
        Ok(body) => Response::with_body(status, ContentType::Json, body),
        Err(err) => Response::text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
    }
}

fn failure(err: &HandlerError, config: &Config) -> Response {
    let mut body = err.to_string();
    if body.is_empty() {
        return match config.policy.empty_error {
            EmptyErrorPolicy::Silent => Response::status(StatusCode::OK),
            EmptyErrorPolicy::Internal => {
                Response::text(StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
    }
    if config.expose_traces {
        if let Some(trace) = err.trace() {
            body.push('\n');
            body.push_str(&trace.to_string());
        }
    }
    Response::text(StatusCode::INTERNAL_SERVER_ERROR, body)
}

fn success(reply: Reply, config: &Config) -> Response {
    match reply {
        Reply::Render(r) => render(r),
        Reply::Text(s) => Response::text(StatusCode::OK, s),
        Reply::Bytes(b) => Response::with_body(StatusCode::OK, ContentType::OctetStream, b),
        Reply::Other(value) => match config.policy.unknown_reply {
            UnknownReplyPolicy::Drop => Response::status(StatusCode::OK),
            UnknownReplyPolicy::Json => match serde_json::to_vec(&value) {
                Ok(body) => Response::with_body(StatusCode::OK, ContentType::Json, body),
                Err(err) => Response::text(StatusCode::INTERNAL_SERVER_ERROR, err.to_string()),
            },
        },
        Reply::Empty => Response::status(StatusCode::OK),
    }
}

fn render(r: Render) -> Response {
    let value = HeaderValue::from_str(&r.content_type).unwrap_or_else(|_| {
        warn!(content_type = %r.content_type, "invalid render content type");
        HeaderValue::from_static(ContentType::OctetStream.as_str())
    });
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, value);
    Response { status: StatusCode::OK, headers, body: r.content.into() }
}

/// The response for a request that never reached its handler.
///
/// A validation rule that fails with a [`RestError`] keeps control of the
/// response; everything else is a plain-text `400`.
pub(crate) fn bind_failure(err: BindError) -> Response {
    match err {
        BindError::Validation { source: HandlerError::Rest(e), .. } => rest(&e),
        err @ BindError::TooLarge { .. } => Response::text(StatusCode::PAYLOAD_TOO_LARGE, err.to_string()),
        other => Response::text(StatusCode::BAD_REQUEST, other.to_string()),
    }
}

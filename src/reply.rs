//! What handlers return.
//!
//! A handler produces an [`Outcome`]: either a [`Reply`] or a
//! [`HandlerError`]. Both are closed enums, matched exhaustively by the
//! response translator.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::response::ContentType;

/// The result of one handler invocation.
pub type Outcome = Result<Reply, HandlerError>;

// ── RestError ─────────────────────────────────────────────────────────────────

/// A structured error that dictates both the status code and the JSON body.
///
/// ```rust
/// use bindery::RestError;
///
/// let err = RestError::new(404, "not found");
/// assert_eq!(serde_json::to_string(&err).unwrap(), r#"{"code":404,"message":"not found"}"#);
/// ```
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[error("{message}")]
pub struct RestError {
    pub code: u16,
    pub message: String,
}

impl RestError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message)
    }
}

// ── Render ────────────────────────────────────────────────────────────────────

/// An explicit response envelope: the content type and bytes are written verbatim.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Render {
    pub(crate) content_type: String,
    pub(crate) content: Vec<u8>,
}

impl Render {
    pub fn new(content_type: ContentType, content: impl Into<Vec<u8>>) -> Self {
        Self::raw(content_type.as_str(), content)
    }

    /// Any content-type string. Values that are not valid header values fall
    /// back to `application/octet-stream` when written.
    pub fn raw(content_type: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self { content_type: content_type.into(), content: content.into() }
    }

    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(ContentType::Json, serde_json::to_vec(value)?))
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

// ── Reply ─────────────────────────────────────────────────────────────────────

/// A successful handler result.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Written with its own content type.
    Render(Render),
    /// Written as the raw body.
    Text(String),
    /// Written verbatim.
    Bytes(Vec<u8>),
    /// A value with no natural wire form. What happens to it is decided by
    /// [`UnknownReplyPolicy`](crate::UnknownReplyPolicy); by default nothing
    /// is written.
    Other(serde_json::Value),
    /// Nothing to write.
    Empty,
}

impl Reply {
    /// Wraps any serializable value as [`Reply::Other`].
    pub fn other<T: Serialize>(value: &T) -> Self {
        serde_json::to_value(value).map_or(Self::Empty, Self::Other)
    }
}

impl From<Render> for Reply {
    fn from(r: Render) -> Self { Self::Render(r) }
}

impl From<String> for Reply {
    fn from(s: String) -> Self { Self::Text(s) }
}

impl From<&'static str> for Reply {
    fn from(s: &'static str) -> Self { Self::Text(s.to_owned()) }
}

impl From<Vec<u8>> for Reply {
    fn from(b: Vec<u8>) -> Self { Self::Bytes(b) }
}

impl From<bytes::Bytes> for Reply {
    fn from(b: bytes::Bytes) -> Self { Self::Bytes(b.to_vec()) }
}

impl From<()> for Reply {
    fn from((): ()) -> Self { Self::Empty }
}

// ── HandlerError ──────────────────────────────────────────────────────────────

/// A failed handler result.
#[derive(Debug)]
pub enum HandlerError {
    /// Status and JSON body come from the error itself.
    Rest(RestError),
    /// Answered with `500` and the message as plain text. An empty message is
    /// a sentinel governed by [`EmptyErrorPolicy`](crate::EmptyErrorPolicy).
    Failure {
        message: String,
        trace: Option<Backtrace>,
    },
}

impl HandlerError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Failure { message: message.into(), trace: None }
    }

    /// Like [`message`](Self::message), also capturing the call stack.
    ///
    /// Capture follows `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE`; when disabled
    /// nothing is appended to the response.
    pub fn traced(message: impl Into<String>) -> Self {
        Self::Failure { message: message.into(), trace: Some(Backtrace::capture()) }
    }

    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::message(err.to_string())
    }

    /// The captured trace, if one was requested and the runtime produced one.
    pub fn trace(&self) -> Option<&Backtrace> {
        match self {
            Self::Failure { trace: Some(t), .. } if t.status() == BacktraceStatus::Captured => Some(t),
            _ => None,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest(e) => f.write_str(&e.message),
            Self::Failure { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for HandlerError {}

impl From<RestError> for HandlerError {
    fn from(e: RestError) -> Self { Self::Rest(e) }
}

impl From<String> for HandlerError {
    fn from(s: String) -> Self { Self::message(s) }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self { Self::message(s) }
}

impl From<std::convert::Infallible> for HandlerError {
    fn from(e: std::convert::Infallible) -> Self { match e {} }
}

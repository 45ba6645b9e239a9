//! Error types.
//!
//! Three layers fail independently:
//!
//! - [`SchemaError`] / [`BootError`] — found once, while booting. One broken
//!   route does not stop the others from registering, but the aggregate
//!   [`BootError`] keeps the server from accepting connections.
//! - [`BindError`] — per request; answered before the handler runs.
//! - [`Error`] — infrastructure: binding a port, accepting connections.

use thiserror::Error;

use crate::method::Method;
use crate::reply::HandlerError;
use crate::schema::SemanticType;
use crate::transport::Transport;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The error type returned by the server's fallible operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid listen address `{0}`")]
    Addr(String),
    #[error(transparent)]
    Boot(#[from] BootError),
    #[error("boot failed earlier; refusing to serve")]
    NotBooted,
}

/// A structural problem with an entity schema.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum SchemaError {
    #[error("entity `{entity}`: field `{field}` names unknown transport `{transport}`")]
    UnknownTransport {
        entity: &'static str,
        field: &'static str,
        transport: String,
    },
    #[error("entity `{entity}`: field `{field}` is declared more than once")]
    DuplicateField {
        entity: &'static str,
        field: &'static str,
    },
    #[error("entity `{entity}`: fields `{first}` and `{second}` both read `{key}` from {transport}")]
    DuplicateKey {
        entity: &'static str,
        first: &'static str,
        second: &'static str,
        key: String,
        transport: Transport,
    },
    #[error("entity `{entity}`: {kind} field `{field}` must read from form, not {transport}")]
    FileOutsideForm {
        entity: &'static str,
        field: &'static str,
        kind: SemanticType,
        transport: Transport,
    },
    #[error("entity `{entity}`: {kind} field `{field}` cannot read from form")]
    ScalarOnForm {
        entity: &'static str,
        field: &'static str,
        kind: SemanticType,
    },
    #[error("entity `{entity}`: validation rule targets unknown field `{field}`")]
    UnknownRuleField {
        entity: &'static str,
        field: String,
    },
}

/// One route rejected during boot.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("{method} {path}: {source}")]
    Schema {
        method: Method,
        path: String,
        #[source]
        source: SchemaError,
    },
    #[error("{method} {path}: {message}")]
    Conflict {
        method: Method,
        path: String,
        message: String,
    },
}

/// Every route rejected during one boot pass.
#[derive(Debug, Error)]
#[error("boot failed: {} route(s) rejected", failures.len())]
pub struct BootError {
    pub failures: Vec<RouteError>,
}

/// Why a request could not be bound to its entity.
#[derive(Debug, Error)]
pub enum BindError {
    #[error("Data: {key} is required but not found inside {transport}.")]
    Required { key: String, transport: Transport },
    #[error("malformed json body: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] multer::Error),
    #[error("failed to read request body: {0}")]
    Body(#[source] BoxError),
    #[error("request body exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("{source}")]
    Validation {
        field: String,
        #[source]
        source: HandlerError,
    },
    #[error("cannot read `{value}` as {kind} for field `{field}`")]
    Coercion {
        field: &'static str,
        kind: SemanticType,
        value: String,
    },
}

//! # bindery
//!
//! Schema-driven request binding for HTTP services.
//!
//! A handler declares the entity it wants; bindery fills it from the request
//! before the handler runs and turns whatever the handler returns into the
//! response.
//!
//! ## The contract
//!
//! Every field of an entity names where its value lives:
//!
//! - **query**: the URL query string (the default)
//! - **body**: a JSON object, url-encoded form or multipart text field
//! - **form**: uploaded multipart files
//! - **param**: a path parameter of the matched route
//!
//! Schemas are checked once at boot. A server with one broken schema never
//! accepts a connection, and the boot error lists every broken route at once.
//!
//! What's left for the handler is the only part that changes between
//! applications: take a typed entity, return a typed result.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bindery::{Config, Entity, RestError, Route, Router, Schema, Server};
//!
//! #[derive(Default)]
//! struct SignUp {
//!     name: String,
//!     age: i64,
//! }
//!
//! impl Entity for SignUp {
//!     fn schema() -> Schema<Self> {
//!         Schema::<Self>::new()
//!             .string("Name", "name|body!", |e, v| e.name = v)
//!             .int("Age", "", |e, v| e.age = v)
//!     }
//! }
//!
//! async fn sign_up(e: SignUp) -> Result<String, RestError> {
//!     if e.age < 0 {
//!         return Err(RestError::bad_request("age must not be negative"));
//!     }
//!     Ok(format!("welcome, {}", e.name))
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let api = Router::new("/api").route(Route::post("/sign-up", sign_up));
//!
//!     Server::new(Config::default()).mount(api).serve().await.unwrap();
//! }
//! ```

mod bind;
mod config;
mod error;
mod handler;
mod method;
mod reply;
mod request;
mod response;
mod router;
mod schema;
mod server;
mod transport;

pub mod meta;

pub use bind::{AcceptAll, Binder, Checker, RawValue, Rules, Slot};
pub use config::{
    CoercionPolicy, Config, ConfigError, DEFAULT_MULTIPART_LIMIT, EmptyErrorPolicy, Policy,
    UnknownReplyPolicy,
};
pub use error::{BindError, BootError, Error, RouteError, SchemaError};
pub use handler::Handler;
pub use method::Method;
pub use reply::{HandlerError, Outcome, Render, Reply, RestError};
pub use request::Request;
pub use response::{ContentType, Response, translate};
pub use router::{Route, Router, mount_path};
pub use schema::{Entity, FieldDescriptor, File, Schema, SemanticType};
pub use server::{BootState, Server};
pub use transport::{Extracted, FilePart, Transport, extract};

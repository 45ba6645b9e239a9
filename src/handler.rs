//! Handler trait and type erasure.
//!
//! # How typed handlers are stored
//!
//! Every route has its own entity type, yet the route table holds all of them
//! uniformly. The entity type is erased together with its compiled binder:
//!
//! ```text
//! async fn sign_up(e: SignUp) -> Result<String, RestError>   ← user writes this
//!        ↓ Route::new(Method::Post, "/sign-up").handle(sign_up)
//! Typed { binder: Binder::<SignUp>::new(), handler: sign_up } ← schema compiled once
//!        ↓  stored as Arc<dyn Endpoint>
//! endpoint.call(req, rules, shared)  at request time           ← one vtable dispatch
//!        ↓
//! bind → sign_up(entity).await → translate                   ← BoxFuture<Response>
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::debug;

use crate::bind::{Binder, Checker, Rules};
use crate::config::Config;
use crate::error::SchemaError;
use crate::reply::{HandlerError, Outcome, Reply};
use crate::request::Request;
use crate::response::{self, Response};
use crate::schema::Entity;

// ── Internal types ────────────────────────────────────────────────────────────

/// A heap-allocated, type-erased future.
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Immutable state shared by every request once the server has booted.
pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) checker: Arc<dyn Checker>,
}

/// A route's entity binder and handler with the entity type erased.
pub(crate) trait Endpoint: Send + Sync + 'static {
    /// Structural check run at boot: the schema compiled and every rule
    /// names a declared field.
    fn check(&self, rules: &Rules) -> Result<(), SchemaError>;

    fn call(&self, req: Request, rules: Arc<Rules>, shared: Arc<Shared>) -> BoxFuture<Response>;
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is automatically satisfied for any
/// `async fn` with the signature:
///
/// ```text
/// async fn name(entity: E) -> Result<impl Into<Reply>, impl Into<HandlerError>>
/// ```
///
/// where `E` is an [`Entity`] (use `()` when the route binds nothing).
///
/// The trait is **sealed**: only the blanket impl below can satisfy it.
pub trait Handler<E>: private::Sealed<E> + Send + Sync + 'static {
    #[doc(hidden)]
    fn invoke(&self, entity: E) -> BoxFuture<Outcome>;
}

mod private {
    pub trait Sealed<E> {}
}

impl<F, Fut, E, R, Er> private::Sealed<E> for F
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Er>> + Send + 'static,
    R: Into<Reply>,
    Er: Into<HandlerError>,
{
}

impl<F, Fut, E, R, Er> Handler<E> for F
where
    F: Fn(E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, Er>> + Send + 'static,
    R: Into<Reply>,
    Er: Into<HandlerError>,
{
    fn invoke(&self, entity: E) -> BoxFuture<Outcome> {
        let fut = self(entity);
        Box::pin(async move { fut.await.map(Into::into).map_err(Into::into) })
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Holds a handler for entity `E` and the binder compiled from `E::schema()`.
pub(crate) struct Typed<E, H> {
    binder: Result<Arc<Binder<E>>, SchemaError>,
    handler: Arc<H>,
}

impl<E: Entity, H: Handler<E>> Typed<E, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self { binder: Binder::new().map(Arc::new), handler: Arc::new(handler) }
    }
}

impl<E: Entity, H: Handler<E>> Endpoint for Typed<E, H> {
    fn check(&self, rules: &Rules) -> Result<(), SchemaError> {
        match &self.binder {
            Ok(binder) => binder.check_rules(rules),
            Err(e) => Err(e.clone()),
        }
    }

    fn call(&self, req: Request, rules: Arc<Rules>, shared: Arc<Shared>) -> BoxFuture<Response> {
        let binder = match &self.binder {
            Ok(binder) => Arc::clone(binder),
            // Boot refuses to register these; reaching here means a caller
            // skipped boot.
            Err(e) => {
                let message = e.to_string();
                return Box::pin(async move {
                    response::translate(Err(HandlerError::message(message)), &Config::default())
                });
            }
        };
        let handler = Arc::clone(&self.handler);

        Box::pin(async move {
            let entity = match binder.bind(&req, &rules, shared.checker.as_ref(), &shared.config).await {
                Ok(entity) => entity,
                Err(err) => {
                    debug!(entity = binder.entity_name(), path = req.path(), error = %err, "binding failed");
                    return response::bind_failure(err);
                }
            };
            let outcome = handler.invoke(entity).await;
            response::translate(outcome, &shared.config)
        })
    }
}

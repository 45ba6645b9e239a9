//! Route registration and the radix-tree route table.
//!
//! A [`Router`] groups [`Route`]s under a base path. Nothing is validated at
//! registration time; [`Server::boot`](crate::Server::boot) walks every router,
//! checks each route and builds the table — one radix tree per HTTP method,
//! O(path-length) lookup.

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;

use crate::bind::Rules;
use crate::handler::{Endpoint, Handler, Typed};
use crate::method::Method;
use crate::schema::Entity;

// ── Registration ──────────────────────────────────────────────────────────────

/// One (method, path) pair, its handler and its entity schema.
///
/// The entity type is taken from the handler's argument:
///
/// ```rust
/// use bindery::{Entity, Method, RestError, Route, Schema};
///
/// #[derive(Default)]
/// struct Lookup { id: String }
///
/// impl Entity for Lookup {
///     fn schema() -> Schema<Self> {
///         Schema::<Self>::new().string("Id", "|param!", |e, v| e.id = v)
///     }
/// }
///
/// async fn find(e: Lookup) -> Result<String, RestError> {
///     Ok(format!("user {}", e.id))
/// }
///
/// let route = Route::new(Method::Get, "/users/{id}").handle(find);
/// ```
pub struct Route {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) endpoint: Option<Arc<dyn Endpoint>>,
    pub(crate) rules: Rules,
}

impl Route {
    /// A route without a handler. It is skipped at boot until
    /// [`handle`](Self::handle) assigns one.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), endpoint: None, rules: Rules::new() }
    }

    pub fn get<E: Entity>(path: impl Into<String>, handler: impl Handler<E>) -> Self {
        Self::new(Method::Get, path).handle(handler)
    }

    pub fn post<E: Entity>(path: impl Into<String>, handler: impl Handler<E>) -> Self {
        Self::new(Method::Post, path).handle(handler)
    }

    pub fn put<E: Entity>(path: impl Into<String>, handler: impl Handler<E>) -> Self {
        Self::new(Method::Put, path).handle(handler)
    }

    pub fn patch<E: Entity>(path: impl Into<String>, handler: impl Handler<E>) -> Self {
        Self::new(Method::Patch, path).handle(handler)
    }

    pub fn delete<E: Entity>(path: impl Into<String>, handler: impl Handler<E>) -> Self {
        Self::new(Method::Delete, path).handle(handler)
    }

    /// Assigns the handler; its argument type is the route's entity.
    pub fn handle<E: Entity, H: Handler<E>>(mut self, handler: H) -> Self {
        self.endpoint = Some(Arc::new(Typed::<E, H>::new(handler)));
        self
    }

    /// Declares a validation rule for the entity field `field`.
    pub fn rule(mut self, field: impl Into<String>, rule: impl Into<String>) -> Self {
        self.rules.insert(field.into(), rule.into());
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// An ordered group of routes mounted under a common base path.
pub struct Router {
    pub(crate) base_path: String,
    pub(crate) routes: Vec<Route>,
}

impl Router {
    pub fn new(base_path: impl Into<String>) -> Self {
        Self { base_path: base_path.into(), routes: Vec::new() }
    }

    /// Appends a route. Returns `self` for chaining.
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Shorthand for `route(Route::new(method, path).handle(handler))`.
    pub fn on<E: Entity>(self, method: Method, path: &str, handler: impl Handler<E>) -> Self {
        self.route(Route::new(method, path).handle(handler))
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

impl Default for Router {
    fn default() -> Self { Self::new("") }
}

/// Joins a router's base path and a route path into the mounted path.
///
/// Slashes are normalized (one leading, none trailing, no empty segments) and
/// `:name` / `*name` segments are rewritten to `{name}` / `{*name}`.
///
/// ```rust
/// use bindery::mount_path;
///
/// assert_eq!(mount_path("/api/", "users/:id"), "/api/users/{id}");
/// assert_eq!(mount_path("", "/"), "/");
/// ```
pub fn mount_path(base: &str, path: &str) -> String {
    let mut mounted = String::new();
    for segment in base.split('/').chain(path.split('/')).filter(|s| !s.is_empty()) {
        mounted.push('/');
        if let Some(name) = segment.strip_prefix(':') {
            mounted.push('{');
            mounted.push_str(name);
            mounted.push('}');
        } else if let Some(name) = segment.strip_prefix('*') {
            mounted.push_str("{*");
            mounted.push_str(name);
            mounted.push('}');
        } else {
            mounted.push_str(segment);
        }
    }
    if mounted.is_empty() {
        mounted.push('/');
    }
    mounted
}

// ── Route table ───────────────────────────────────────────────────────────────

/// A registered endpoint together with its validation rules.
#[derive(Clone)]
pub(crate) struct Mounted {
    pub(crate) endpoint: Arc<dyn Endpoint>,
    pub(crate) rules: Arc<Rules>,
}

/// One radix tree per HTTP method. Read-only once boot completes.
#[derive(Default)]
pub(crate) struct Table {
    routes: HashMap<Method, MatchitRouter<Mounted>>,
}

impl Table {
    pub(crate) fn insert(&mut self, method: Method, path: &str, mounted: Mounted) -> Result<(), matchit::InsertError> {
        self.routes.entry(method).or_default().insert(path, mounted)
    }

    pub(crate) fn lookup(&self, method: Method, path: &str) -> Option<(Mounted, HashMap<String, String>)> {
        let tree = self.routes.get(&method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value.clone(), params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::RestError;

    async fn ok(_: ()) -> Result<&'static str, RestError> {
        Ok("ok")
    }

    fn mounted() -> Mounted {
        let route = Route::get("/", ok);
        Mounted { endpoint: route.endpoint.unwrap(), rules: Arc::new(Rules::new()) }
    }

    #[test]
    fn mount_path_normalizes_slashes() {
        assert_eq!(mount_path("api", "users"), "/api/users");
        assert_eq!(mount_path("/api/", "/users/"), "/api/users");
        assert_eq!(mount_path("//api", "//users//list"), "/api/users/list");
        assert_eq!(mount_path("/", "/"), "/");
        assert_eq!(mount_path("/api", "/"), "/api");
        assert_eq!(mount_path("", "health"), "/health");
    }

    #[test]
    fn mount_path_translates_parameter_syntax() {
        assert_eq!(mount_path("/users", ":id/posts/:post"), "/users/{id}/posts/{post}");
        assert_eq!(mount_path("/files", "*path"), "/files/{*path}");
        assert_eq!(mount_path("/users", "{id}"), "/users/{id}");
    }

    #[test]
    fn route_without_handler_has_no_endpoint() {
        let route = Route::new(Method::Get, "/todo");
        assert!(route.endpoint.is_none());
        assert!(Route::get("/", ok).endpoint.is_some());
    }

    #[test]
    fn rules_accumulate_on_route() {
        let route = Route::get("/", ok).rule("Name", "min=2").rule("Age", "max=99");
        assert_eq!(route.rules.get("Name").map(String::as_str), Some("min=2"));
        assert_eq!(route.rules.len(), 2);
    }

    #[test]
    fn router_keeps_route_order() {
        let router = Router::new("/api")
            .route(Route::get("/a", ok))
            .on(Method::Post, "/b", ok)
            .route(Route::new(Method::Get, "/c"));
        let paths: Vec<_> = router.routes().iter().map(Route::path).collect();
        assert_eq!(paths, ["/a", "/b", "/c"]);
        assert_eq!(router.base_path(), "/api");
    }

    #[test]
    fn table_lookup_is_per_method_and_extracts_params() {
        let mut table = Table::default();
        table.insert(Method::Get, "/users/{id}", mounted()).unwrap();

        let (_, params) = table.lookup(Method::Get, "/users/42").unwrap();
        assert_eq!(params.get("id").map(String::as_str), Some("42"));
        assert!(table.lookup(Method::Post, "/users/42").is_none());
        assert!(table.lookup(Method::Get, "/posts/42").is_none());
    }

    #[test]
    fn table_rejects_conflicting_paths() {
        let mut table = Table::default();
        table.insert(Method::Get, "/users/{id}", mounted()).unwrap();
        assert!(table.insert(Method::Get, "/users/{id}", mounted()).is_err());
        assert!(table.insert(Method::Post, "/users/{id}", mounted()).is_ok());
    }
}

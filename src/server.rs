//! Boot sequence, request dispatch and the HTTP server loop.
//!
//! # Lifecycle
//!
//! ```text
//! Unbooted ──boot()──▶ Booting ──▶ Booted      ──serve()──▶ accepting
//!                              └─▶ BootFailed  ──serve()──▶ Error::NotBooted
//! ```
//!
//! Boot walks every router and route once. A route whose entity schema is
//! structurally invalid, or whose path conflicts with one already mounted, is
//! recorded and skipped; the rest still register. Only after the full pass is
//! the outcome decided: any recorded failure makes the whole boot fail, and a
//! server that failed to boot never accepts a connection.
//!
//! # Graceful shutdown
//!
//! On **SIGTERM** or **SIGINT** the server stops accepting, lets every
//! in-flight connection finish, then returns from [`Server::serve`].

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::bind::{AcceptAll, Checker};
use crate::config::Config;
use crate::error::{BindError, BootError, Error, RouteError};
use crate::handler::Shared;
use crate::method::Method;
use crate::request::Request;
use crate::response::{self, Response};
use crate::router::{Mounted, Router, Table, mount_path};

/// Where the server is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BootState {
    Unbooted,
    Booting,
    Booted,
    BootFailed,
}

/// The HTTP server: routers in, booted dispatcher out.
pub struct Server {
    config: Config,
    checker: Arc<dyn Checker>,
    routers: Vec<Router>,
    state: BootState,
    dispatcher: Option<Dispatcher>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            checker: Arc::new(AcceptAll),
            routers: Vec::new(),
            state: BootState::Unbooted,
            dispatcher: None,
        }
    }

    /// Adds a router. Routers mount in the order they are added.
    pub fn mount(mut self, router: Router) -> Self {
        self.routers.push(router);
        self
    }

    /// Installs the validation-rule checker used by every route.
    pub fn checker(mut self, checker: impl Checker) -> Self {
        self.checker = Arc::new(checker);
        self
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Runs the boot sequence once. Later calls re-register nothing: they
    /// return `Ok` after a successful boot and an empty [`BootError`] after a
    /// failed one.
    pub fn boot(&mut self) -> Result<(), BootError> {
        match self.state {
            BootState::Booted => return Ok(()),
            BootState::BootFailed => return Err(BootError { failures: Vec::new() }),
            BootState::Unbooted | BootState::Booting => {}
        }
        self.state = BootState::Booting;

        let mut table = Table::default();
        let mut failures = Vec::new();
        let mut mounted = 0usize;

        for router in std::mem::take(&mut self.routers) {
            for route in router.routes {
                let path = mount_path(&router.base_path, &route.path);
                let method = route.method;
                debug!(%method, %path, "booting route");

                let Some(endpoint) = route.endpoint else {
                    warn!(%method, %path, "route not booted: no handler assigned");
                    continue;
                };

                if let Err(source) = endpoint.check(&route.rules) {
                    error!(%method, %path, error = %source, "invalid entity schema");
                    failures.push(RouteError::Schema { method, path, source });
                    continue;
                }

                let entry = Mounted { endpoint, rules: Arc::new(route.rules) };
                match table.insert(method, &path, entry) {
                    Ok(()) => mounted += 1,
                    Err(e) => {
                        error!(%method, %path, error = %e, "route conflicts with a mounted route");
                        failures.push(RouteError::Conflict { method, path, message: e.to_string() });
                    }
                }
            }
        }

        if !failures.is_empty() {
            self.state = BootState::BootFailed;
            error!(failed = failures.len(), mounted, "boot failed");
            return Err(BootError { failures });
        }

        let shared = Shared { config: self.config.clone(), checker: Arc::clone(&self.checker) };
        self.dispatcher = Some(Dispatcher { table: Arc::new(table), shared: Arc::new(shared) });
        self.state = BootState::Booted;
        info!(mounted, "boot complete");
        Ok(())
    }

    /// Routes one request in process and produces its response.
    ///
    /// Answers `503 Service Unavailable` unless the server has booted.
    pub async fn dispatch<B>(&self, req: http::Request<B>) -> Response
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(req).await,
            None => Response::status(StatusCode::SERVICE_UNAVAILABLE),
        }
    }

    /// Boots if needed, then accepts connections on `config.listen` until a
    /// shutdown signal arrives and every in-flight request has completed.
    pub async fn serve(mut self) -> Result<(), Error> {
        match self.state {
            BootState::Unbooted | BootState::Booting => self.boot()?,
            BootState::BootFailed => return Err(Error::NotBooted),
            BootState::Booted => {}
        }
        let dispatcher = self.dispatcher.take().ok_or(Error::NotBooted)?;

        let addr: SocketAddr = self
            .config
            .listen
            .parse()
            .map_err(|_| Error::Addr(self.config.listen.clone()))?;
        let listener = TcpListener::bind(addr).await?;

        info!(%addr, "bindery listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                // Check shutdown first so a SIGTERM immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut shutdown => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let dispatcher = dispatcher.clone();
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let dispatcher = dispatcher.clone();
                            async move {
                                Ok::<_, std::convert::Infallible>(dispatcher.dispatch(req).await.into_inner())
                            }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("bindery stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// The booted route table plus shared state. Cheap to clone per connection.
#[derive(Clone)]
struct Dispatcher {
    table: Arc<Table>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// Routes one request, buffers its body and runs its endpoint. Every
    /// failure is answered here; nothing propagates to the connection.
    async fn dispatch<B>(&self, req: http::Request<B>) -> Response
    where
        B: hyper::body::Body<Data = Bytes>,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let Ok(method) = Method::try_from(req.method()) else {
            return Response::status(StatusCode::METHOD_NOT_ALLOWED);
        };
        let Some((mounted, params)) = self.table.lookup(method, req.uri().path()) else {
            return Response::status(StatusCode::NOT_FOUND);
        };

        let limit = self.shared.config.multipart_limit;
        let (parts, body) = req.into_parts();
        let body = match buffer_body(body, limit).await {
            Ok(body) => body,
            Err(err) => return response::bind_failure(err),
        };

        let request = Request::new(parts, body, params);
        mounted.endpoint.call(request, mounted.rules, Arc::clone(&self.shared)).await
    }
}

/// Buffers a request body, reading at most `limit` bytes.
///
/// A declared `Content-Length` above the limit is rejected before any frame
/// is read.
async fn buffer_body<B>(body: B, limit: u64) -> Result<Bytes, BindError>
where
    B: hyper::body::Body<Data = Bytes>,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    if hyper::body::Body::size_hint(&body).lower() > limit {
        return Err(BindError::TooLarge { limit });
    }
    let max = usize::try_from(limit).unwrap_or(usize::MAX);
    match Limited::new(body, max).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(BindError::TooLarge { limit }),
        Err(e) => Err(BindError::Body(e)),
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let sigterm = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::RestError;
    use crate::router::Route;
    use crate::schema::{Entity, Schema};
    use http_body_util::Full;

    #[derive(Default)]
    struct Broken {
        name: String,
    }

    impl Entity for Broken {
        fn schema() -> Schema<Self> {
            Schema::<Self>::new().string("Name", "name|cookie", |e, v| e.name = v)
        }
    }

    async fn broken(e: Broken) -> Result<String, RestError> {
        Ok(e.name)
    }

    async fn pong(_: ()) -> Result<&'static str, RestError> {
        Ok("pong")
    }

    fn get(uri: &str) -> http::Request<Full<Bytes>> {
        http::Request::builder().uri(uri).body(Full::new(Bytes::new())).unwrap()
    }

    #[test]
    fn starts_unbooted() {
        assert_eq!(Server::new(Config::default()).state(), BootState::Unbooted);
    }

    #[test]
    fn boots_valid_routes() {
        let mut server = Server::new(Config::default())
            .mount(Router::new("/api").route(Route::get("/ping", pong)));
        assert!(server.boot().is_ok());
        assert_eq!(server.state(), BootState::Booted);
        assert!(server.boot().is_ok());
    }

    #[test]
    fn route_without_handler_is_skipped_not_failed() {
        let mut server = Server::new(Config::default())
            .mount(Router::new("").route(Route::new(Method::Get, "/todo")));
        assert!(server.boot().is_ok());
        assert_eq!(server.state(), BootState::Booted);
    }

    #[test]
    fn broken_schema_fails_boot_but_other_routes_register() {
        let mut server = Server::new(Config::default()).mount(
            Router::new("")
                .route(Route::post("/broken", broken))
                .route(Route::get("/ping", pong)),
        );
        let err = server.boot().unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert!(matches!(&err.failures[0], RouteError::Schema { path, .. } if path == "/broken"));
        assert_eq!(server.state(), BootState::BootFailed);
    }

    #[test]
    fn failures_are_aggregated_across_routers() {
        let mut server = Server::new(Config::default())
            .mount(Router::new("/a").route(Route::post("/x", broken)))
            .mount(Router::new("/b").route(Route::post("/y", broken)))
            .mount(Router::new("/c").route(Route::get("/z", pong)).route(Route::get("/z", pong)));
        let err = server.boot().unwrap_err();
        assert_eq!(err.failures.len(), 3);
        assert!(matches!(&err.failures[2], RouteError::Conflict { path, .. } if path == "/c/z"));
    }

    #[test]
    fn unknown_rule_field_fails_boot() {
        let mut server = Server::new(Config::default())
            .mount(Router::new("").route(Route::get("/ping", pong).rule("Missing", "required")));
        assert!(server.boot().is_err());
    }

    #[tokio::test]
    async fn failed_boot_refuses_to_serve() {
        let mut server = Server::new(Config::default())
            .mount(Router::new("").route(Route::post("/broken", broken)));
        assert!(server.boot().is_err());
        assert!(matches!(server.serve().await, Err(Error::NotBooted)));
    }

    #[tokio::test]
    async fn dispatch_before_boot_is_unavailable() {
        let server = Server::new(Config::default())
            .mount(Router::new("").route(Route::get("/ping", pong)));
        let res = server.dispatch(get("/ping")).await;
        assert_eq!(res.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn dispatch_routes_by_method_and_path() {
        let mut server = Server::new(Config::default())
            .mount(Router::new("/api").route(Route::get("ping", pong)));
        server.boot().unwrap();

        let res = server.dispatch(get("/api/ping")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"pong");

        let res = server.dispatch(get("/api/nope")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);

        let post = http::Request::builder()
            .method("POST")
            .uri("/api/ping")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(server.dispatch(post).await.status_code(), StatusCode::NOT_FOUND);

        let propfind = http::Request::builder()
            .method("PROPFIND")
            .uri("/api/ping")
            .body(Full::new(Bytes::new()))
            .unwrap();
        assert_eq!(server.dispatch(propfind).await.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn buffer_body_honours_the_limit() {
        let body = Full::new(Bytes::from_static(b"0123456789"));
        assert_eq!(buffer_body(body, 10).await.unwrap(), Bytes::from_static(b"0123456789"));

        let body = Full::new(Bytes::from_static(b"0123456789"));
        assert!(matches!(buffer_body(body, 9).await, Err(BindError::TooLarge { limit: 9 })));
    }

    #[tokio::test]
    async fn invalid_listen_address_is_reported() {
        let config = Config { listen: "not an address".to_owned(), ..Config::default() };
        let server = Server::new(config).mount(Router::new("").route(Route::get("/ping", pong)));
        assert!(matches!(server.serve().await, Err(Error::Addr(_))));
    }
}

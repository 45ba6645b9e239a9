//! Minimal bindery example: typed entities from body, query, path and form.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl -X POST http://localhost:3000/api/sign-up \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice","age":30}'
//!   curl -X POST http://localhost:3000/api/sign-up -d '{}' \
//!        -H 'content-type: application/json'          ← 400, name is required
//!   curl 'http://localhost:3000/api/users/42?verbose=true'
//!   curl http://localhost:3000/api/users/0                ← 404 JSON error
//!   curl -F avatar=@Cargo.toml -F gallery=@Cargo.toml -F gallery=@Cargo.toml \
//!        http://localhost:3000/api/upload

use bindery::{
    Config, Entity, File, HandlerError, Render, RestError, Route, Router, Schema, Server,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let api = Router::new("/api")
        .route(Route::post("/sign-up", sign_up))
        .route(Route::get("/users/:id", get_user))
        .route(Route::post("/upload", upload));

    let config = match std::env::var("BINDERY_CONFIG") {
        Ok(path) => Config::load(path).expect("config error"),
        Err(_) => Config::default(),
    };

    Server::new(config)
        .mount(api)
        .serve()
        .await
        .expect("server error");
}

// POST /api/sign-up
#[derive(Default)]
struct SignUp {
    name: String,
    age: i64,
}

impl Entity for SignUp {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .string("Name", "name|body!", |e, v| e.name = v)
            .int("Age", "|body", |e, v| e.age = v)
    }
}

async fn sign_up(e: SignUp) -> Result<String, RestError> {
    if e.age < 0 {
        return Err(RestError::bad_request("age must not be negative"));
    }
    Ok(format!("welcome, {} ({})", e.name, e.age))
}

// GET /api/users/:id
#[derive(Default)]
struct Lookup {
    id: i64,
    verbose: bool,
}

impl Entity for Lookup {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .int("Id", "|param!", |e, v| e.id = v)
            .bool("Verbose", "", |e, v| e.verbose = v)
    }
}

async fn get_user(e: Lookup) -> Result<Render, RestError> {
    if e.id == 0 {
        return Err(RestError::not_found(format!("no user {}", e.id)));
    }
    let mut user = serde_json::json!({ "id": e.id, "name": "alice" });
    if e.verbose {
        user["roles"] = serde_json::json!(["admin"]);
    }
    Render::json(&user).map_err(|e| RestError::new(500, e.to_string()))
}

// POST /api/upload
#[derive(Default)]
struct Upload {
    avatar: File,
    gallery: Vec<File>,
}

impl Entity for Upload {
    fn schema() -> Schema<Self> {
        Schema::<Self>::new()
            .file("Avatar", "avatar|form!", |e, v| e.avatar = v)
            .files("Gallery", "form", |e, v| e.gallery = v)
    }
}

async fn upload(e: Upload) -> Result<String, HandlerError> {
    if e.avatar.raw.is_empty() {
        return Err(HandlerError::traced("avatar upload was empty"));
    }
    Ok(format!(
        "avatar {} bytes, gallery {} file(s)",
        e.avatar.raw.len(),
        e.gallery.len()
    ))
}

//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::{HeaderMap, Uri};

/// An incoming HTTP request with its body fully buffered and its path
/// parameters resolved.
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: http::Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
}

impl Request {
    pub(crate) fn new(parts: http::request::Parts, body: Bytes, params: HashMap<String, String>) -> Self {
        Self { method: parts.method, uri: parts.uri, headers: parts.headers, body, params }
    }

    /// Builds a request from an already-buffered `http::Request`.
    pub fn from_http(req: http::Request<Bytes>, params: HashMap<String, String>) -> Self {
        let (parts, body) = req.into_parts();
        Self::new(parts, body, params)
    }

    pub fn method(&self) -> &http::Method { &self.method }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> Option<&str> { self.uri.query() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &Bytes { &self.body }

    /// Case-insensitive header lookup. Non-UTF-8 values read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Returns a named path parameter exactly as the route declared it.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let req = http::Request::builder()
            .method("PUT")
            .uri("/users/42?verbose=1")
            .header("Content-Type", "application/json")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        let req = Request::from_http(req, HashMap::from([("id".to_owned(), "42".to_owned())]));

        assert_eq!(*req.method(), http::Method::PUT);
        assert_eq!(req.path(), "/users/42");
        assert_eq!(req.query(), Some("verbose=1"));
        assert_eq!(req.header("content-type"), Some("application/json"));
        assert_eq!(req.body().as_ref(), b"{}");
        assert_eq!(req.param("id"), Some("42"));
        assert_eq!(req.param("ID"), None);
    }
}

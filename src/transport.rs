//! Request sub-channels and the flat views extracted from them.
//!
//! A field reads from exactly one [`Transport`]. Before any field is bound the
//! request is reduced once to an [`Extracted`] value:
//!
//! ```text
//! query string   → query  (first value per key)
//! parsed body    → body   (JSON object, url-encoded pairs, multipart text parts)
//! multipart file → files  (every file part, keyed by form name)
//! path params    → params (canonical capitalized keys)
//! ```
//!
//! The body is decoded according to the request's `content-type`, compared
//! against a fixed registry of three media types. Anything else is treated as
//! "no body data".

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::error;

use crate::error::BindError;
use crate::request::Request;

// ── Transport ─────────────────────────────────────────────────────────────────

/// The request sub-channel a field's value is read from.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Transport {
    Query,
    Body,
    Form,
    Param,
}

impl Transport {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Body  => "body",
            Self::Form  => "form",
            Self::Param => "param",
        }
    }
}

/// Parses the lowercase transport name used in field annotations.
impl FromStr for Transport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "query" => Ok(Self::Query),
            "body"  => Ok(Self::Body),
            "form"  => Ok(Self::Form),
            "param" => Ok(Self::Param),
            _       => Err(()),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Content-type registry ─────────────────────────────────────────────────────

/// Body encodings the extractor understands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum ContentKind {
    Json,
    UrlEncoded,
    Multipart,
}

const REGISTRY: [(&str, ContentKind); 3] = [
    ("application/json", ContentKind::Json),
    ("application/x-www-form-urlencoded", ContentKind::UrlEncoded),
    ("multipart/form-data", ContentKind::Multipart),
];

impl ContentKind {
    /// Matches the essence of a `content-type` header value (parameters such
    /// as `charset` or `boundary` are ignored).
    pub(crate) fn detect(content_type: Option<&str>) -> Option<Self> {
        let mime: mime::Mime = content_type?.parse().ok()?;
        REGISTRY
            .iter()
            .find(|(essence, _)| mime.essence_str().eq_ignore_ascii_case(essence))
            .map(|(_, kind)| *kind)
    }
}

// ── Extracted views ───────────────────────────────────────────────────────────

/// One uploaded file part, fully buffered.
#[derive(Clone, Debug)]
pub struct FilePart {
    pub(crate) file_name: Option<String>,
    pub(crate) data: Bytes,
}

/// The normalized views of one request, built once before binding.
#[derive(Clone, Debug, Default)]
pub struct Extracted {
    pub(crate) query: HashMap<String, String>,
    pub(crate) body: Map<String, Value>,
    pub(crate) files: HashMap<String, Vec<FilePart>>,
    pub(crate) params: HashMap<String, String>,
}

impl Extracted {
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    pub fn body(&self, key: &str) -> Option<&Value> {
        self.body.get(key)
    }

    /// All file parts uploaded under `key`, in request order.
    pub fn files(&self, key: &str) -> &[FilePart] {
        self.files.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Path parameter lookup. Case-insensitive: both sides are canonicalized.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(&canonical_param(key)).map(String::as_str)
    }
}

/// Canonical form of a path-parameter key: lower-cased, first char upper.
pub(crate) fn canonical_param(key: &str) -> String {
    let lower = key.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Reduces `req` to its flat views, consuming the body exactly once.
///
/// `multipart_limit` bounds the whole multipart stream in bytes.
pub async fn extract(req: &Request, multipart_limit: u64) -> Result<Extracted, BindError> {
    let mut out = Extracted {
        query: first_values(req.query().unwrap_or_default().as_bytes()),
        params: req
            .params
            .iter()
            .map(|(k, v)| (canonical_param(k), v.clone()))
            .collect(),
        ..Extracted::default()
    };

    let content_type = req.header(http::header::CONTENT_TYPE.as_str());
    match ContentKind::detect(content_type) {
        Some(ContentKind::Json) => out.body = decode_json(req.body())?,
        Some(ContentKind::UrlEncoded) => {
            out.body = first_values(req.body())
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect();
        }
        Some(ContentKind::Multipart) => {
            // `detect` only matches when the header is present.
            let content_type = content_type.unwrap_or_default();
            decode_multipart(content_type, req.body().clone(), multipart_limit, &mut out).await?;
        }
        None => {}
    }

    Ok(out)
}

/// Query-string style decoding; only the first value of a repeated key is kept.
fn first_values(input: &[u8]) -> HashMap<String, String> {
    let mut values = HashMap::new();
    for (k, v) in form_urlencoded::parse(input) {
        values.entry(k.into_owned()).or_insert_with(|| v.into_owned());
    }
    values
}

/// The body must be one JSON object. An empty body is malformed.
fn decode_json(body: &[u8]) -> Result<Map<String, Value>, BindError> {
    Ok(serde_json::from_slice(body)?)
}

async fn decode_multipart(
    content_type: &str,
    body: Bytes,
    limit: u64,
    out: &mut Extracted,
) -> Result<(), BindError> {
    let boundary = multer::parse_boundary(content_type)?;
    let constraints = multer::Constraints::new()
        .size_limit(multer::SizeLimit::new().whole_stream(limit));
    let stream = futures_util::stream::iter([Ok::<_, Infallible>(body)]);
    let mut multipart = multer::Multipart::with_constraints(stream, boundary, constraints);

    while let Some(field) = multipart.next_field().await? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        let file_name = field.file_name().map(str::to_owned);
        let data = field.bytes().await.inspect_err(|e| {
            error!(field = %name, error = %e, "failed to read multipart part");
        })?;

        if file_name.is_some() {
            out.files.entry(name).or_default().push(FilePart { file_name, data });
        } else {
            let text = String::from_utf8_lossy(&data).into_owned();
            out.body.entry(name).or_insert(Value::String(text));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(content_type: Option<&str>, uri: &str, body: &'static [u8]) -> Request {
        let mut builder = http::Request::builder().method("POST").uri(uri);
        if let Some(ct) = content_type {
            builder = builder.header("content-type", ct);
        }
        let req = builder.body(Bytes::from_static(body)).unwrap();
        Request::from_http(req, HashMap::new())
    }

    #[test]
    fn detects_registered_content_types_ignoring_parameters() {
        assert_eq!(ContentKind::detect(Some("application/json")), Some(ContentKind::Json));
        assert_eq!(
            ContentKind::detect(Some("application/json; charset=utf-8")),
            Some(ContentKind::Json)
        );
        assert_eq!(
            ContentKind::detect(Some("multipart/form-data; boundary=xyz")),
            Some(ContentKind::Multipart)
        );
        assert_eq!(ContentKind::detect(Some("text/plain")), None);
        assert_eq!(ContentKind::detect(None), None);
    }

    #[test]
    fn canonical_param_is_case_insensitive() {
        assert_eq!(canonical_param("userId"), "Userid");
        assert_eq!(canonical_param("USERID"), "Userid");
        assert_eq!(canonical_param(""), "");
    }

    #[test]
    fn transport_names_round_trip_through_display() {
        for t in [Transport::Query, Transport::Body, Transport::Form, Transport::Param] {
            assert_eq!(t.to_string().parse::<Transport>(), Ok(t));
        }
        assert!("header".parse::<Transport>().is_err());
    }

    #[tokio::test]
    async fn query_keeps_first_value() {
        let req = request(None, "/x?tag=a&tag=b&n=1", b"");
        let out = extract(&req, 1024).await.unwrap();
        assert_eq!(out.query("tag"), Some("a"));
        assert_eq!(out.query("n"), Some("1"));
        assert!(out.body.is_empty());
    }

    #[tokio::test]
    async fn json_body_decodes_into_map() {
        let req = request(Some("application/json"), "/", br#"{"name":"Ann","age":30}"#);
        let out = extract(&req, 1024).await.unwrap();
        assert_eq!(out.body("name"), Some(&Value::from("Ann")));
        assert_eq!(out.body("age"), Some(&Value::from(30)));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bind_error() {
        let req = request(Some("application/json"), "/", b"{nope");
        assert!(matches!(extract(&req, 1024).await, Err(BindError::Json(_))));
    }

    #[tokio::test]
    async fn empty_json_body_is_a_bind_error() {
        for body in [&b""[..], &b"  \n"[..]] {
            let req = request(Some("application/json"), "/", body);
            assert!(matches!(extract(&req, 1024).await, Err(BindError::Json(_))));
        }
    }

    #[tokio::test]
    async fn json_array_body_is_rejected() {
        let req = request(Some("application/json"), "/", b"[1,2]");
        assert!(matches!(extract(&req, 1024).await, Err(BindError::Json(_))));
    }

    #[tokio::test]
    async fn urlencoded_body_keeps_first_value() {
        let req = request(
            Some("application/x-www-form-urlencoded"),
            "/",
            b"name=Ann+Lee&name=Bob&city=Oslo",
        );
        let out = extract(&req, 1024).await.unwrap();
        assert_eq!(out.body("name"), Some(&Value::from("Ann Lee")));
        assert_eq!(out.body("city"), Some(&Value::from("Oslo")));
    }

    #[tokio::test]
    async fn unknown_content_type_means_no_body() {
        let req = request(Some("text/plain"), "/", b"name=Ann");
        let out = extract(&req, 1024).await.unwrap();
        assert!(out.body.is_empty());
    }

    #[tokio::test]
    async fn multipart_splits_files_and_text_fields() {
        let body: &'static [u8] = b"--XX\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\r\n\
holiday\r\n\
--XX\r\n\
Content-Disposition: form-data; name=\"photos\"; filename=\"a.png\"\r\n\
Content-Type: image/png\r\n\r\n\
AAA\r\n\
--XX\r\n\
Content-Disposition: form-data; name=\"photos\"; filename=\"b.png\"\r\n\
Content-Type: image/png\r\n\r\n\
BBBB\r\n\
--XX--\r\n";
        let req = request(Some("multipart/form-data; boundary=XX"), "/", body);
        let out = extract(&req, 1024).await.unwrap();

        assert_eq!(out.body("title"), Some(&Value::from("holiday")));
        let photos = out.files("photos");
        assert_eq!(photos.len(), 2);
        assert_eq!(&photos[0].data[..], b"AAA");
        assert_eq!(&photos[1].data[..], b"BBBB");
        assert_eq!(photos[1].file_name.as_deref(), Some("b.png"));
        assert!(out.files("missing").is_empty());
    }

    #[tokio::test]
    async fn multipart_without_boundary_fails() {
        let req = request(Some("multipart/form-data"), "/", b"");
        assert!(matches!(extract(&req, 1024).await, Err(BindError::Multipart(_))));
    }

    #[tokio::test]
    async fn multipart_over_limit_fails() {
        let body: &'static [u8] = b"--XX\r\n\
Content-Disposition: form-data; name=\"f\"; filename=\"f.bin\"\r\n\r\n\
0123456789012345678901234567890123456789\r\n\
--XX--\r\n";
        let req = request(Some("multipart/form-data; boundary=XX"), "/", body);
        assert!(matches!(extract(&req, 16).await, Err(BindError::Multipart(_))));
    }

    #[tokio::test]
    async fn params_are_canonicalized() {
        let req = http::Request::builder().uri("/users/7").body(Bytes::new()).unwrap();
        let params = HashMap::from([("userId".to_owned(), "7".to_owned())]);
        let out = extract(&Request::from_http(req, params), 1024).await.unwrap();
        assert_eq!(out.param("userid"), Some("7"));
        assert_eq!(out.param("USERID"), Some("7"));
    }
}

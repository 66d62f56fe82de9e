//! Incoming HTTP request type.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue};

use crate::json::JsonCodec;
use crate::response::APPLICATION_JSON;

/// An incoming HTTP request with its body fully read.
///
/// The server builds these from hyper requests; tests build them directly:
///
/// ```rust
/// use restle::Request;
///
/// let req = Request::new("POST", "/widgets").with_json(r#"{"name":"gear"}"#);
/// assert_eq!(req.media_type(), Some("application/json"));
/// ```
#[derive(Clone, Debug)]
pub struct Request {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) query: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) codec: Arc<JsonCodec>,
}

impl Request {
    /// A bodiless request. `path` may carry a `?query`.
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        let path = path.into();
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_owned(), Some(q.to_owned())),
            None => (path, None),
        };
        Self {
            method: method.into(),
            path,
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            codec: Arc::default(),
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets the body and `content-type: application/json`.
    pub fn with_json(self, body: impl Into<Bytes>) -> Self {
        self.with_header(CONTENT_TYPE, APPLICATION_JSON).with_body(body)
    }

    pub(crate) fn from_parts(
        method: String,
        path: String,
        query: Option<String>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Self {
        Self {
            method,
            path,
            query,
            headers,
            body,
            params: HashMap::new(),
            codec: Arc::default(),
        }
    }

    pub fn method(&self) -> &str { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn query(&self) -> Option<&str> { self.query.as_deref() }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The codec the router was configured with.
    pub fn codec(&self) -> &JsonCodec { &self.codec }

    /// Case-insensitive header lookup. Values that are not visible ASCII
    /// read as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The `content-type` without parameters: `"application/json"` for
    /// `application/json; charset=utf-8`.
    pub fn media_type(&self) -> Option<&str> {
        let value = self.header(CONTENT_TYPE.as_str())?;
        let media = value.split(';').next().unwrap_or(value).trim();
        (!media.is_empty()).then_some(media)
    }

    /// Returns a raw path parameter as it appeared in the URL.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

//! Outgoing HTTP response type and the [`IntoResponse`] conversion trait.
//!
//! Resources rarely build a [`Response`] by hand; they return a
//! [`Reply`](crate::Reply) and let the dispatcher pick status, headers and
//! encoding. A handler that does build one gets it passed through untouched.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName};
use http::{HeaderMap, HeaderValue, StatusCode};
use http_body_util::Full;

pub(crate) const APPLICATION_JSON: HeaderValue = HeaderValue::from_static("application/json");

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts (200 OK)
///
/// ```rust
/// use http::StatusCode;
/// use restle::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::text("hello");
/// Response::with_status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use http::{header, HeaderValue, StatusCode};
/// use restle::Response;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header(header::LOCATION, HeaderValue::from_static("/users/42"))
///     .json(br#"{"id":42}"#.to_vec());
/// ```
#[derive(Clone, Debug)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK`, `application/json`.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// `200 OK`, `text/plain; charset=utf-8`.
    pub fn text(body: impl Into<String>) -> Self {
        Self::builder().text(body)
    }

    /// Response with no body.
    pub fn with_status(status: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status }
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    /// The `content-type` header, if set and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
/// Terminated by a typed body method.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Appends a header; repeated names keep every value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.append(name.clone(), value.clone());
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(self, body: impl Into<Bytes>) -> Response {
        self.bytes(APPLICATION_JSON, body)
    }

    /// Terminate with a plain-text body (`text/plain; charset=utf-8`).
    pub fn text(self, body: impl Into<String>) -> Response {
        self.bytes(HeaderValue::from_static("text/plain; charset=utf-8"), body.into())
    }

    /// Terminate with a body of the given media type.
    pub fn bytes(mut self, content_type: HeaderValue, body: impl Into<Bytes>) -> Response {
        self.headers.insert(CONTENT_TYPE, content_type);
        Response { body: body.into(), headers: self.headers, status: self.status }
    }

    /// Terminate with no body and no content type.
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Conversion into an HTTP [`Response`] for plain route handlers.
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response { Response::text(self) }
}

impl IntoResponse for String {
    fn into_response(self) -> Response { Response::text(self) }
}

/// Return a status directly from a handler: `return StatusCode::NOT_FOUND`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::with_status(self) }
}

#[cfg(test)]
mod tests {
    use http::header;

    use super::*;

    #[test]
    fn builder_sets_content_type_last() {
        let res = Response::builder()
            .status(StatusCode::CREATED)
            .header(header::LOCATION, HeaderValue::from_static("/users/1"))
            .json("{}");
        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.content_type(), Some("application/json"));
        assert_eq!(res.headers()[header::LOCATION], "/users/1");
        assert_eq!(res.body(), b"{}");
    }

    #[test]
    fn no_body_has_no_content_type() {
        let res = Response::builder().status(StatusCode::NO_CONTENT).no_body();
        assert!(res.content_type().is_none());
        assert!(res.body().is_empty());
    }

    #[test]
    fn converts_to_http_response() {
        let res = Response::text("ok").into_inner();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[CONTENT_TYPE], "text/plain; charset=utf-8");
    }
}

//! The client-facing error type.
//!
//! Handlers and pre-dispatch hooks fail with an [`ApiError`]. The router's
//! error handler (installed by [`restle`](crate::restle)) turns it into a
//! JSON body of the form:
//!
//! ```json
//! { "field": "name", "error_message": "bad" }
//! ```
//!
//! Common codes: 401 unauthorized, 402 payment required, 403 forbidden,
//! 404 not found, 405 method not allowed, 406 not acceptable, 415
//! unsupported media type.

use http::StatusCode;
use serde_json::{Map, Value};

use crate::json::JsonCodec;
use crate::response::Response;

/// A failure carrying a message, an HTTP status and optional extra fields.
///
/// ```rust
/// use http::StatusCode;
/// use restle::ApiError;
///
/// let err = ApiError::new("X not found").with_status(StatusCode::NOT_FOUND);
/// assert_eq!(err.status(), StatusCode::NOT_FOUND);
/// assert_eq!(err.to_dict()["error_message"], "X not found");
/// ```
#[derive(Clone, Debug, thiserror::Error)]
#[error("{status}: {message}")]
pub struct ApiError {
    message: String,
    status: StatusCode,
    payload: Option<Map<String, Value>>,
}

impl ApiError {
    /// A `400 Bad Request` error.
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into(), status: StatusCode::BAD_REQUEST, payload: None }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message).with_status(StatusCode::NOT_FOUND)
    }

    pub fn method_not_allowed() -> Self {
        Self::new("HTTP method is not supported").with_status(StatusCode::METHOD_NOT_ALLOWED)
    }

    pub fn unsupported_media_type() -> Self {
        Self::new("Request payload mimetype must be 'application/json'")
            .with_status(StatusCode::UNSUPPORTED_MEDIA_TYPE)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Integer form of [`with_status`](Self::with_status). Codes outside
    /// `100..=999` leave the status unchanged.
    pub fn with_code(self, code: u16) -> Self {
        match StatusCode::from_u16(code) {
            Ok(status) => self.with_status(status),
            Err(_) => self,
        }
    }

    /// Extra fields merged into the error body.
    pub fn with_payload(mut self, payload: Map<String, Value>) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn message(&self) -> &str { &self.message }
    pub fn status(&self) -> StatusCode { self.status }
    pub fn payload(&self) -> Option<&Map<String, Value>> { self.payload.as_ref() }

    /// The JSON error body: the payload with `error_message` set to the
    /// message. A payload key named `error_message` is overwritten.
    pub fn to_dict(&self) -> Map<String, Value> {
        let mut body = self.payload.clone().unwrap_or_default();
        body.insert("error_message".to_owned(), Value::String(self.message.clone()));
        body
    }

    /// Renders [`to_dict`](Self::to_dict) as an `application/json` response
    /// at this error's status.
    pub fn respond(&self, codec: &JsonCodec) -> Response {
        let body = codec
            .encode_value(&Value::Object(self.to_dict()))
            // a map of JSON values always encodes
            .unwrap_or_default();
        Response::builder().status(self.status).json(body)
    }
}

//! # restle
//!
//! RESTful-ish JSON resources on a small hyper + matchit HTTP stack.
//!
//! A [`Resource`] maps HTTP verbs to async handlers.
//! [`register_api`] mounts it under the usual collection and item routes.
//! Handlers return data and the crate picks the status and encodes JSON.
//! Client errors are [`ApiError`]s, rendered as
//! `{"error_message": …, ..payload}` at their status.
//!
//! | Request | Status |
//! |---|---|
//! | handler returned data | 200, or the override |
//! | handler returned nothing | 204 |
//! | PUT | 201 |
//! | body that is not `application/json` | 415 |
//! | verb without a handler | 405 |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use restle::{restle, ApiError, ApiRoute, Call, Reply, Resource, Router, Server};
//! use serde_json::json;
//!
//! async fn fetch(call: Call) -> Result<Reply, ApiError> {
//!     match call.args().get_i64("id") {
//!         None => Ok(Reply::json(json!([{"id": 1}]))),
//!         Some(1) => Ok(Reply::json(json!({"id": 1}))),
//!         Some(_) => Err(ApiError::not_found("no such widget")),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), restle::Error> {
//!     let widgets = Resource::builder("widgets").get(fetch).build();
//!     let app = restle(Router::new()).api(ApiRoute::new("widgets", "/widgets"), widgets)?;
//!
//!     Server::bind("0.0.0.0:5000")?.serve(app).await
//! }
//! ```
//!
//! `restle` never installs a `tracing` subscriber; that is the binary's job.

mod api_error;
mod args;
mod converters;
mod error;
mod handler;
mod json;
mod method;
mod registrar;
mod request;
mod resource;
mod response;
mod router;
mod server;

pub use api_error::ApiError;
pub use args::Args;
pub use converters::{
    CidrConverter, Converter, Converters, EmailConverter, IntConverter, Ipv4Converter,
    PathConverter, RegexConverter, StringConverter, CIDR_PATTERN, EMAIL_PATTERN, IPV4_PATTERN,
};
pub use error::Error;
pub use handler::{Handler, IntoOutcome};
pub use json::{DecodeError, Document, EncodeError, JsonCodec, JsonConfig, JsonSerializer};
pub use method::Method;
pub use registrar::{extend_converters, register_api, restle, ApiRoute};
pub use request::Request;
pub use resource::{Call, IntoReply, Reply, Resource, ResourceBuilder};
pub use response::{IntoResponse, Response, ResponseBuilder};
pub use router::{RouteInfo, Router};
pub use server::Server;

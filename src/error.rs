//! Unified error type.

use crate::api_error::ApiError;
use crate::json::EncodeError;

/// The error type returned by restle's fallible operations.
///
/// Client-facing failures travel as [`Error::Api`] and are rendered by the
/// router's error handler. Everything else is a server-side failure:
/// broken route rules at startup, a response that cannot be encoded, or
/// socket trouble.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("invalid route `{rule}`: {reason}")]
    Route { rule: String, reason: String },

    #[error("invalid socket address `{0}`")]
    Addr(String),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("reading request body: {0}")]
    Body(#[from] hyper::Error),
}

impl Error {
    pub(crate) fn route(rule: &str, reason: impl Into<String>) -> Self {
        Self::Route { rule: rule.to_owned(), reason: reason.into() }
    }
}

//! Crate-level error type for dispatch and handlers.

use axum::http::StatusCode;
use thiserror::Error;

use crate::routing::RouterError;

/// Errors raised while dispatching a request.
#[derive(Debug, Error)]
pub enum Error {
    /// Route table problem surfaced at dispatch time.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// A handler invoked `next` more than once.
    #[error("next() called multiple times")]
    NextCalledMultipleTimes,

    /// The handler chain finished without producing a response.
    #[error("context is not finalized: no handler returned a response or awaited next()")]
    NotFinalized,

    /// An error that carries its own response status.
    #[error("{status}: {message}")]
    Http { status: StatusCode, message: String },

    /// Reading the request body failed.
    #[error("failed to read request body: {0}")]
    Body(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Free-form handler failure.
    #[error("{0}")]
    Handler(String),
}

impl Error {
    pub fn http(status: StatusCode, message: impl Into<String>) -> Self {
        Error::Http {
            status,
            message: message.into(),
        }
    }

    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }

    /// Status the default error handler answers with.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Http { status, .. } => *status,
            Error::Body(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

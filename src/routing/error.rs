//! Routing error taxonomy.

use thiserror::Error;

/// Errors raised while registering or matching routes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    /// The route pattern is malformed (bad constraint regex, empty param name).
    #[error("invalid route pattern `{path}`: {reason}")]
    InvalidPattern { path: String, reason: String },

    /// The route set cannot be represented by this strategy.
    /// The smart router reacts to this by trying the next strategy.
    #[error("unsupported route pattern `{0}`")]
    UnsupportedPattern(String),

    /// Registration attempted after the router was built.
    #[error("cannot add a route: the router is already built")]
    AlreadyBuilt,

    /// Every candidate strategy rejected the route set.
    #[error("no routing strategy can represent the registered routes")]
    NoStrategy,

    /// The method name is not a valid HTTP method.
    #[error("invalid method `{0}`")]
    InvalidMethod(String),
}

impl RouterError {
    pub(crate) fn invalid(path: &str, reason: impl Into<String>) -> Self {
        RouterError::InvalidPattern {
            path: path.to_string(),
            reason: reason.into(),
        }
    }

    /// True for the signal that makes the smart router fall back.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, RouterError::UnsupportedPattern(_))
    }
}

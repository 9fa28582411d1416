//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Registration (at startup):
//!     (method, path, handler)
//!     → pattern.rs (split, classify, expand optional segments)
//!     → smart.rs (buffer until the first match)
//!
//! First match:
//!     smart.rs replays buffered routes into each candidate strategy
//!     → regexp.rs (one combined regex per method), or
//!     → trie.rs (segment trie, general fallback)
//!     → first strategy that builds is frozen as the delegate
//!
//! Every match after that:
//!     (method, path) → delegate → ordered [(handler, params)]
//! ```
//!
//! # Design Decisions
//! - Every route that matches is returned, ordered by registration
//! - Routes are immutable once a strategy has been selected
//! - Strategies report unrepresentable route sets with a typed error
//!   (`RouterError::UnsupportedPattern`) instead of panicking
//! - Matching is synchronous CPU work; no locks after the one-time build

pub mod error;
pub mod params;
pub mod pattern;
pub mod regexp;
pub mod smart;
pub mod trie;

use std::fmt;
use std::str::FromStr;

use axum::http::Method;

pub use error::RouterError;
pub use params::Params;
pub use pattern::{RoutePattern, Segment};
pub use regexp::RegExpRouter;
pub use smart::{SmartRouter, Strategy};
pub use trie::TrieRouter;

/// Method name that registers a route for every HTTP method.
pub const METHOD_NAME_ALL: &str = "ALL";

/// The method side of a route registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MethodFilter {
    /// Matches every request method.
    Any,
    /// Matches one request method.
    Exact(Method),
}

impl MethodFilter {
    /// Returns true if a request with `method` is accepted.
    pub fn accepts(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Exact(m) => m == method,
        }
    }
}

impl From<Method> for MethodFilter {
    fn from(method: Method) -> Self {
        MethodFilter::Exact(method)
    }
}

impl FromStr for MethodFilter {
    type Err = RouterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case(METHOD_NAME_ALL) || s == "*" {
            return Ok(MethodFilter::Any);
        }
        Method::from_bytes(s.to_ascii_uppercase().as_bytes())
            .map(MethodFilter::Exact)
            .map_err(|_| RouterError::InvalidMethod(s.to_string()))
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str(METHOD_NAME_ALL),
            MethodFilter::Exact(m) => f.write_str(m.as_str()),
        }
    }
}

/// One matched handler together with the params bound for its route.
#[derive(Debug, Clone)]
pub struct RouteMatch<T> {
    pub handler: T,
    pub params: Params,
}

/// Ordered list of matches; order is registration order.
pub type MatchResult<T> = Vec<RouteMatch<T>>;

/// A route matching strategy.
///
/// Implementations accept registrations until they are built, then answer
/// `match_route` from an immutable table.
pub trait RouteMatcher<T>: Send + Sync {
    /// Short strategy name used in logs and the admin API.
    fn name(&self) -> &'static str;

    /// Register a handler for `method` and `path`.
    fn add(&mut self, method: MethodFilter, path: &str, handler: T) -> Result<(), RouterError>;

    /// Build the lookup structures. Idempotent.
    fn build(&self) -> Result<(), RouterError>;

    /// Find every handler whose route matches the request, in registration order.
    fn match_route(&self, method: &Method, path: &str) -> Result<MatchResult<T>, RouterError>;
}

/// Split a request path into segments.
///
/// The leading slash is dropped; `"/"` is a single empty segment and a
/// trailing slash produces a trailing empty segment.
pub(crate) fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    trimmed.split('/').collect()
}

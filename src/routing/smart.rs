//! Adaptive strategy selection.
//!
//! # Responsibilities
//! - Buffer registrations until the route set is complete
//! - On first use, replay the routes into each candidate strategy in order
//! - Commit to the first strategy that builds and delegate to it forever
//!
//! # Design Decisions
//! - Candidates are factories, so every attempt starts from a fresh instance
//! - Only `UnsupportedPattern` moves on to the next candidate; any other
//!   error is a registration bug and is returned unchanged
//! - Selection is a `OnceLock`; the outcome (including failure) is final

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use axum::http::Method;
use serde::{Deserialize, Serialize};

use crate::observability::metrics;
use crate::routing::{pattern, MatchResult, MethodFilter, RegExpRouter, RouteMatcher, RouterError, TrieRouter};

/// Which strategies an app may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Combined regex, falling back to the trie.
    #[default]
    Smart,
    /// Combined regex only; unrepresentable route sets fail to build.
    Regexp,
    /// Segment trie only.
    Trie,
}

impl Strategy {
    pub fn candidates<T: Clone + Send + Sync + 'static>(self) -> Vec<StrategyFactory<T>> {
        match self {
            Strategy::Smart => vec![regexp_factory(), trie_factory()],
            Strategy::Regexp => vec![regexp_factory()],
            Strategy::Trie => vec![trie_factory()],
        }
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smart" => Ok(Strategy::Smart),
            "regexp" => Ok(Strategy::Regexp),
            "trie" => Ok(Strategy::Trie),
            other => Err(format!("unknown router strategy `{other}`")),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Smart => "smart",
            Strategy::Regexp => "regexp",
            Strategy::Trie => "trie",
        })
    }
}

/// Creates a fresh, empty strategy instance.
pub type StrategyFactory<T> = Box<dyn Fn() -> Box<dyn RouteMatcher<T>> + Send + Sync>;

struct Buffered<T> {
    method: MethodFilter,
    path: String,
    handler: T,
}

/// Router that picks the first candidate strategy able to hold every route.
pub struct SmartRouter<T> {
    candidates: Vec<StrategyFactory<T>>,
    routes: Vec<Buffered<T>>,
    selected: OnceLock<Result<Box<dyn RouteMatcher<T>>, RouterError>>,
}

impl<T: Clone + Send + Sync + 'static> SmartRouter<T> {
    pub fn new(candidates: Vec<StrategyFactory<T>>) -> Self {
        Self {
            candidates,
            routes: Vec::new(),
            selected: OnceLock::new(),
        }
    }

    /// Combined regex first, segment trie as the general fallback.
    pub fn new_default() -> Self {
        Self::new(Strategy::Smart.candidates())
    }

    /// Select the strategy now instead of on the first match.
    pub fn resolve(&self) -> Result<&dyn RouteMatcher<T>, RouterError> {
        self.selected
            .get_or_init(|| self.select())
            .as_ref()
            .map(|router| &**router)
            .map_err(Clone::clone)
    }

    /// Name of the winning strategy, once selection succeeded.
    pub fn active_strategy(&self) -> Option<&'static str> {
        match self.selected.get() {
            Some(Ok(router)) => Some(router.name()),
            _ => None,
        }
    }

    /// Number of buffered registrations.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    fn select(&self) -> Result<Box<dyn RouteMatcher<T>>, RouterError> {
        for factory in &self.candidates {
            let mut candidate = factory();
            match self.replay(candidate.as_mut()) {
                Ok(()) => {
                    tracing::info!(
                        strategy = candidate.name(),
                        routes = self.routes.len(),
                        "router strategy selected"
                    );
                    metrics::record_strategy_selected(candidate.name());
                    return Ok(candidate);
                }
                Err(err) if err.is_unsupported() => {
                    tracing::debug!(
                        strategy = candidate.name(),
                        error = %err,
                        "router strategy cannot represent routes, trying next"
                    );
                }
                Err(err) => return Err(err),
            }
        }

        tracing::error!(routes = self.routes.len(), "no router strategy can represent the routes");
        Err(RouterError::NoStrategy)
    }

    fn replay(&self, candidate: &mut dyn RouteMatcher<T>) -> Result<(), RouterError> {
        for route in &self.routes {
            candidate.add(route.method.clone(), &route.path, route.handler.clone())?;
        }
        candidate.build()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for SmartRouter<T> {
    fn default() -> Self {
        Self::new_default()
    }
}

impl<T> fmt::Debug for SmartRouter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let active = match self.selected.get() {
            Some(Ok(router)) => Some(router.name()),
            _ => None,
        };
        f.debug_struct("SmartRouter")
            .field("candidates", &self.candidates.len())
            .field("routes", &self.routes.len())
            .field("active", &active)
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> RouteMatcher<T> for SmartRouter<T> {
    fn name(&self) -> &'static str {
        "SmartRouter"
    }

    fn add(&mut self, method: MethodFilter, path: &str, handler: T) -> Result<(), RouterError> {
        if self.selected.get().is_some() {
            return Err(RouterError::AlreadyBuilt);
        }
        // Malformed routes fail here, not on the first request.
        pattern::compile(path)?;
        self.routes.push(Buffered {
            method,
            path: path.to_string(),
            handler,
        });
        Ok(())
    }

    fn build(&self) -> Result<(), RouterError> {
        self.resolve().map(|_| ())
    }

    fn match_route(&self, method: &Method, path: &str) -> Result<MatchResult<T>, RouterError> {
        self.resolve()?.match_route(method, path)
    }
}

/// Factory for [`RegExpRouter`].
pub fn regexp_factory<T: Clone + Send + Sync + 'static>() -> StrategyFactory<T> {
    Box::new(|| Box::new(RegExpRouter::<T>::new()))
}

/// Factory for [`TrieRouter`].
pub fn trie_factory<T: Clone + Send + Sync + 'static>() -> StrategyFactory<T> {
    Box::new(|| Box::new(TrieRouter::<T>::new()))
}

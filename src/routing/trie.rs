//! Segment trie router.
//!
//! # Responsibilities
//! - Insert compiled patterns one segment per trie level
//! - Walk every live branch for a request path, binding params on the way
//! - Return all matching handlers ordered by registration
//!
//! # Design Decisions
//! - Accepts every pattern the compiler produces; this is the general fallback
//! - Param and wildcard edges are tried in insertion order; the final sort by
//!   score makes the result independent of traversal order
//! - Param bindings travel with each branch by value; no shared scratch state

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;

use crate::routing::pattern::{self, Constraint, RoutePattern, Segment, WILDCARD_PARAM};
use crate::routing::{split_path, MatchResult, MethodFilter, Params, RouteMatch, RouteMatcher, RouterError};

/// Edge label of a trie node's child.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EdgeKey {
    Static(String),
    /// Param label as written (`:id`, `:id{[0-9]+}`).
    Param(String),
    Wildcard,
}

/// How a non-static edge consumes the path.
#[derive(Debug, Clone)]
enum EdgeMatcher {
    Param(Arc<str>),
    Constrained(Constraint),
    Wildcard,
}

#[derive(Debug)]
struct HandlerSlot<T> {
    method: MethodFilter,
    handler: T,
    score: u64,
    param_names: Vec<Arc<str>>,
}

#[derive(Debug)]
struct TrieNode<T> {
    children: HashMap<EdgeKey, TrieNode<T>>,
    /// Non-static edges in insertion order.
    patterns: Vec<(EdgeKey, EdgeMatcher)>,
    handlers: Vec<HandlerSlot<T>>,
}

impl<T> Default for TrieNode<T> {
    fn default() -> Self {
        Self {
            children: HashMap::new(),
            patterns: Vec::new(),
            handlers: Vec::new(),
        }
    }
}

impl<T: Clone> TrieNode<T> {
    fn collect(&self, method: &Method, bindings: &[(Arc<str>, String)], out: &mut Vec<(u64, RouteMatch<T>)>) {
        for slot in &self.handlers {
            if !slot.method.accepts(method) {
                continue;
            }
            let mut params = Params::new();
            for name in &slot.param_names {
                if let Some((_, value)) = bindings.iter().rev().find(|(k, _)| k == name) {
                    params.insert(name.clone(), value.clone());
                }
            }
            out.push((
                slot.score,
                RouteMatch {
                    handler: slot.handler.clone(),
                    params,
                },
            ));
        }
    }
}

/// One pending branch of a search.
struct Frame<'a, T> {
    node: &'a TrieNode<T>,
    index: usize,
    bindings: Vec<(Arc<str>, String)>,
    /// Reached by a wildcard consuming a single segment; the node's own
    /// handlers were already collected when the wildcard was reached.
    via_wildcard: bool,
}

/// Router that walks a trie of path segments.
#[derive(Debug)]
pub struct TrieRouter<T> {
    root: TrieNode<T>,
    order: u64,
}

impl<T> Default for TrieRouter<T> {
    fn default() -> Self {
        Self {
            root: TrieNode::default(),
            order: 0,
        }
    }
}

impl<T: Clone + Send + Sync> TrieRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, method: MethodFilter, pattern: &RoutePattern, handler: T) {
        self.order += 1;
        let mut node = &mut self.root;

        for segment in pattern.segments() {
            let (key, matcher) = match segment {
                Segment::Static(text) => (EdgeKey::Static(text.clone()), None),
                Segment::Param(name) => (EdgeKey::Param(segment.label()), Some(EdgeMatcher::Param(name.clone()))),
                Segment::ParamConstrained(c) => (
                    EdgeKey::Param(segment.label()),
                    Some(EdgeMatcher::Constrained(c.clone())),
                ),
                Segment::Wildcard => (EdgeKey::Wildcard, Some(EdgeMatcher::Wildcard)),
                // compile() never yields optional segments
                Segment::Optional(_) => continue,
            };

            if !node.children.contains_key(&key) {
                if let Some(matcher) = matcher {
                    node.patterns.push((key.clone(), matcher));
                }
            }
            node = node.children.entry(key).or_default();
        }

        node.handlers.push(HandlerSlot {
            method,
            handler,
            score: self.order,
            param_names: pattern.param_names(),
        });
    }

    fn search(&self, method: &Method, path: &str) -> MatchResult<T> {
        let parts = split_path(path);
        let mut found: Vec<(u64, RouteMatch<T>)> = Vec::new();
        let mut stack = vec![Frame {
            node: &self.root,
            index: 0,
            bindings: Vec::new(),
            via_wildcard: false,
        }];

        while let Some(frame) = stack.pop() {
            let node = frame.node;

            if frame.index == parts.len() {
                if !frame.via_wildcard {
                    node.collect(method, &frame.bindings, &mut found);
                }
                // `/hello/*` matches `/hello`
                if let Some(star) = node.children.get(&EdgeKey::Wildcard) {
                    let bindings = bind(&frame.bindings, WILDCARD_PARAM, String::new());
                    star.collect(method, &bindings, &mut found);
                }
                continue;
            }

            let part = parts[frame.index];

            if let Some(next) = node.children.get(&EdgeKey::Static(part.to_string())) {
                stack.push(Frame {
                    node: next,
                    index: frame.index + 1,
                    bindings: frame.bindings.clone(),
                    via_wildcard: false,
                });
            }

            for (key, matcher) in &node.patterns {
                let Some(child) = node.children.get(key) else {
                    continue;
                };
                match matcher {
                    EdgeMatcher::Wildcard => {
                        let rest = parts[frame.index..].join("/");
                        child.collect(method, &bind(&frame.bindings, WILDCARD_PARAM, rest), &mut found);
                        // Mid-path, `*` stands for one non-empty segment.
                        if part.is_empty() {
                            continue;
                        }
                        stack.push(Frame {
                            node: child,
                            index: frame.index + 1,
                            bindings: frame.bindings.clone(),
                            via_wildcard: true,
                        });
                    }
                    EdgeMatcher::Param(name) => {
                        if part.is_empty() {
                            continue;
                        }
                        stack.push(Frame {
                            node: child,
                            index: frame.index + 1,
                            bindings: bind(&frame.bindings, name, part.to_string()),
                            via_wildcard: false,
                        });
                    }
                    EdgeMatcher::Constrained(constraint) => {
                        // A constraint may consume several segments, e.g. `{.+\.js}`.
                        for end in frame.index + 1..=parts.len() {
                            let candidate = parts[frame.index..end].join("/");
                            if constraint.is_match(&candidate) {
                                stack.push(Frame {
                                    node: child,
                                    index: end,
                                    bindings: bind(&frame.bindings, constraint.name(), candidate),
                                    via_wildcard: false,
                                });
                            }
                        }
                    }
                }
            }
        }

        found.sort_by_key(|(score, _)| *score);
        found.dedup_by_key(|(score, _)| *score);
        found.into_iter().map(|(_, m)| m).collect()
    }
}

fn bind(bindings: &[(Arc<str>, String)], name: &str, value: String) -> Vec<(Arc<str>, String)> {
    let mut next = bindings.to_vec();
    next.push((Arc::from(name), value));
    next
}

impl<T: Clone + Send + Sync> RouteMatcher<T> for TrieRouter<T> {
    fn name(&self) -> &'static str {
        "TrieRouter"
    }

    fn add(&mut self, method: MethodFilter, path: &str, handler: T) -> Result<(), RouterError> {
        for pattern in pattern::compile(path)? {
            self.insert(method.clone(), &pattern, handler.clone());
        }
        Ok(())
    }

    fn build(&self) -> Result<(), RouterError> {
        Ok(())
    }

    fn match_route(&self, method: &Method, path: &str) -> Result<MatchResult<T>, RouterError> {
        Ok(self.search(method, path))
    }
}

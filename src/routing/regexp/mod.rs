//! Combined-regex router.
//!
//! # Responsibilities
//! - Buffer registrations until the first match
//! - Compile, per method, every route into one anchored alternation regex
//! - Serve fully literal paths from a hash map before touching the regex
//! - Report route sets it cannot represent as `UnsupportedPattern`
//!
//! # Design Decisions
//! - The table is built exactly once behind a `OnceLock`; concurrent first
//!   requests wait for the same build
//! - Each arm of the regex carries every handler that matches it (its own
//!   routes plus covering trailing wildcards), pre-sorted by registration
//! - Params are resolved through a source table (capture group or path
//!   suffix), never through raw capture indices

mod node;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use axum::http::Method;
use regex::{Regex, RegexBuilder};

use self::node::{FragmentNode, GroupMap, Token, LABEL_REGEX};
use crate::routing::pattern::{self, RoutePattern, Segment, WILDCARD_PARAM};
use crate::routing::{split_path, MatchResult, MethodFilter, Params, RouteMatch, RouteMatcher, RouterError};

/// Upper bound for the compiled size of one method's regex.
const REGEX_SIZE_LIMIT: usize = 32 * (1 << 20);

#[derive(Debug)]
struct Registration<T> {
    method: MethodFilter,
    pattern: RoutePattern,
    handler: T,
}

/// Where a handler's param value comes from.
#[derive(Debug, Clone, Copy)]
enum ParamSource {
    Group(usize),
    /// Request path with the first `n` segments removed.
    Suffix(usize),
}

#[derive(Debug)]
struct ArmHandler<T> {
    handler: T,
    params: Vec<(Arc<str>, ParamSource)>,
}

#[derive(Debug)]
struct Matcher<T> {
    regex: Option<Regex>,
    /// (capture group, arm), checked in order.
    arm_groups: Vec<(usize, usize)>,
    arms: Vec<Vec<ArmHandler<T>>>,
    static_map: HashMap<String, MatchResult<T>>,
}

impl<T: Clone> Matcher<T> {
    fn lookup(&self, path: &str) -> MatchResult<T> {
        if let Some(found) = self.static_map.get(path) {
            return found.clone();
        }
        let Some(regex) = &self.regex else {
            return Vec::new();
        };
        let Some(captures) = regex.captures(path) else {
            return Vec::new();
        };
        let Some(arm) = self
            .arm_groups
            .iter()
            .find(|(group, _)| captures.get(*group).is_some())
            .map(|(_, arm)| *arm)
        else {
            return Vec::new();
        };

        self.arms[arm]
            .iter()
            .map(|entry| {
                let mut params = Params::new();
                for (name, source) in &entry.params {
                    let value = match source {
                        ParamSource::Group(group) => captures
                            .get(*group)
                            .map(|m| m.as_str().to_string())
                            .unwrap_or_default(),
                        ParamSource::Suffix(skip) => suffix(path, *skip),
                    };
                    params.insert(name.clone(), value);
                }
                RouteMatch {
                    handler: entry.handler.clone(),
                    params,
                }
            })
            .collect()
    }
}

#[derive(Debug)]
struct CompiledTables<T> {
    by_method: HashMap<Method, Matcher<T>>,
    all: Matcher<T>,
}

/// Router that answers from one precompiled regex per method.
#[derive(Debug)]
pub struct RegExpRouter<T> {
    routes: Vec<Registration<T>>,
    tables: OnceLock<Result<CompiledTables<T>, RouterError>>,
}

impl<T> Default for RegExpRouter<T> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            tables: OnceLock::new(),
        }
    }
}

impl<T: Clone + Send + Sync> RegExpRouter<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<&CompiledTables<T>, RouterError> {
        self.tables
            .get_or_init(|| self.compile_tables())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn compile_tables(&self) -> Result<CompiledTables<T>, RouterError> {
        let mut methods: Vec<&Method> = Vec::new();
        for route in &self.routes {
            if let MethodFilter::Exact(m) = &route.method {
                if !methods.contains(&m) {
                    methods.push(m);
                }
            }
        }

        let mut by_method = HashMap::with_capacity(methods.len());
        for method in methods {
            let relevant: Vec<&Registration<T>> = self
                .routes
                .iter()
                .filter(|r| r.method.accepts(method))
                .collect();
            by_method.insert(method.clone(), build_matcher(&relevant)?);
        }

        let any: Vec<&Registration<T>> = self
            .routes
            .iter()
            .filter(|r| r.method == MethodFilter::Any)
            .collect();
        let all = build_matcher(&any)?;

        tracing::debug!(
            routes = self.routes.len(),
            methods = by_method.len(),
            "regexp router tables built"
        );
        Ok(CompiledTables { by_method, all })
    }
}

/// Build one method's matcher. `routes` is in registration order, which is
/// also the order of every arm's handler list.
fn build_matcher<T: Clone>(routes: &[&Registration<T>]) -> Result<Matcher<T>, RouterError> {
    // Distinct patterns become arms, in first-registration order.
    let mut arm_patterns: Vec<&RoutePattern> = Vec::new();
    for route in routes {
        if !arm_patterns.iter().any(|p| p.path() == route.pattern.path()) {
            arm_patterns.push(&route.pattern);
        }
    }

    // Dynamic arms first, shortest first; literal paths are only checked.
    let mut insertion: Vec<usize> = (0..arm_patterns.len()).collect();
    insertion.sort_by_key(|&i| {
        let p = arm_patterns[i];
        (p.is_static(), p.path().len())
    });

    let mut trie = FragmentNode::default();
    let mut next_var = 0;
    let mut arm_vars: Vec<HashMap<usize, usize>> = vec![HashMap::new(); arm_patterns.len()];
    for &i in &insertion {
        let pattern = arm_patterns[i];
        let tokens = tokenize(pattern)?;
        let arm = if pattern.is_static() { None } else { Some(i) };
        let vars = trie
            .insert(&tokens, arm, &mut next_var)
            .map_err(|_| RouterError::UnsupportedPattern(pattern.path().to_string()))?;
        arm_vars[i] = vars.into_iter().collect();
    }

    let mut groups = GroupMap::default();
    let body = trie.write(&mut groups);
    let regex = if body.is_empty() {
        None
    } else {
        let compiled = RegexBuilder::new(&format!("^{body}"))
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| RouterError::UnsupportedPattern(format!("combined route regex: {e}")))?;
        Some(compiled)
    };

    let mut arms = Vec::with_capacity(arm_patterns.len());
    let mut static_map = HashMap::new();
    for (i, target) in arm_patterns.iter().enumerate() {
        let mut entries = Vec::new();
        for route in routes {
            let own = route.pattern.path() == target.path();
            if !own && !covers(&route.pattern, target)? {
                continue;
            }
            let params = param_sources(&route.pattern, own, &arm_vars[i], &groups)?;
            entries.push(ArmHandler {
                handler: route.handler.clone(),
                params,
            });
        }

        if target.is_static() {
            let resolved = entries
                .iter()
                .map(|entry| {
                    let mut params = Params::new();
                    for (name, source) in &entry.params {
                        if let ParamSource::Suffix(skip) = source {
                            params.insert(name.clone(), suffix(target.path(), *skip));
                        }
                    }
                    RouteMatch {
                        handler: entry.handler.clone(),
                        params,
                    }
                })
                .collect();
            static_map.insert(target.path().to_string(), resolved);
            arms.push(Vec::new());
        } else {
            arms.push(entries);
        }
    }

    Ok(Matcher {
        regex,
        arm_groups: groups.arms,
        arms,
        static_map,
    })
}

fn tokenize(pattern: &RoutePattern) -> Result<Vec<Token>, RouterError> {
    let segments = pattern.segments();
    let last = segments.len().saturating_sub(1);
    let mut tokens = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        match segment {
            Segment::Wildcard if i == last => tokens.push(Token::Tail { segment: i }),
            Segment::Static(text) => {
                tokens.push(Token::Char('/'));
                tokens.extend(text.chars().map(Token::Char));
            }
            Segment::Param(_) | Segment::Wildcard => {
                tokens.push(Token::Char('/'));
                tokens.push(Token::Pattern {
                    segment: i,
                    source: LABEL_REGEX.to_string(),
                });
            }
            Segment::ParamConstrained(constraint) => {
                tokens.push(Token::Char('/'));
                tokens.push(Token::Pattern {
                    segment: i,
                    source: constraint.embeddable()?,
                });
            }
            Segment::Optional(_) => {
                return Err(RouterError::invalid(pattern.path(), "optional segment after expansion"));
            }
        }
    }
    Ok(tokens)
}

/// Segments occupying the same regex fragment.
fn same_fragment(a: &Segment, b: &Segment) -> bool {
    match (a, b) {
        (Segment::Static(x), Segment::Static(y)) => x == y,
        (Segment::Param(_) | Segment::Wildcard, Segment::Param(_) | Segment::Wildcard) => true,
        (Segment::ParamConstrained(x), Segment::ParamConstrained(y)) => x.source() == y.source(),
        _ => false,
    }
}

/// True if the trailing wildcard route `wildcard` matches every path `target` matches.
fn covers(wildcard: &RoutePattern, target: &RoutePattern) -> Result<bool, RouterError> {
    if !wildcard.has_tail_wildcard() {
        return Ok(false);
    }
    let prefix = &wildcard.segments()[..wildcard.segments().len() - 1];
    let target_segments = target.segments();
    let target_len = if target.has_tail_wildcard() {
        target_segments.len() - 1
    } else {
        target_segments.len()
    };
    if target_len < prefix.len()
        || !prefix
            .iter()
            .zip(target_segments)
            .all(|(w, t)| same_fragment(w, t))
    {
        return Ok(false);
    }
    // The suffix is computed by segment count, which a multi-segment
    // constraint in the prefix would break.
    if prefix.iter().any(|s| matches!(s, Segment::ParamConstrained(_))) {
        return Err(RouterError::UnsupportedPattern(wildcard.path().to_string()));
    }
    Ok(true)
}

fn param_sources(
    pattern: &RoutePattern,
    own: bool,
    arm_vars: &HashMap<usize, usize>,
    groups: &GroupMap,
) -> Result<Vec<(Arc<str>, ParamSource)>, RouterError> {
    let segments = pattern.segments();
    let last = segments.len().saturating_sub(1);
    let mut sources = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        let tail = i == last && matches!(segment, Segment::Wildcard);
        let name = match segment {
            _ if tail => Arc::from(WILDCARD_PARAM),
            Segment::Param(name) => name.clone(),
            Segment::ParamConstrained(c) => c.name().clone(),
            _ => continue,
        };

        if tail && !own {
            sources.push((name, ParamSource::Suffix(i)));
            continue;
        }
        let group = arm_vars
            .get(&i)
            .and_then(|var| groups.vars.get(var))
            .copied()
            .ok_or_else(|| RouterError::UnsupportedPattern(pattern.path().to_string()))?;
        sources.push((name, ParamSource::Group(group)));
    }
    Ok(sources)
}

fn suffix(path: &str, skip: usize) -> String {
    split_path(path).get(skip..).map(|rest| rest.join("/")).unwrap_or_default()
}

impl<T: Clone + Send + Sync> RouteMatcher<T> for RegExpRouter<T> {
    fn name(&self) -> &'static str {
        "RegExpRouter"
    }

    fn add(&mut self, method: MethodFilter, path: &str, handler: T) -> Result<(), RouterError> {
        if self.tables.get().is_some() {
            return Err(RouterError::AlreadyBuilt);
        }
        for pattern in pattern::compile(path)? {
            self.routes.push(Registration {
                method: method.clone(),
                pattern,
                handler: handler.clone(),
            });
        }
        Ok(())
    }

    fn build(&self) -> Result<(), RouterError> {
        self.tables().map(|_| ())
    }

    fn match_route(&self, method: &Method, path: &str) -> Result<MatchResult<T>, RouterError> {
        let tables = self.tables()?;
        let matcher = tables.by_method.get(method).unwrap_or(&tables.all);
        Ok(matcher.lookup(path))
    }
}

impl<T> RegExpRouter<T> {
    /// Number of registered patterns, after optional expansion.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(routes: &[(&str, &str, &'static str)]) -> RegExpRouter<&'static str> {
        let mut router = RegExpRouter::new();
        for (method, path, handler) in routes {
            router.add(method.parse().unwrap(), path, *handler).unwrap();
        }
        router
    }

    fn handlers(router: &RegExpRouter<&'static str>, method: Method, path: &str) -> Vec<&'static str> {
        router
            .match_route(&method, path)
            .unwrap()
            .into_iter()
            .map(|m| m.handler)
            .collect()
    }

    #[test]
    fn root_and_param() {
        let r = router(&[("GET", "/", "a"), ("GET", "/:id", "b")]);
        assert_eq!(handlers(&r, Method::GET, "/"), vec!["a"]);

        let m = r.match_route(&Method::GET, "/42").unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].handler, "b");
        assert_eq!(m[0].params.get_raw("id"), Some("42"));

        assert!(handlers(&r, Method::GET, "/42/x").is_empty());
    }

    #[test]
    fn middleware_wildcard_runs_before_route() {
        let r = router(&[("ALL", "/*", "logging"), ("GET", "/health", "c")]);
        assert_eq!(handlers(&r, Method::GET, "/health"), vec!["logging", "c"]);
        assert_eq!(handlers(&r, Method::GET, "/other"), vec!["logging"]);
        assert_eq!(handlers(&r, Method::DELETE, "/health"), vec!["logging"]);
    }

    #[test]
    fn registration_order_is_preserved_for_wildcards_registered_later() {
        let r = router(&[("GET", "/health", "c"), ("ALL", "/*", "logging")]);
        assert_eq!(handlers(&r, Method::GET, "/health"), vec!["c", "logging"]);
    }

    #[test]
    fn tail_wildcard_binds_the_rest() {
        let r = router(&[("GET", "/files/*", "files")]);
        for (path, rest) in [("/files", ""), ("/files/", ""), ("/files/a/b/c", "a/b/c")] {
            let m = r.match_route(&Method::GET, path).unwrap();
            assert_eq!(m.len(), 1, "{path}");
            assert_eq!(m[0].params.get_raw("*"), Some(rest), "{path}");
        }
        assert!(handlers(&r, Method::GET, "/filesx").is_empty());
    }

    #[test]
    fn covering_wildcard_gets_suffix_param() {
        let r = router(&[("ALL", "/api/*", "api"), ("GET", "/api/users/:id", "user")]);
        let m = r.match_route(&Method::GET, "/api/users/7").unwrap();
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].params.get_raw("*"), Some("users/7"));
        assert_eq!(m[1].params.get_raw("id"), Some("7"));
        assert_eq!(m[1].params.get_raw("*"), None);
    }

    #[test]
    fn optional_param() {
        let r = router(&[("GET", "/a/:b?", "d")]);
        let bare = r.match_route(&Method::GET, "/a").unwrap();
        assert_eq!(bare.len(), 1);
        assert!(bare[0].params.is_empty());

        let with = r.match_route(&Method::GET, "/a/5").unwrap();
        assert_eq!(with[0].params.get_raw("b"), Some("5"));

        assert!(handlers(&r, Method::GET, "/a/x/y").is_empty());
    }

    #[test]
    fn constrained_param() {
        let r = router(&[("GET", "/users/:id{[0-9]+}", "numeric")]);
        assert_eq!(handlers(&r, Method::GET, "/users/42"), vec!["numeric"]);
        assert!(handlers(&r, Method::GET, "/users/abc").is_empty());
    }

    #[test]
    fn alternation_constraint_is_rewritten() {
        let r = router(&[("GET", "/pets/:kind{(cat|dog)}/:name", "pet")]);
        let m = r.match_route(&Method::GET, "/pets/dog/rex").unwrap();
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].params.get_raw("kind"), Some("dog"));
        assert_eq!(m[0].params.get_raw("name"), Some("rex"));
        assert!(handlers(&r, Method::GET, "/pets/cow/rex").is_empty());
    }

    #[test]
    fn capturing_group_is_unsupported() {
        let r = router(&[("GET", "/x/:y{(foo)}", "foo")]);
        let err = r.match_route(&Method::GET, "/x/foo").unwrap_err();
        assert!(err.is_unsupported());
        assert!(r.build().unwrap_err().is_unsupported());
    }

    #[test]
    fn ambiguous_routes_are_unsupported() {
        let r = router(&[("GET", "/users/:id", "param"), ("GET", "/users/new", "static")]);
        assert!(r.build().unwrap_err().is_unsupported());

        let r = router(&[("GET", "/users/:id{[0-9]+}", "n"), ("GET", "/users/:name", "s")]);
        assert!(r.build().unwrap_err().is_unsupported());

        let r = router(&[("GET", "/a/:x", "x"), ("GET", "/a/:y", "y")]);
        assert!(r.build().unwrap_err().is_unsupported());
    }

    #[test]
    fn static_paths_share_a_prefix_with_wildcards() {
        let r = router(&[("GET", "/a/*", "tail"), ("GET", "/a/b", "b")]);
        let m = r.match_route(&Method::GET, "/a/b").unwrap();
        assert_eq!(m.iter().map(|m| m.handler).collect::<Vec<_>>(), vec!["tail", "b"]);
        assert_eq!(m[0].params.get_raw("*"), Some("b"));
        assert_eq!(handlers(&r, Method::GET, "/a/c"), vec!["tail"]);
    }

    #[test]
    fn unknown_method_uses_all_table() {
        let r = router(&[("GET", "/a", "get"), ("ALL", "/a", "any")]);
        assert_eq!(handlers(&r, Method::GET, "/a"), vec!["get", "any"]);
        assert_eq!(handlers(&r, Method::PATCH, "/a"), vec!["any"]);
    }

    #[test]
    fn add_after_build_fails() {
        let mut r = router(&[("GET", "/a", "a")]);
        assert_eq!(handlers(&r, Method::GET, "/a"), vec!["a"]);
        assert_eq!(
            r.add(MethodFilter::Exact(Method::GET), "/b", "b").unwrap_err(),
            RouterError::AlreadyBuilt
        );
    }

    #[test]
    fn empty_router_matches_nothing() {
        let r: RegExpRouter<&'static str> = RegExpRouter::new();
        assert!(handlers(&r, Method::GET, "/").is_empty());
    }

    #[test]
    fn memoized_match_is_stable() {
        let r = router(&[("ALL", "/*", "mw"), ("GET", "/a/:b", "b")]);
        let first = handlers(&r, Method::GET, "/a/1");
        let second = handlers(&r, Method::GET, "/a/1");
        assert_eq!(first, vec!["mw", "b"]);
        assert_eq!(first, second);
    }
}

//! Matching properties that must hold for every routing strategy.

mod common;

use axum::http::Method;
use common::{matched, strategies};
use edge_router::routing::{MethodFilter, RouteMatcher, RouterError, SmartRouter};

type Found = Vec<(&'static str, Vec<(String, String)>)>;

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Assert that every strategy able to hold `routes` answers `expected`, and
/// that the trie and smart routers always can.
fn assert_all(routes: &[(&str, &str, &'static str)], method: &str, path: &str, expected: &Found) {
    for router in strategies(routes) {
        match matched(&*router, method, path) {
            Some(found) => assert_eq!(&found, expected, "{} {method} {path}", router.name()),
            None => assert_eq!(router.name(), "RegExpRouter", "only the regex strategy may refuse a route set"),
        }
    }
}

#[test]
fn scenario_root_and_param() {
    let routes = [("GET", "/", "A"), ("GET", "/:id", "B")];
    assert_all(&routes, "GET", "/42", &vec![("B", params(&[("id", "42")]))]);
    assert_all(&routes, "GET", "/", &vec![("A", params(&[]))]);
}

#[test]
fn scenario_middleware_runs_before_handler() {
    let routes = [("ALL", "/*", "logging"), ("GET", "/health", "C")];
    assert_all(
        &routes,
        "GET",
        "/health",
        &vec![("logging", params(&[("*", "health")])), ("C", params(&[]))],
    );
    assert_all(&routes, "POST", "/health", &vec![("logging", params(&[("*", "health")]))]);
}

#[test]
fn scenario_optional_param() {
    let routes = [("GET", "/a/:b?", "D")];
    assert_all(&routes, "GET", "/a", &vec![("D", params(&[]))]);
    assert_all(&routes, "GET", "/a/5", &vec![("D", params(&[("b", "5")]))]);
    assert_all(&routes, "GET", "/a/x/y", &vec![]);
}

#[test]
fn tail_wildcard_covers_the_prefix_and_everything_below() {
    let routes = [("GET", "/files/*", "files")];
    for (path, rest) in [("/files", ""), ("/files/", ""), ("/files/a/b/c", "a/b/c")] {
        assert_all(&routes, "GET", path, &vec![("files", params(&[("*", rest)]))]);
    }
    assert_all(&routes, "GET", "/filesystem", &vec![]);
}

#[test]
fn constrained_param_filters_values() {
    let routes = [("GET", "/users/:id{[0-9]+}", "numeric")];
    assert_all(&routes, "GET", "/users/42", &vec![("numeric", params(&[("id", "42")]))]);
    assert_all(&routes, "GET", "/users/abc", &vec![]);
}

#[test]
fn constrained_and_open_params_do_not_collide() {
    let routes = [("GET", "/users/:id{[0-9]+}", "numeric"), ("GET", "/users/:name", "named")];
    assert_all(
        &routes,
        "GET",
        "/users/42",
        &vec![("numeric", params(&[("id", "42")])), ("named", params(&[("name", "42")]))],
    );
    assert_all(&routes, "GET", "/users/abc", &vec![("named", params(&[("name", "abc")]))]);
}

#[test]
fn anchored_constraint_matches_like_an_unanchored_one() {
    let routes = [("GET", "/users/:id{^[0-9]+$}", "num")];
    assert_all(&routes, "GET", "/users/42", &vec![("num", params(&[("id", "42")]))]);
    assert_all(&routes, "GET", "/users/4x", &vec![]);

    let mut smart = SmartRouter::new_default();
    smart.add(MethodFilter::Exact(Method::GET), "/users/:id{^[0-9]+$}", "num").unwrap();
    assert_eq!(smart.match_route(&Method::GET, "/users/42").unwrap().len(), 1);
    assert_eq!(smart.active_strategy(), Some("RegExpRouter"));
}

#[test]
fn mid_path_wildcard_needs_a_non_empty_segment() {
    let routes = [("GET", "/a/*/c", "mid")];
    assert_all(&routes, "GET", "/a/b/c", &vec![("mid", params(&[]))]);
    assert_all(&routes, "GET", "/a//c", &vec![]);
}

#[test]
fn sibling_constraints_run_in_registration_order() {
    let routes = [("GET", "/x/:hex{[0-9a-f]+}", "hex"), ("GET", "/x/:num{[0-9]+}", "num")];
    assert_all(
        &routes,
        "GET",
        "/x/42",
        &vec![("hex", params(&[("hex", "42")])), ("num", params(&[("num", "42")]))],
    );
    assert_all(&routes, "GET", "/x/ab", &vec![("hex", params(&[("hex", "ab")]))]);

    let reversed = [("GET", "/x/:num{[0-9]+}", "num"), ("GET", "/x/:hex{[0-9a-f]+}", "hex")];
    assert_all(
        &reversed,
        "GET",
        "/x/42",
        &vec![("num", params(&[("num", "42")])), ("hex", params(&[("hex", "42")]))],
    );
}

#[test]
fn registration_order_is_execution_order() {
    let routes = [("GET", "/same", "H1"), ("GET", "/same", "H2"), ("ALL", "/same", "H3")];
    assert_all(
        &routes,
        "GET",
        "/same",
        &vec![("H1", params(&[])), ("H2", params(&[])), ("H3", params(&[]))],
    );

    let routes = [("GET", "/users/:id", "param"), ("ALL", "/*", "logger"), ("GET", "/users/new", "static")];
    assert_all(
        &routes,
        "GET",
        "/users/new",
        &vec![
            ("param", params(&[("id", "new")])),
            ("logger", params(&[("*", "users/new")])),
            ("static", params(&[])),
        ],
    );
}

#[test]
fn method_filtering() {
    let routes = [("GET", "/a", "get"), ("POST", "/a", "post"), ("ALL", "/a", "any")];
    assert_all(&routes, "GET", "/a", &vec![("get", params(&[])), ("any", params(&[]))]);
    assert_all(&routes, "POST", "/a", &vec![("post", params(&[])), ("any", params(&[]))]);
    assert_all(&routes, "DELETE", "/a", &vec![("any", params(&[]))]);
}

#[test]
fn repeated_matches_are_identical() {
    let routes = [("ALL", "/*", "mw"), ("GET", "/posts/:id", "post"), ("GET", "/posts/:id/comments", "comments")];
    for router in strategies(&routes) {
        let first = matched(&*router, "GET", "/posts/9/comments");
        let second = matched(&*router, "GET", "/posts/9/comments");
        assert_eq!(first, second, "{}", router.name());
    }
}

#[test]
fn unsafe_capturing_group_falls_back_to_the_trie() {
    let routes = [("GET", "/x/:y{(foo)}", "foo")];
    let found = strategies(&routes)
        .iter()
        .map(|r| (r.name(), matched(&**r, "GET", "/x/foo")))
        .collect::<Vec<_>>();

    assert_eq!(found[1], ("RegExpRouter", None));
    let expected = Some(vec![("foo", params(&[("y", "foo")]))]);
    assert_eq!(found[0], ("TrieRouter", expected.clone()));
    assert_eq!(found[2], ("SmartRouter", expected));

    let mut smart = SmartRouter::new_default();
    smart.add(MethodFilter::Exact(Method::GET), "/x/:y{(foo)}", "foo").unwrap();
    smart.build().unwrap();
    assert_eq!(smart.active_strategy(), Some("TrieRouter"));
}

#[test]
fn representable_routes_select_the_regex_strategy() {
    let mut smart = SmartRouter::new_default();
    smart.add(MethodFilter::Any, "/*", "mw").unwrap();
    smart.add(MethodFilter::Exact(Method::GET), "/users/:id", "user").unwrap();
    assert!(smart.match_route(&Method::GET, "/users/1").is_ok());
    assert_eq!(smart.active_strategy(), Some("RegExpRouter"));

    assert_eq!(
        smart.add(MethodFilter::Exact(Method::GET), "/late", "late").unwrap_err(),
        RouterError::AlreadyBuilt
    );
}

#[test]
fn percent_encoded_params_decode_on_read() {
    for router in strategies(&[("GET", "/tags/:tag", "tag")]) {
        let matches = router.match_route(&Method::GET, "/tags/caf%C3%A9").unwrap();
        assert_eq!(matches[0].params.get_raw("tag"), Some("caf%C3%A9"));
        assert_eq!(matches[0].params.get("tag").as_deref(), Some("café"));
    }
}

//! Route registry and request entry point.
//!
//! # Responsibilities
//! - Accumulate `(method, path, handler)` registrations, with base paths
//!   and mounted sub-apps
//! - Freeze them into an immutable [`App`] backed by a resolved router
//! - Turn every request into a response: match, run the chain, fall back
//!   to the not-found and error handlers

use std::borrow::Cow;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use futures_util::future::BoxFuture;
use percent_encoding::percent_decode_str;
use serde::Serialize;

use crate::dispatch::{
    error_handler_fn, not_found_fn, Dispatcher, ErrorHandler, Handler, HandlerResult, Next, NotFoundHandler,
};
use crate::error::{Error, Result};
use crate::http::context::{default_not_found, plain};
use crate::http::Context;
use crate::routing::{pattern, MethodFilter, RouteMatcher, RouterError, SmartRouter, Strategy};

/// A registered route, as listed by [`App::routes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteInfo {
    pub method: String,
    pub path: String,
}

struct Registration {
    method: MethodFilter,
    path: String,
    handler: Arc<dyn Handler>,
}

/// Collects routes; consumed by [`AppBuilder::build`].
pub struct AppBuilder {
    base_path: String,
    routes: Vec<Registration>,
    errors: Vec<RouterError>,
    error_handler: Option<ErrorHandler>,
    not_found: Option<NotFoundHandler>,
    strict: bool,
    strategy: Strategy,
    body_limit: usize,
}

impl Default for AppBuilder {
    fn default() -> Self {
        Self {
            base_path: String::new(),
            routes: Vec::new(),
            errors: Vec::new(),
            error_handler: None,
            not_found: None,
            strict: true,
            strategy: Strategy::Smart,
            body_limit: usize::MAX,
        }
    }
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Exact(Method::GET), path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Exact(Method::POST), path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Exact(Method::PUT), path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Exact(Method::DELETE), path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Exact(Method::PATCH), path, handler)
    }

    pub fn options(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Exact(Method::OPTIONS), path, handler)
    }

    /// Register for every method.
    pub fn all(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.on(MethodFilter::Any, path, handler)
    }

    pub fn on(self, method: MethodFilter, path: &str, handler: impl Handler + 'static) -> Self {
        self.on_arc(method, path, Arc::new(handler))
    }

    /// Register one handler for several methods.
    pub fn on_methods(mut self, methods: &[MethodFilter], path: &str, handler: impl Handler + 'static) -> Self {
        let handler: Arc<dyn Handler> = Arc::new(handler);
        for method in methods {
            self = self.on_arc(method.clone(), path, handler.clone());
        }
        self
    }

    /// Middleware for every request under the base path (`ALL <base>/*`).
    pub fn use_middleware(self, handler: impl Handler + 'static) -> Self {
        self.all("*", handler)
    }

    /// Middleware for every method on `path`.
    pub fn use_at(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.all(path, handler)
    }

    /// Prefix for routes registered after this call.
    pub fn base_path(mut self, path: &str) -> Self {
        self.base_path = merge_path(&self.base_path, path);
        self
    }

    /// Mount `sub` under `prefix`. The sub-app's error handler, if any,
    /// applies only to its own routes.
    pub fn route(mut self, prefix: &str, sub: AppBuilder) -> Self {
        let mount = merge_path(&self.base_path, prefix);
        self.errors.extend(sub.errors);
        for registration in sub.routes {
            let handler: Arc<dyn Handler> = match &sub.error_handler {
                Some(on_error) => Arc::new(Scoped {
                    inner: registration.handler,
                    on_error: on_error.clone(),
                }),
                None => registration.handler,
            };
            let path = merge_path(&mount, &registration.path);
            self.routes.push(Registration {
                method: registration.method,
                path,
                handler,
            });
        }
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(Arc<Error>, &'a mut Context) -> BoxFuture<'a, Response> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(f));
        self
    }

    pub fn not_found<F>(mut self, f: F) -> Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Response> + Send + Sync + 'static,
    {
        self.not_found = Some(Arc::new(f));
        self
    }

    /// In non-strict mode `/a/` is routed as `/a`.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Largest request body handlers may read.
    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    fn on_arc(mut self, method: MethodFilter, path: &str, handler: Arc<dyn Handler>) -> Self {
        let path = merge_path(&self.base_path, path);
        if let Err(err) = pattern::compile(&path) {
            tracing::warn!(%method, path = %path, error = %err, "rejected route registration");
            self.errors.push(err);
            return self;
        }
        self.routes.push(Registration { method, path, handler });
        self
    }

    /// Freeze the routes and select the matching strategy.
    pub fn build(self) -> Result<App> {
        if let Some(err) = self.errors.into_iter().next() {
            return Err(err.into());
        }

        let mut router = SmartRouter::new(self.strategy.candidates());
        let mut listing = Vec::with_capacity(self.routes.len());
        for registration in self.routes {
            listing.push(RouteInfo {
                method: registration.method.to_string(),
                path: registration.path.clone(),
            });
            router.add(registration.method, &registration.path, registration.handler)?;
        }
        router.build()?;

        tracing::info!(
            routes = listing.len(),
            strategy = router.active_strategy().unwrap_or("none"),
            strict = self.strict,
            "app built"
        );

        Ok(App {
            router,
            routes: listing,
            error_handler: self.error_handler.unwrap_or_else(|| error_handler_fn(default_on_error)),
            not_found: self.not_found.unwrap_or_else(|| not_found_fn(default_on_not_found)),
            strict: self.strict,
            body_limit: self.body_limit,
        })
    }
}

/// Immutable, ready-to-serve route table plus its handlers.
pub struct App {
    router: SmartRouter<Arc<dyn Handler>>,
    routes: Vec<RouteInfo>,
    error_handler: ErrorHandler,
    not_found: NotFoundHandler,
    strict: bool,
    body_limit: usize,
}

impl App {
    pub fn builder() -> AppBuilder {
        AppBuilder::new()
    }

    /// Registrations in order.
    pub fn routes(&self) -> &[RouteInfo] {
        &self.routes
    }

    /// Name of the strategy serving matches.
    pub fn strategy(&self) -> &'static str {
        self.router.active_strategy().unwrap_or("none")
    }

    /// Produce a response for `request`; never fails.
    pub async fn dispatch(&self, request: Request<Body>) -> Response {
        if request.method() != Method::HEAD {
            return self.dispatch_as(request).await;
        }

        // HEAD is answered by the GET route, without a body.
        let (mut parts, body) = request.into_parts();
        parts.method = Method::GET;
        let res = self.dispatch_as(Request::from_parts(parts, body)).await;
        let (parts, _) = res.into_parts();
        Response::from_parts(parts, Body::empty())
    }

    async fn dispatch_as(&self, request: Request<Body>) -> Response {
        let method = request.method().clone();
        let path = self.route_path(request.uri().path()).into_owned();
        let mut ctx = Context::new(request)
            .with_not_found(Some(self.not_found.clone()))
            .with_body_limit(self.body_limit);

        let matches = match self.router.match_route(&method, &path) {
            Ok(matches) => matches,
            Err(err) => return self.fail(err.into(), &mut ctx).await,
        };
        tracing::debug!(method = %method, path = %path, matched = matches.len(), "dispatching");

        let (chain, params): (Vec<_>, Vec<_>) = matches.into_iter().map(|m| (m.handler, m.params)).unzip();
        ctx.set_matches(params);

        let dispatcher = Dispatcher::compose(&chain, Some(&self.error_handler), Some(&self.not_found));
        if let Err(err) = dispatcher.run(&mut ctx).await {
            return self.fail(err, &mut ctx).await;
        }

        match ctx.take_res() {
            Some(res) => res,
            None => self.fail(Error::NotFinalized, &mut ctx).await,
        }
    }

    async fn fail(&self, err: Error, ctx: &mut Context) -> Response {
        let err = Arc::new(err);
        ctx.set_error(err.clone());
        (self.error_handler)(err, ctx).await
    }

    fn route_path<'p>(&self, path: &'p str) -> Cow<'p, str> {
        let mut path = path;
        if !self.strict && path.len() > 1 {
            if let Some(stripped) = path.strip_suffix('/') {
                path = stripped;
            }
        }
        decode_path(path)
    }
}

/// Percent-decode a request path for matching. `%2F` and `%25` stay encoded
/// so segment boundaries hold and params still decode once on read. A chunk
/// that does not decode to UTF-8 is matched as sent.
fn decode_path(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(at) = find_kept_escape(rest) {
        push_decoded(&mut out, &rest[..at]);
        out.push_str(&rest[at..at + 3]);
        rest = &rest[at + 3..];
    }
    push_decoded(&mut out, rest);
    Cow::Owned(out)
}

fn find_kept_escape(path: &str) -> Option<usize> {
    path.match_indices('%').map(|(i, _)| i).find(|&i| {
        path.get(i + 1..i + 3)
            .is_some_and(|hex| hex.eq_ignore_ascii_case("2f") || hex == "25")
    })
}

fn push_decoded(out: &mut String, chunk: &str) {
    match percent_decode_str(chunk).decode_utf8() {
        Ok(decoded) => out.push_str(&decoded),
        Err(_) => out.push_str(chunk),
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("router", &self.router)
            .field("routes", &self.routes.len())
            .field("strict", &self.strict)
            .finish_non_exhaustive()
    }
}

/// Runs a mounted sub-app's handler under the sub-app's error handler.
struct Scoped {
    inner: Arc<dyn Handler>,
    on_error: ErrorHandler,
}

impl Handler for Scoped {
    fn call<'a>(&'a self, ctx: &'a mut Context, next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            match self.inner.call(ctx, next).await {
                Err(err) => {
                    let err = Arc::new(err);
                    ctx.set_error(err.clone());
                    let res = (self.on_error)(err, ctx).await;
                    ctx.set_res(res);
                    Ok(None)
                }
                handled => handled,
            }
        })
    }
}

fn default_on_error(err: Arc<Error>, _ctx: &mut Context) -> BoxFuture<'_, Response> {
    Box::pin(async move {
        match &*err {
            Error::Http { status, message } => plain(*status, message),
            other => {
                let status = other.status();
                if status.is_server_error() {
                    tracing::error!(error = %other, "unhandled error");
                    plain(status, "Internal Server Error")
                } else {
                    plain(status, &other.to_string())
                }
            }
        }
    })
}

fn default_on_not_found(_ctx: &mut Context) -> BoxFuture<'_, Response> {
    Box::pin(async { default_not_found() })
}

/// Join a base path and a route path with exactly one `/` between them.
pub(crate) fn merge_path(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.strip_prefix('/').unwrap_or(path);
    match (base.is_empty(), path.is_empty()) {
        (true, true) => "/".to_string(),
        (false, true) => base.to_string(),
        (true, false) => format!("/{path}"),
        (false, false) => format!("{base}/{path}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_paths() {
        assert_eq!(merge_path("", "/"), "/");
        assert_eq!(merge_path("", "*"), "/*");
        assert_eq!(merge_path("/api", "/"), "/api");
        assert_eq!(merge_path("/api/", "/users"), "/api/users");
        assert_eq!(merge_path("/api", "users/:id"), "/api/users/:id");
        assert_eq!(merge_path("/", "/x"), "/x");
    }

    #[test]
    fn decodes_paths_except_slash_and_percent() {
        assert_eq!(decode_path("/plain"), "/plain");
        assert_eq!(decode_path("/caf%C3%A9"), "/café");
        assert_eq!(decode_path("/a%20b/c"), "/a b/c");
        assert_eq!(decode_path("/a%2Fb/%2fc"), "/a%2Fb/%2fc");
        assert_eq!(decode_path("/100%25/%2541"), "/100%25/%2541");
        assert_eq!(decode_path("/bad%FF"), "/bad%FF");
    }

    #[test]
    fn invalid_route_surfaces_from_build() {
        use crate::dispatch::handler_fn;

        let err = App::builder()
            .get("/ok", handler_fn(|c, _n| Box::pin(async move { Ok(Some(c.text("ok"))) })))
            .get("/bad/:id{[0-9}", handler_fn(|c, _n| Box::pin(async move { Ok(Some(c.text("bad"))) })))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Router(RouterError::InvalidPattern { .. })));
    }

    #[test]
    fn non_strict_strips_one_trailing_slash() {
        let app = App::builder().strict(false).build().unwrap();
        assert_eq!(app.route_path("/a/"), "/a");
        assert_eq!(app.route_path("/"), "/");
        let strict = App::builder().build().unwrap();
        assert_eq!(strict.route_path("/a/"), "/a/");
    }

    #[test]
    fn lists_routes_with_base_path() {
        use crate::dispatch::handler_fn;

        let api = App::builder().get("/users", handler_fn(|c, _n| Box::pin(async move { Ok(Some(c.text("u"))) })));
        let app = App::builder()
            .use_middleware(handler_fn(|c, n| {
                Box::pin(async move {
                    n.run(c).await?;
                    Ok(None)
                })
            }))
            .route("/api", api)
            .base_path("/v2")
            .get("/ping", handler_fn(|c, _n| Box::pin(async move { Ok(Some(c.text("pong"))) })))
            .build()
            .unwrap();

        let listed: Vec<(String, String)> = app
            .routes()
            .iter()
            .map(|r| (r.method.clone(), r.path.clone()))
            .collect();
        assert_eq!(
            listed,
            vec![
                ("ALL".to_string(), "/*".to_string()),
                ("GET".to_string(), "/api/users".to_string()),
                ("GET".to_string(), "/v2/ping".to_string()),
            ]
        );
        assert_eq!(app.strategy(), "RegExpRouter");
    }
}

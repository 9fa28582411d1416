//! Configured mock routes.
//!
//! # Responsibilities
//! - Turn `[[routes]]` entries into handlers answering a fixed response
//! - Interpolate `{name}` placeholders in bodies from route params
//! - Register the built-in `/_edge/health` and `/_edge/meta` routes
//!
//! # Data Flow
//! ```text
//! ServerConfig
//!     → built-ins (outside router.base_path)
//!     → base_path(router.base_path)
//!     → one MockRoute handler per [[routes]] entry, in file order
//!     → AppBuilder::build → App
//! ```

use std::borrow::Cow;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use serde_json::json;

use crate::config::schema::{RouteConfig, ServerConfig};
use crate::dispatch::{handler_fn, App, Handler, HandlerResult, Next};
use crate::error::{Error, Result};
use crate::http::Context;
use crate::routing::MethodFilter;

pub const HEALTH_PATH: &str = "/_edge/health";
pub const META_PATH: &str = "/_edge/meta";

/// Build the application served for `config`.
pub fn build_app(config: &ServerConfig) -> Result<App> {
    let strategy = config.router.strategy;
    let configured = config.routes.len();

    let mut builder = App::builder()
        .strict(config.router.strict)
        .strategy(strategy)
        .body_limit(config.limits.max_body_bytes)
        .get(
            HEALTH_PATH,
            handler_fn(|c, _next| Box::pin(async move { c.json(&json!({ "status": "ok" })).map(Some) })),
        )
        .get(
            META_PATH,
            handler_fn(move |c, _next| {
                Box::pin(async move {
                    c.json(&json!({
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                        "strategy": strategy.to_string(),
                        "routes": configured,
                    }))
                    .map(Some)
                })
            }),
        )
        .base_path(&config.router.base_path);

    for route in &config.routes {
        let method: MethodFilter = route.method.parse()?;
        builder = builder.on(method, &route.path, MockRoute::from_config(route)?);
    }
    builder.build()
}

/// Fixed response for one configured route.
#[derive(Debug, Clone)]
pub struct MockRoute {
    name: String,
    status: StatusCode,
    content_type: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl MockRoute {
    pub fn from_config(route: &RouteConfig) -> Result<Self> {
        let status = StatusCode::from_u16(route.status)
            .map_err(|_| Error::handler(format!("route `{}`: invalid status {}", route.name, route.status)))?;
        Ok(Self {
            name: route.name.clone(),
            status,
            content_type: route.content_type.clone(),
            headers: route
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            body: route.body.clone(),
        })
    }
}

impl Handler for MockRoute {
    fn call<'a>(&'a self, ctx: &'a mut Context, _next: Next<'a>) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            tracing::debug!(route = %self.name, path = %ctx.path(), "mock route matched");
            ctx.status(self.status);
            ctx.header("content-type", &self.content_type)?;
            for (name, value) in &self.headers {
                ctx.header(name, value)?;
            }
            let body = interpolate(&self.body, |name| ctx.param(name).map(Cow::into_owned));
            Ok(Some(ctx.body(body)))
        })
    }
}

/// Replace `{name}` with `lookup(name)`. Unknown names and unclosed braces
/// are left as written.
fn interpolate(template: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let name = &after[..close];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;

    use super::*;
    use crate::config::parse_config;

    #[test]
    fn interpolates_known_names_only() {
        let lookup = |name: &str| (name == "id").then(|| "42".to_string());
        assert_eq!(interpolate("user {id}", lookup), "user 42");
        assert_eq!(interpolate("{id}-{id}", lookup), "42-42");
        assert_eq!(interpolate("{other} {id}", lookup), "{other} 42");
        assert_eq!(interpolate("open {id", lookup), "open {id");
        assert_eq!(interpolate("", lookup), "");
    }

    async fn call(app: &App, method: &str, uri: &str) -> (StatusCode, axum::http::HeaderMap, String) {
        let request = Request::builder().method(method).uri(uri).body(Body::empty()).unwrap();
        let response = app.dispatch(request).await;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn app(toml: &str) -> App {
        build_app(&parse_config(toml).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn serves_configured_routes() {
        let app = app(r#"
            [[routes]]
            name = "user"
            path = "/users/:id"
            body = "user {id}"
            headers = { "x-mock" = "1" }

            [[routes]]
            name = "create"
            method = "POST"
            path = "/users"
            status = 201
            content_type = "application/json"
            body = '{"created":true}'
        "#);

        let (status, headers, body) = call(&app, "GET", "/users/a%20b").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-mock"], "1");
        assert_eq!(body, "user a b");

        let (status, headers, body) = call(&app, "POST", "/users").await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(body, r#"{"created":true}"#);

        let (status, _, _) = call(&app, "DELETE", "/users").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn builtins_ignore_base_path() {
        let app = app(r#"
            [router]
            base_path = "/api"
            strategy = "trie"

            [[routes]]
            name = "ping"
            path = "/ping"
            body = "pong"
        "#);

        let (status, _, body) = call(&app, "GET", "/_edge/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"ok"}"#);

        let (_, _, meta) = call(&app, "GET", "/_edge/meta").await;
        let meta: serde_json::Value = serde_json::from_str(&meta).unwrap();
        assert_eq!(meta["strategy"], "trie");
        assert_eq!(meta["routes"], 1);

        assert_eq!(call(&app, "GET", "/api/ping").await.2, "pong");
        assert_eq!(call(&app, "GET", "/ping").await.0, StatusCode::NOT_FOUND);
        assert_eq!(app.strategy(), "TrieRouter");
    }

    #[tokio::test]
    async fn wildcard_and_optional_routes() {
        let app = app(r#"
            [router]
            strict = false

            [[routes]]
            name = "files"
            path = "/files/*"
            body = "file {*}"

            [[routes]]
            name = "page"
            path = "/page/:n?"
            body = "page {n}"
        "#);

        assert_eq!(call(&app, "GET", "/files/a/b.txt").await.2, "file a/b.txt");
        assert_eq!(call(&app, "GET", "/page/3/").await.2, "page 3");
        assert_eq!(call(&app, "GET", "/page").await.2, "page {n}");
        let (status, headers, body) = call(&app, "HEAD", "/page/3").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["content-type"], "text/plain; charset=UTF-8");
        assert!(body.is_empty());
    }
}

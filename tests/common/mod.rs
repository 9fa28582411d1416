//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use edge_router::config::ServerConfig;
use edge_router::dispatch::App;
use edge_router::http::HttpServer;
use edge_router::lifecycle::Shutdown;
use edge_router::routing::{RegExpRouter, RouteMatcher, SmartRouter, TrieRouter};

/// Every strategy, fed the same routes.
pub fn strategies(routes: &[(&str, &str, &'static str)]) -> Vec<Box<dyn RouteMatcher<&'static str>>> {
    let mut out: Vec<Box<dyn RouteMatcher<&'static str>>> = vec![
        Box::new(TrieRouter::new()),
        Box::new(RegExpRouter::new()),
        Box::new(SmartRouter::new_default()),
    ];
    for router in &mut out {
        for (method, path, handler) in routes {
            router.add(method.parse().unwrap(), path, *handler).unwrap();
        }
    }
    out
}

/// Matched handlers with their raw params, or `None` if the strategy cannot
/// represent the route set.
pub fn matched(
    router: &dyn RouteMatcher<&'static str>,
    method: &str,
    path: &str,
) -> Option<Vec<(&'static str, Vec<(String, String)>)>> {
    let method = method.parse().unwrap();
    match router.match_route(&method, path) {
        Ok(matches) => Some(
            matches
                .into_iter()
                .map(|m| {
                    let params = m
                        .params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    (m.handler, params)
                })
                .collect(),
        ),
        Err(err) if err.is_unsupported() => None,
        Err(err) => panic!("{}: unexpected error {err}", router.name()),
    }
}

/// Send one request through `app` and collect status, headers and body.
pub async fn send(app: &App, method: &str, uri: &str, body: &str) -> (StatusCode, HeaderMap, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.dispatch(request).await;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, String::from_utf8(bytes.to_vec()).unwrap())
}

/// Start the server on `addr` and wait until it accepts connections.
pub async fn start_server(addr: SocketAddr, mut config: ServerConfig, app: App) -> (Shutdown, HttpServerHandle) {
    config.listener.bind_address = addr.to_string();
    config.timeouts.shutdown_grace_secs = 1;
    let server = HttpServer::new(config, app);
    let handle = HttpServerHandle {
        app: server.app_handle(),
    };
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();

    tokio::spawn(async move {
        let _ = server.run(listener, &server_shutdown).await;
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    (shutdown, handle)
}

pub struct HttpServerHandle {
    pub app: std::sync::Arc<arc_swap::ArcSwap<App>>,
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router that hands every request to the current [`App`]
//! - Wire up middleware (request ID, tracing, timeout, limits)
//! - Swap the [`App`] atomically on config reload
//! - Serve until shutdown, then drain for a bounded grace period
//! - Observability (metrics, correlation IDs)

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    response::Response,
    routing::any,
    Router,
};
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ServerConfig;
use crate::dispatch::App;
use crate::http::request::{RequestIdExt, UuidRequestId};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub app: Arc<ArcSwap<App>>,
}

/// HTTP server for the edge router.
pub struct HttpServer {
    router: Router,
    app: Arc<ArcSwap<App>>,
    config: ServerConfig,
}

impl HttpServer {
    pub fn new(config: ServerConfig, app: App) -> Self {
        let app = Arc::new(ArcSwap::from_pointee(app));
        let router = Self::build_router(&config, AppState { app: app.clone() });
        Self { router, app, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ServerConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(dispatch_handler))
            .route("/", any(dispatch_handler))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.limits.max_body_bytes))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(GlobalConcurrencyLimitLayer::new(config.listener.max_connections))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::SERVER,
                HeaderValue::from_static(concat!("edge-router/", env!("CARGO_PKG_VERSION"))),
            ))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = request.headers().request_id().unwrap_or("unknown"),
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }))
            .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
    }

    /// The fully layered router. Cheap to clone.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Shared handle to the live application, for admin and reload tasks.
    /// Storing a new app swaps it in; in-flight requests finish on the old one.
    pub fn app_handle(&self) -> Arc<ArcSwap<App>> {
        self.app.clone()
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Run the server until `shutdown` fires, then drain in-flight requests
    /// for at most the configured grace period.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let mut stop = shutdown.subscribe();
        let mut deadline = shutdown.subscribe();
        let grace = Duration::from_secs(self.config.timeouts.shutdown_grace_secs);

        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .into_future();

        tokio::select! {
            result = serve => result?,
            _ = async {
                let _ = deadline.recv().await;
                tokio::time::sleep(grace).await;
            } => {
                tracing::warn!(grace_secs = grace.as_secs(), "Grace period elapsed, dropping remaining connections");
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Entry point for every request: dispatch through the current app.
async fn dispatch_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let method = request.method().to_string();

    tracing::debug!(path = %request.uri().path(), "Dispatching request");

    let app = state.app.load_full();
    let response = app.dispatch(request).await;

    let status = response.status().as_u16();
    metrics::record_request(&method, status, start_time);
    if response.status().is_server_error() {
        tracing::warn!(status, "Request failed");
    }
    response
}

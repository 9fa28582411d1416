//! Admin API.
//!
//! # Responsibilities
//! - Report the live application's status, strategy and route table
//! - Reject requests without the configured bearer key
//!
//! # Design Decisions
//! - Served on its own listener, separate from routed traffic
//! - Reads the same `ArcSwap<App>` the HTTP server dispatches through, so a
//!   reload is visible immediately

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use axum::{middleware, routing::get, Router};

use crate::dispatch::App;

use self::auth::admin_auth_middleware;
use self::handlers::{get_routes, get_status};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub app: Arc<ArcSwap<App>>,
    pub api_key: Arc<str>,
    pub started: Instant,
}

impl AdminState {
    pub fn new(app: Arc<ArcSwap<App>>, api_key: &str) -> Self {
        Self {
            app,
            api_key: Arc::from(api_key),
            started: Instant::now(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/routes", get(get_routes))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}

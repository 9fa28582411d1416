use axum::{extract::State, Json};
use serde::Serialize;

use crate::admin::AdminState;
use crate::dispatch::RouteInfo;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    /// Strategy serving matches for the live app.
    pub strategy: &'static str,
    pub routes: usize,
    pub uptime_secs: u64,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let app = state.app.load();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        strategy: app.strategy(),
        routes: app.routes().len(),
        uptime_secs: state.started.elapsed().as_secs(),
    })
}

pub async fn get_routes(State(state): State<AdminState>) -> Json<Vec<RouteInfo>> {
    Json(state.app.load().routes().to_vec())
}

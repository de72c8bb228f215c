//! Liveness and run-state reporting.

use axum::{extract::State, routing::get, Json, Router};
use bizsync_engine::{ResourceType, Timestamp};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub directory_available: bool,
    /// Seconds between scheduled passes, absent when only manual triggers run.
    pub schedule_interval_secs: Option<u64>,
    pub active_runs: Vec<RunView>,
}

/// One organization's in-flight run.
#[derive(Serialize)]
pub struct RunView {
    pub org_id: String,
    pub resource: ResourceType,
    pub started_at: Timestamp,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let active_runs = state
        .runs
        .snapshot()
        .into_iter()
        .map(|(org_id, run)| RunView {
            org_id,
            resource: run.resource,
            started_at: run.started_at,
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        directory_available: state.engine.is_available(),
        schedule_interval_secs: state
            .config
            .sync
            .schedule
            .as_ref()
            .map(|schedule| schedule.interval.as_secs()),
        active_runs,
    })
}

async fn root() -> &'static str {
    "bizsync: directory sync for business entities"
}

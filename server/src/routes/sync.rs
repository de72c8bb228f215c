//! Sync endpoint routes.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use bizsync_engine::{SyncLogEntry, SyncOptions, SyncOutcome, SyncWatermark};

use crate::auth::AuthUser;
use crate::error::Result;
use crate::handlers::{handle_log, handle_sync, handle_watermark, parse_resource, LogQuery};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync/{org_id}/{resource}", post(trigger_handler))
        .route("/sync/{org_id}/{resource}/watermark", get(watermark_handler))
        .route("/orgs/{org_id}/sync-log", get(log_handler))
}

/// POST /sync/{org_id}/{resource} - Run one sync cycle.
async fn trigger_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((org_id, resource)): Path<(String, String)>,
    Json(options): Json<SyncOptions>,
) -> Result<Json<SyncOutcome>> {
    let resource = parse_resource(&resource)?;
    let outcome = handle_sync(&state, &org_id, resource, options).await?;
    Ok(Json(outcome))
}

/// GET /sync/{org_id}/{resource}/watermark - Where the last run left off.
async fn watermark_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path((org_id, resource)): Path<(String, String)>,
) -> Result<Json<SyncWatermark>> {
    let resource = parse_resource(&resource)?;
    let watermark = handle_watermark(&state, &org_id, resource).await?;
    Ok(Json(watermark))
}

/// GET /orgs/{org_id}/sync-log - Most recent sync log entries.
async fn log_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(org_id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<SyncLogEntry>>> {
    let entries = handle_log(&state, &org_id, query).await?;
    Ok(Json(entries))
}

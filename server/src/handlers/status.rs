//! Status handlers - watermarks and the recent sync log.

use bizsync_engine::{ResourceType, SyncLogEntry, SyncWatermark};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::AppState;

/// Query parameters for the sync log.
#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub limit: Option<u32>,
}

/// Default number of log entries returned.
const DEFAULT_LIMIT: u32 = 50;

/// Maximum number of log entries returned.
const MAX_LIMIT: u32 = 500;

pub async fn handle_watermark(
    state: &AppState,
    org_id: &str,
    resource: ResourceType,
) -> Result<SyncWatermark> {
    state
        .watermarks
        .load(org_id, resource)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("no {} sync recorded for {}", resource, org_id)))
}

pub async fn handle_log(
    state: &AppState,
    org_id: &str,
    query: LogQuery,
) -> Result<Vec<SyncLogEntry>> {
    let limit = query
        .limit
        .map(|l| l.clamp(1, MAX_LIMIT))
        .unwrap_or(DEFAULT_LIMIT);
    Ok(state.log.recent(org_id, limit).await?)
}

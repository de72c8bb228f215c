//! Trigger handler - runs one sync cycle on request.

use bizsync_engine::{ResourceType, SyncOptions, SyncOutcome};

use crate::error::{AppError, Result};
use crate::AppState;

/// Parse the resource segment of a trigger path.
pub fn parse_resource(segment: &str) -> Result<ResourceType> {
    segment.parse::<ResourceType>().map_err(AppError::BadRequest)
}

/// Run a sync for one organization and resource type.
///
/// Refuses with a conflict while another run holds the organization.
pub async fn handle_sync(
    state: &AppState,
    org_id: &str,
    resource: ResourceType,
    options: SyncOptions,
) -> Result<SyncOutcome> {
    let org_id = org_id.trim();
    if org_id.is_empty() {
        return Err(AppError::BadRequest("organization id is empty".to_string()));
    }

    let _guard = state.runs.try_acquire(org_id, resource).map_err(|active| {
        AppError::Conflict(format!(
            "a {} sync for {} has been running since {}",
            active.resource,
            org_id,
            active.started_at.to_rfc3339()
        ))
    })?;

    let outcome = state.engine.run_sync(org_id, resource, options).await?;
    Ok(outcome)
}

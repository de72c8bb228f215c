//! Periodic sync of configured organizations.
//!
//! Organizations run concurrently; resource types within one organization
//! run one after another under that organization's guard.

use std::sync::Arc;

use bizsync_engine::{ResourceType, SyncOptions, SyncOutcome};
use futures::future::join_all;
use tokio::time::{interval, MissedTickBehavior};

use super::engine::SyncEngine;
use super::guard::RunRegistry;
use crate::config::ScheduleConfig;

/// Tick forever, syncing every scheduled organization each interval.
pub async fn run_schedule(engine: Arc<SyncEngine>, runs: RunRegistry, schedule: ScheduleConfig) {
    let mut ticker = interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        orgs = schedule.org_ids.len(),
        interval_secs = schedule.interval.as_secs(),
        "sync scheduler started"
    );

    loop {
        ticker.tick().await;
        sync_all(&engine, &runs, &schedule.org_ids, &schedule.resources).await;
    }
}

/// One scheduler tick.
pub async fn sync_all(
    engine: &SyncEngine,
    runs: &RunRegistry,
    org_ids: &[String],
    resources: &[ResourceType],
) -> Vec<OrgReport> {
    join_all(
        org_ids
            .iter()
            .map(|org_id| sync_org(engine, runs, org_id, resources)),
    )
    .await
}

/// What one organization's scheduled pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgReport {
    pub org_id: String,
    pub completed: Vec<ResourceType>,
    pub failed: Vec<ResourceType>,
    /// Another run already held the organization.
    pub busy: bool,
}

async fn sync_org(
    engine: &SyncEngine,
    runs: &RunRegistry,
    org_id: &str,
    resources: &[ResourceType],
) -> OrgReport {
    let mut report = OrgReport {
        org_id: org_id.to_string(),
        ..Default::default()
    };

    for &resource in resources {
        let _guard = match runs.try_acquire(org_id, resource) {
            Ok(guard) => guard,
            Err(active) => {
                tracing::info!(
                    org_id,
                    busy_with = %active.resource,
                    "organization busy, skipping scheduled pass"
                );
                report.busy = true;
                return report;
            }
        };

        match engine.run_sync(org_id, resource, SyncOptions::default()).await {
            Ok(SyncOutcome::Completed(result)) if result.success => report.completed.push(resource),
            Ok(SyncOutcome::Completed(_)) => report.failed.push(resource),
            Ok(SyncOutcome::Skipped { .. }) => {
                tracing::debug!(org_id, "directory sync unavailable, ending scheduled pass");
                return report;
            }
            Err(error) => {
                tracing::error!(
                    org_id,
                    resource = %resource,
                    error = %error,
                    "scheduled run aborted"
                );
                report.failed.push(resource);
                // Credentials are shared across resource types.
                if error.is_fatal_for_run() {
                    return report;
                }
            }
        }
    }

    report
}

//! At most one sync run per organization at a time.

use std::sync::Arc;

use bizsync_engine::{ResourceType, Timestamp};
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// A run currently holding an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveRun {
    pub resource: ResourceType,
    pub started_at: Timestamp,
}

/// Registry of organizations with a run in flight.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<DashMap<String, ActiveRun>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `org_id`, or report the run already holding it.
    pub fn try_acquire(
        &self,
        org_id: &str,
        resource: ResourceType,
    ) -> std::result::Result<RunGuard, ActiveRun> {
        match self.active.entry(org_id.to_string()) {
            Entry::Occupied(entry) => Err(*entry.get()),
            Entry::Vacant(entry) => {
                entry.insert(ActiveRun {
                    resource,
                    started_at: Utc::now(),
                });
                tracing::debug!(org_id, resource = %resource, "claimed organization for sync");
                Ok(RunGuard {
                    active: Arc::clone(&self.active),
                    org_id: org_id.to_string(),
                })
            }
        }
    }

    pub fn is_running(&self, org_id: &str) -> bool {
        self.active.contains_key(org_id)
    }

    /// Organizations currently running, oldest run first.
    pub fn snapshot(&self) -> Vec<(String, ActiveRun)> {
        let mut runs: Vec<(String, ActiveRun)> = self
            .active
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        runs.sort_by_key(|(_, run)| run.started_at);
        runs
    }
}

/// Releases the organization when dropped.
#[derive(Debug)]
pub struct RunGuard {
    active: Arc<DashMap<String, ActiveRun>>,
    org_id: String,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.active.remove(&self.org_id);
        tracing::debug!(org_id = %self.org_id, "released organization");
    }
}

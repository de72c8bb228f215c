//! Watermarks: how far previous runs got, per organization and resource.

use crate::{OrgId, ResourceType, Timestamp};
use serde::{Deserialize, Serialize};

/// Persisted cursor for incremental pulls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncWatermark {
    pub org_id: OrgId,
    pub resource: ResourceType,
    /// Opaque change token issued by the remote listing.
    pub sync_token: Option<String>,
    pub last_full_sync_at: Option<Timestamp>,
    pub last_incremental_sync_at: Timestamp,
}

/// How a run lists remote records, derived from the stored watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Token to list with; `None` means a full listing.
    pub change_token: Option<String>,
    pub full_sync: bool,
    /// Set when the remote rejected the stored token during this run.
    pub token_invalidated: bool,
    pub previous: Option<SyncWatermark>,
}

impl RunPlan {
    /// Resolve the listing mode for a run.
    ///
    /// A requested full sync discards the stored token but keeps the stored
    /// timestamps. Without a stored token the run is implicitly full.
    pub fn resolve(stored: Option<SyncWatermark>, full_sync_requested: bool) -> Self {
        let change_token = if full_sync_requested {
            None
        } else {
            stored.as_ref().and_then(|w| w.sync_token.clone())
        };

        Self {
            full_sync: change_token.is_none(),
            change_token,
            token_invalidated: false,
            previous: stored,
        }
    }

    /// The remote fell back to a full listing because the token expired.
    pub fn fall_back_to_full(&mut self) {
        self.change_token = None;
        self.full_sync = true;
        self.token_invalidated = true;
    }

    /// Build the watermark to persist at the end of a run.
    ///
    /// The incremental timestamp always moves. The token moves only when the
    /// pull produced a fresh one, and is cleared when the old one expired.
    /// The full-sync timestamp moves only for a full run whose listing ran to
    /// the end.
    pub fn advance(
        &self,
        org_id: &str,
        resource: ResourceType,
        fresh_token: Option<String>,
        pull_completed: bool,
        now: Timestamp,
    ) -> SyncWatermark {
        let previous_token = self.previous.as_ref().and_then(|w| w.sync_token.clone());
        let sync_token = match fresh_token {
            Some(token) => Some(token),
            None if self.token_invalidated => None,
            None => previous_token,
        };

        let previous_full = self.previous.as_ref().and_then(|w| w.last_full_sync_at);
        let last_full_sync_at = if self.full_sync && pull_completed {
            Some(now)
        } else {
            previous_full
        };

        SyncWatermark {
            org_id: org_id.to_string(),
            resource,
            sync_token,
            last_full_sync_at,
            last_incremental_sync_at: now,
        }
    }
}

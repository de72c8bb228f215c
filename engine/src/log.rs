//! Sync log entries: one immutable row per attempted operation.

use crate::{
    ConflictResolution, EntityId, LocalEntity, OrgId, RemoteId, RemoteRecord, ResourceType,
    SyncDirection, SyncStatus, Timestamp,
};
use serde::{Deserialize, Serialize};

/// Audit record of one sync decision or remote write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncLogEntry {
    pub org_id: OrgId,
    pub entity_type: String,
    pub entity_id: Option<EntityId>,
    pub remote_id: Option<RemoteId>,
    pub direction: SyncDirection,
    pub status: SyncStatus,
    pub conflict_resolution: Option<String>,
    pub error_message: Option<String>,
    pub local_snapshot: Option<serde_json::Value>,
    pub remote_snapshot: Option<serde_json::Value>,
    pub occurred_at: Timestamp,
}

impl SyncLogEntry {
    pub fn new(
        org_id: impl Into<OrgId>,
        resource: ResourceType,
        direction: SyncDirection,
        status: SyncStatus,
        occurred_at: Timestamp,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            entity_type: resource.entity_type().to_string(),
            entity_id: None,
            remote_id: None,
            direction,
            status,
            conflict_resolution: None,
            error_message: None,
            local_snapshot: None,
            remote_snapshot: None,
            occurred_at,
        }
    }

    /// Attach the local entity: its id, remote id if linked, and a snapshot.
    pub fn with_local(mut self, entity: &LocalEntity) -> Self {
        self.entity_id = Some(entity.id.clone());
        if self.remote_id.is_none() {
            self.remote_id = entity.remote_id.clone();
        }
        self.local_snapshot = Some(entity.snapshot());
        self
    }

    /// Attach the remote record and its raw payload.
    pub fn with_remote(mut self, record: &RemoteRecord) -> Self {
        self.remote_id = Some(record.remote_id.clone());
        self.remote_snapshot = Some(record.raw.clone());
        self
    }

    pub fn with_remote_id(mut self, remote_id: impl Into<RemoteId>) -> Self {
        self.remote_id = Some(remote_id.into());
        self
    }

    pub fn with_resolution(mut self, resolution: ConflictResolution) -> Self {
        self.conflict_resolution = Some(resolution.as_str().to_string());
        self
    }

    /// Free-form note for decisions that are not conflicts, e.g. `linked`.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.conflict_resolution = Some(note.into());
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

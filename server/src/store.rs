//! Persistence seams used by the orchestrator.
//!
//! Postgres implementations live in [`crate::db`]; tests substitute
//! in-memory ones.

use async_trait::async_trait;
use bizsync_engine::{
    LocalEntity, LocalFields, RemoteLink, ResourceType, Result, SyncLogEntry, SyncWatermark,
    Timestamp,
};

/// Local business records of every mirrored type.
#[async_trait]
pub trait LocalStore: Send + Sync {
    async fn list_entities(&self, org_id: &str, resource: ResourceType) -> Result<Vec<LocalEntity>>;

    /// Look up an entity by its normalized identity, preferring unlinked ones.
    async fn find_by_identity(
        &self,
        org_id: &str,
        resource: ResourceType,
        identity: &str,
    ) -> Result<Option<LocalEntity>>;

    /// Insert an entity, or refresh the one already linked to the same
    /// remote record.
    async fn upsert_entity(
        &self,
        org_id: &str,
        fields: &LocalFields,
        link: Option<&RemoteLink>,
        synced_at: Timestamp,
    ) -> Result<LocalEntity>;

    /// Record that an entity is in sync with a remote version.
    async fn link_remote(
        &self,
        entity_id: &str,
        link: &RemoteLink,
        synced_at: Timestamp,
    ) -> Result<()>;

    /// Replace local fields with remote ones. The entity counts as modified
    /// and synced at `synced_at`.
    async fn update_from_remote(
        &self,
        entity_id: &str,
        fields: &LocalFields,
        version_tag: &str,
        synced_at: Timestamp,
    ) -> Result<()>;

    /// Advance the stored version tag and clear the sync mark, so the next
    /// push sends the kept local fields against that version.
    async fn record_remote_version(&self, entity_id: &str, version_tag: &str) -> Result<()>;
}

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    async fn load(&self, org_id: &str, resource: ResourceType) -> Result<Option<SyncWatermark>>;

    async fn save(&self, watermark: &SyncWatermark) -> Result<()>;
}

/// Append-only audit trail.
#[async_trait]
pub trait SyncLogSink: Send + Sync {
    async fn append(&self, entry: &SyncLogEntry) -> Result<()>;

    /// Newest entries first.
    async fn recent(&self, org_id: &str, limit: u32) -> Result<Vec<SyncLogEntry>>;
}

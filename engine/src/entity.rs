//! Local entities and their remote counterparts.

use crate::{EntityId, LocalFields, OrgId, RemoteId, ResourceType, Timestamp, VersionTag};
use serde::{Deserialize, Serialize};

/// Linkage between a local entity and a remote record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteLink {
    pub remote_id: RemoteId,
    pub version_tag: VersionTag,
}

impl RemoteLink {
    pub fn new(remote_id: impl Into<RemoteId>, version_tag: impl Into<VersionTag>) -> Self {
        Self {
            remote_id: remote_id.into(),
            version_tag: version_tag.into(),
        }
    }
}

/// A business record mirrored to the remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalEntity {
    pub id: EntityId,
    pub org_id: OrgId,
    pub fields: LocalFields,
    /// Last local modification.
    pub updated_at: Timestamp,
    /// Null until the first successful sync.
    pub remote_id: Option<RemoteId>,
    pub remote_version_tag: Option<VersionTag>,
    pub last_synced_at: Option<Timestamp>,
}

impl LocalEntity {
    /// Create an entity that has never been synced.
    pub fn new(
        id: impl Into<EntityId>,
        org_id: impl Into<OrgId>,
        fields: LocalFields,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            fields,
            updated_at,
            remote_id: None,
            remote_version_tag: None,
            last_synced_at: None,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.fields.resource_type()
    }

    pub fn display_name(&self) -> &str {
        self.fields.display_name()
    }

    pub fn is_linked(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Whether the push phase has anything to send for this entity.
    ///
    /// Unlinked entities always need a push; linked ones only after a local
    /// change newer than the last sync.
    pub fn needs_push(&self) -> bool {
        match (&self.remote_id, self.last_synced_at) {
            (None, _) => true,
            (Some(_), None) => true,
            (Some(_), Some(synced)) => self.updated_at > synced,
        }
    }

    /// Record a successful link or push.
    pub fn link(&mut self, link: RemoteLink, synced_at: Timestamp) {
        self.remote_id = Some(link.remote_id);
        self.remote_version_tag = Some(link.version_tag);
        self.last_synced_at = Some(synced_at);
    }

    /// Label naming this entity in error reports.
    pub fn context(&self) -> String {
        match &self.remote_id {
            Some(remote_id) => format!("{} ({})", self.display_name(), remote_id),
            None => self.display_name().to_string(),
        }
    }

    /// JSON snapshot for the sync log.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// The remote directory's representation of one record.
///
/// `raw` keeps the wire payload as received so mappings stay pure and the sync
/// log can capture exactly what a decision was based on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub remote_id: RemoteId,
    /// Opaque, changes on every remote mutation.
    pub version_tag: VersionTag,
    /// Remote last-modified time, when the API exposes one.
    pub updated_at: Option<Timestamp>,
    /// Tombstone reported by incremental listings.
    #[serde(default)]
    pub deleted: bool,
    pub raw: serde_json::Value,
}

impl RemoteRecord {
    pub fn link(&self) -> RemoteLink {
        RemoteLink::new(self.remote_id.clone(), self.version_tag.clone())
    }
}

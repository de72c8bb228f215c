//! Per-record sync decisions.
//!
//! Nothing here performs I/O. The orchestrator asks for a decision, carries
//! it out against the stores and adapters, and logs what was decided.
//!
//! # Pull algorithm
//!
//! For every remote record, in listing order:
//!
//! 1. Tombstones are skipped; local entities are never deleted
//! 2. A linked entity with the same version tag is skipped
//! 3. A linked entity with a different tag is a conflict, settled by the policy
//! 4. An unlinked entity with the same identity is linked, fields untouched
//! 5. Anything else becomes a new local entity

use crate::{EntityId, LocalEntity, RemoteId, RemoteRecord, VersionTag};
use serde::{Deserialize, Serialize};

/// How a version-tag divergence is settled during pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Later modification wins; a remote without a timestamp counts as newer
    #[default]
    NewestWins,
    /// Local fields are never overwritten
    LocalWins,
    /// Remote fields always overwrite
    RemoteWins,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewestWins => "newest_wins",
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
        }
    }
}

/// Which side a settled conflict kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    LocalWins,
    RemoteWins,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalWins => "local_wins",
            Self::RemoteWins => "remote_wins",
        }
    }
}

/// What the push phase does with one local entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    /// Entity was already pushed and has not changed since.
    Skip,
    Create,
    Update {
        remote_id: RemoteId,
        expected_tag: Option<VersionTag>,
    },
}

/// Decide the push action for a local entity.
pub fn plan_push(entity: &LocalEntity) -> PushAction {
    match &entity.remote_id {
        None => PushAction::Create,
        Some(_) if !entity.needs_push() => PushAction::Skip,
        Some(remote_id) => PushAction::Update {
            remote_id: remote_id.clone(),
            expected_tag: entity.remote_version_tag.clone(),
        },
    }
}

/// Why a pulled record needs no local change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Unchanged,
    RemoteDeleted,
}

/// What the pull phase does with one remote record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullDecision {
    Skip(SkipReason),
    /// Replace local fields with the remote ones.
    Overwrite {
        entity_id: EntityId,
        resolution: ConflictResolution,
    },
    /// Keep local fields, advance the stored tag.
    KeepLocal { entity_id: EntityId },
    /// Attach the remote record to an unlinked entity with the same identity.
    Link { entity_id: EntityId },
    Create,
}

impl PullDecision {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::KeepLocal { .. })
    }
}

/// The reconciler applies one conflict policy to pulled records.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler {
    policy: ConflictPolicy,
}

impl Reconciler {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    /// Classify a remote record.
    ///
    /// `linked` is the entity already carrying this record's remote id;
    /// `identity_match` is a candidate sharing the mapped identifying field.
    /// A candidate that is itself linked is never reused.
    pub fn decide(
        &self,
        record: &RemoteRecord,
        linked: Option<&LocalEntity>,
        identity_match: Option<&LocalEntity>,
    ) -> PullDecision {
        if record.deleted {
            return PullDecision::Skip(SkipReason::RemoteDeleted);
        }

        if let Some(local) = linked {
            if local.remote_version_tag.as_deref() == Some(record.version_tag.as_str()) {
                return PullDecision::Skip(SkipReason::Unchanged);
            }
            return match self.resolve_conflict(local, record) {
                ConflictResolution::RemoteWins => PullDecision::Overwrite {
                    entity_id: local.id.clone(),
                    resolution: ConflictResolution::RemoteWins,
                },
                ConflictResolution::LocalWins => PullDecision::KeepLocal {
                    entity_id: local.id.clone(),
                },
            };
        }

        match identity_match.filter(|candidate| !candidate.is_linked()) {
            Some(candidate) => PullDecision::Link {
                entity_id: candidate.id.clone(),
            },
            None => PullDecision::Create,
        }
    }

    /// Settle a divergence between a linked entity and its remote record.
    pub fn resolve_conflict(
        &self,
        local: &LocalEntity,
        remote: &RemoteRecord,
    ) -> ConflictResolution {
        match self.policy {
            ConflictPolicy::LocalWins => ConflictResolution::LocalWins,
            ConflictPolicy::RemoteWins => ConflictResolution::RemoteWins,
            ConflictPolicy::NewestWins => match remote.updated_at {
                Some(remote_at) if local.updated_at > remote_at => ConflictResolution::LocalWins,
                _ => ConflictResolution::RemoteWins,
            },
        }
    }
}

//! Run options and aggregated run results.

use crate::{ConflictPolicy, ResourceType, SyncError, Timestamp};
use serde::{Deserialize, Serialize};

/// Options supplied per run by the trigger surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default)]
    pub full_sync: bool,
    #[serde(default)]
    pub conflict_resolution: ConflictPolicy,
}

/// One collected per-record failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordError {
    /// Display name and/or remote id locating the record.
    pub context: String,
    pub message: String,
}

/// Aggregated outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResult {
    /// False whenever any error was collected. Conflicts do not count.
    pub success: bool,
    pub resource: ResourceType,
    pub full_sync: bool,
    pub created: u32,
    pub updated: u32,
    /// Always zero: local entities are never deleted by a run.
    pub deleted: u32,
    pub conflicts: u32,
    /// Retries spent by the call-site retry wrapper.
    pub retries: u32,
    pub errors: Vec<RecordError>,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
}

impl SyncResult {
    /// One-line summary with a sample of error messages.
    pub fn summary(&self, sample: usize) -> String {
        let mut line = format!(
            "{}: created {}, updated {}, conflicts {}, errors {}",
            self.resource,
            self.created,
            self.updated,
            self.conflicts,
            self.errors.len()
        );
        if !self.errors.is_empty() && sample > 0 {
            let messages: Vec<String> = self
                .errors
                .iter()
                .take(sample)
                .map(|e| format!("{}: {}", e.context, e.message))
                .collect();
            line.push_str(&format!(" [{}]", messages.join("; ")));
        }
        line
    }

    /// Completed cleanly but with conflicts worth a look.
    pub fn needs_review(&self) -> bool {
        self.success && self.conflicts > 0
    }
}

/// What a trigger gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncResult),
    /// The subsystem is not configured; nothing was attempted.
    Skipped { resource: ResourceType, reason: String },
}

impl SyncOutcome {
    pub fn result(&self) -> Option<&SyncResult> {
        match self {
            Self::Completed(result) => Some(result),
            Self::Skipped { .. } => None,
        }
    }
}

/// Running counters for a sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncTally {
    pub created: u32,
    pub updated: u32,
    pub conflicts: u32,
    pub errors: Vec<RecordError>,
}

impl SyncTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&mut self) {
        self.created += 1;
    }

    pub fn updated(&mut self) {
        self.updated += 1;
    }

    pub fn conflict(&mut self) {
        self.conflicts += 1;
    }

    pub fn error(&mut self, context: impl Into<String>, error: &SyncError) {
        self.errors.push(RecordError {
            context: context.into(),
            message: error.to_string(),
        });
    }

    pub fn finish(
        self,
        resource: ResourceType,
        full_sync: bool,
        retries: u32,
        started_at: Timestamp,
        finished_at: Timestamp,
    ) -> SyncResult {
        SyncResult {
            success: self.errors.is_empty(),
            resource,
            full_sync,
            created: self.created,
            updated: self.updated,
            deleted: 0,
            conflicts: self.conflicts,
            retries,
            errors: self.errors,
            started_at,
            finished_at,
        }
    }
}

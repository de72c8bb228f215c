//! # Bizsync Engine
//!
//! The decision core of bidirectional directory synchronization.
//!
//! This crate holds everything about a sync run that can be decided without
//! touching a network or a database: the data model shared by both sides, the
//! error taxonomy, the conflict policies, watermark planning, sync-log entry
//! construction, result aggregation, and the pure field mappings between local
//! business records and the remote directory's wire schemas.
//!
//! ## Design Principles
//!
//! - **No IO**: callers feed records in and act on the decisions that come out
//! - **Deterministic**: the same inputs always produce the same decision
//! - **Total mappings**: a remote payload with missing fields maps to absent
//!   local fields, never to an error
//!
//! ## Core Concepts
//!
//! ### Entities and records
//!
//! A [`LocalEntity`] is the business record being mirrored (a client, an
//! appointment, a document...). A [`RemoteRecord`] is the directory's copy,
//! carrying an opaque version tag that changes on every remote mutation.
//!
//! ### Decisions
//!
//! The [`Reconciler`] classifies each pulled record against the local state
//! into a [`PullDecision`], applying one [`ConflictPolicy`]:
//! - [`ConflictPolicy::NewestWins`] - later modification wins (default)
//! - [`ConflictPolicy::LocalWins`] - local fields are never overwritten
//! - [`ConflictPolicy::RemoteWins`] - remote fields always overwrite
//!
//! ### Watermarks
//!
//! A [`SyncWatermark`] remembers the last change token per organization and
//! resource type. [`RunPlan::resolve`] turns a stored watermark and the run
//! options into the token a run should list with.
//!
//! ## Quick Start
//!
//! ```rust
//! use bizsync_engine::{ClientFields, ConflictPolicy, PullDecision, Reconciler};
//! use bizsync_engine::mapping::contacts;
//!
//! let fields = ClientFields {
//!     name: "Ada Lovelace".into(),
//!     email: Some("ada@example.com".into()),
//!     phone: None,
//!     company: Some("Analytical Engines".into()),
//! };
//!
//! // Map to the wire schema and back without loss.
//! let person = contacts::to_remote(&fields);
//! assert_eq!(contacts::to_local(&person), fields);
//!
//! // A record nobody has seen before becomes a new local entity.
//! let mut person = person;
//! person.resource_name = Some("people/c1".into());
//! person.etag = Some("etag-1".into());
//! let record = contacts::into_record(person).unwrap();
//!
//! let reconciler = Reconciler::new(ConflictPolicy::NewestWins);
//! let decision = reconciler.decide(&record, None, None);
//! assert_eq!(decision, PullDecision::Create);
//! ```

pub mod entity;
pub mod error;
pub mod fields;
pub mod log;
pub mod mapping;
pub mod reconcile;
pub mod resource;
pub mod result;
pub mod watermark;

// Re-export main types at crate root
pub use entity::{LocalEntity, RemoteLink, RemoteRecord};
pub use error::{Result, SyncError};
pub use fields::{
    ClientFields, DocumentFields, EventFields, LocalFields, SpreadsheetFields, TaskFields,
};
pub use log::SyncLogEntry;
pub use reconcile::{
    plan_push, ConflictPolicy, ConflictResolution, PullDecision, PushAction, Reconciler,
    SkipReason,
};
pub use resource::{ResourceType, SyncDirection, SyncStatus};
pub use result::{RecordError, SyncOptions, SyncOutcome, SyncResult, SyncTally};
pub use watermark::{RunPlan, SyncWatermark};

/// Type aliases for clarity
pub type OrgId = String;
pub type EntityId = String;
pub type RemoteId = String;
pub type VersionTag = String;
pub type Timestamp = chrono::DateTime<chrono::Utc>;

//! Remote adapters: one per resource type, all behind [`RemoteAdapter`].
//!
//! An adapter owns the wire protocol of one API family. It maps local field
//! sets onto wire payloads through the engine's mappings, classifies
//! failures into [`SyncError`], and absorbs change-token expiry by falling
//! back to a full listing.

mod calendar;
mod contacts;
mod drive;
mod tasks;

pub use calendar::CalendarAdapter;
pub use contacts::ContactsAdapter;
pub use drive::{DriveAdapter, DriveKind};
pub use tasks::TasksAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use bizsync_engine::{
    mapping, LocalFields, RemoteId, RemoteRecord, ResourceType, Result, SyncError, VersionTag,
};

use crate::google::ClientFactory;

/// The remote half of a freshly created record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRemote {
    pub remote_id: RemoteId,
    pub version_tag: VersionTag,
}

impl CreatedRemote {
    pub(crate) fn from_parts(
        remote_id: Option<String>,
        version_tag: Option<String>,
    ) -> Result<Self> {
        match (remote_id, version_tag) {
            (Some(remote_id), Some(version_tag)) => Ok(Self {
                remote_id,
                version_tag,
            }),
            _ => Err(SyncError::Validation(
                "create response lacks an id or version tag".to_string(),
            )),
        }
    }
}

/// One page request of a listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListRequest<'a> {
    pub page_size: u32,
    pub page_token: Option<&'a str>,
    /// Token from a previous listing; `None` lists everything.
    pub change_token: Option<&'a str>,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListPage {
    pub records: Vec<RemoteRecord>,
    pub next_page_token: Option<String>,
    /// Token to persist for the next incremental run.
    pub next_change_token: Option<String>,
    /// Set when the change token was rejected and this page starts over
    /// with a full listing.
    pub token_reset: bool,
}

/// Uniform CRUD and listing over one remote resource type.
#[async_trait]
pub trait RemoteAdapter: Send + Sync {
    fn resource(&self) -> ResourceType;

    async fn create(&self, fields: &LocalFields) -> Result<CreatedRemote>;

    /// Update a record, returning its new version tag.
    ///
    /// With `expected_tag` set the write only succeeds if the remote still
    /// carries that tag; otherwise it fails with `VersionConflict`.
    async fn update(
        &self,
        remote_id: &str,
        fields: &LocalFields,
        expected_tag: Option<&str>,
    ) -> Result<VersionTag>;

    async fn delete(&self, remote_id: &str) -> Result<()>;

    /// Fetch one record; a missing record is `Ok(None)`.
    async fn get(&self, remote_id: &str) -> Result<Option<RemoteRecord>>;

    async fn list(&self, request: ListRequest<'_>) -> Result<ListPage>;

    /// Fuzzy search over the remote's own index.
    async fn search(&self, query: &str) -> Result<Vec<RemoteRecord>>;

    /// Exact match on the resource's identifying field.
    async fn find_by_exact_field(&self, value: &str) -> Result<Option<RemoteRecord>>;

    fn to_local(&self, record: &RemoteRecord) -> LocalFields {
        mapping::to_local_fields(self.resource(), record)
    }
}

/// Source of adapters for the orchestrator.
#[async_trait]
pub trait AdapterProvider: Send + Sync {
    /// Configuration check only.
    fn is_available(&self) -> bool;

    async fn adapter(&self, resource: ResourceType) -> Result<Arc<dyn RemoteAdapter>>;
}

/// Adapters backed by the workspace directory APIs.
pub struct GoogleAdapters {
    factory: Arc<ClientFactory>,
}

impl GoogleAdapters {
    pub fn new(factory: Arc<ClientFactory>) -> Self {
        Self { factory }
    }
}

#[async_trait]
impl AdapterProvider for GoogleAdapters {
    fn is_available(&self) -> bool {
        self.factory.is_available()
    }

    async fn adapter(&self, resource: ResourceType) -> Result<Arc<dyn RemoteAdapter>> {
        let client = self.factory.get_client(resource).await?;
        let adapter: Arc<dyn RemoteAdapter> = match resource {
            ResourceType::Contacts => Arc::new(ContactsAdapter::new(client)),
            ResourceType::Calendar => Arc::new(CalendarAdapter::new(client)),
            ResourceType::Files => Arc::new(DriveAdapter::new(client, DriveKind::Files)),
            ResourceType::Spreadsheets => {
                Arc::new(DriveAdapter::new(client, DriveKind::Spreadsheets))
            }
            ResourceType::Tasks => Arc::new(TasksAdapter::new(client)),
        };
        Ok(adapter)
    }
}

/// Turn wire items into records, dropping the ones without id or tag.
pub(crate) fn collect_records<T>(
    resource: ResourceType,
    items: Vec<T>,
    into_record: fn(T) -> Option<RemoteRecord>,
) -> Vec<RemoteRecord> {
    let total = items.len();
    let records: Vec<RemoteRecord> = items.into_iter().filter_map(into_record).collect();
    if records.len() < total {
        tracing::warn!(
            resource = %resource,
            dropped = total - records.len(),
            "ignored remote items without id or version tag"
        );
    }
    records
}

/// Treat `NotFound` as an absent record.
pub(crate) fn found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SyncError::NotFound(_)) => Ok(None),
        Err(error) => Err(error),
    }
}

/// Fail when the remote moved past the tag the caller last saw.
pub(crate) fn check_expected_tag(
    remote_id: &str,
    expected: Option<&str>,
    current: Option<&str>,
) -> Result<()> {
    match (expected, current) {
        (Some(expected), Some(current)) if expected != current => Err(SyncError::VersionConflict(
            format!("{} changed remotely (expected {}, found {})", remote_id, expected, current),
        )),
        _ => Ok(()),
    }
}

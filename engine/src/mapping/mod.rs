//! Wire schemas of the remote directory and pure mappings to local fields.
//!
//! Every mapping here is deterministic and total. Turning a local field set
//! into a wire payload can only fail when the field set belongs to another
//! resource type; turning a remote record into local fields never fails.

pub mod calendar;
pub mod contacts;
pub mod drive;
pub mod tasks;

use crate::{LocalFields, RemoteRecord, ResourceType, SyncError};
use serde::de::DeserializeOwned;

/// Map a remote record to the local field set of its resource type.
pub fn to_local_fields(resource: ResourceType, record: &RemoteRecord) -> LocalFields {
    match resource {
        ResourceType::Contacts => LocalFields::Client(contacts::to_local(&parse_wire(record))),
        ResourceType::Calendar => LocalFields::Appointment(calendar::to_local(&parse_wire(record))),
        ResourceType::Files => LocalFields::Document(drive::to_document(&parse_wire(record))),
        ResourceType::Spreadsheets => {
            LocalFields::Spreadsheet(drive::to_spreadsheet(&parse_wire(record)))
        }
        ResourceType::Tasks => LocalFields::Task(tasks::to_local(&parse_wire(record))),
    }
}

/// Decode a stored wire payload, falling back to an empty one.
///
/// A payload with unexpected shapes maps to absent fields instead of an error.
pub fn parse_wire<T: DeserializeOwned + Default>(record: &RemoteRecord) -> T {
    serde_json::from_value(record.raw.clone()).unwrap_or_default()
}

pub(crate) fn wrong_kind(expected: ResourceType, fields: &LocalFields) -> SyncError {
    SyncError::Mapping(format!(
        "expected {} fields, got {}",
        expected.entity_type(),
        fields.resource_type().entity_type()
    ))
}

/// Trim a string and drop it when nothing is left.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

//! Tasks: local follow-ups <-> the directory's default task list.

use super::{non_blank, wrong_kind};
use crate::{LocalFields, RemoteRecord, ResourceType, Result, TaskFields, Timestamp};
use serde::{Deserialize, Serialize};

pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_NEEDS_ACTION: &str = "needsAction";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

pub fn to_remote(fields: &TaskFields) -> Task {
    let status = if fields.completed {
        STATUS_COMPLETED
    } else {
        STATUS_NEEDS_ACTION
    };

    Task {
        title: non_blank(Some(&fields.title)),
        notes: non_blank(fields.notes.as_deref()),
        status: Some(status.into()),
        due: fields.due,
        ..Default::default()
    }
}

pub fn to_remote_fields(fields: &LocalFields) -> Result<Task> {
    match fields {
        LocalFields::Task(task) => Ok(to_remote(task)),
        other => Err(wrong_kind(ResourceType::Tasks, other)),
    }
}

pub fn to_local(task: &Task) -> TaskFields {
    TaskFields {
        title: non_blank(task.title.as_deref()).unwrap_or_default(),
        notes: non_blank(task.notes.as_deref()),
        due: task.due,
        completed: task.status.as_deref() == Some(STATUS_COMPLETED),
    }
}

pub fn into_record(task: Task) -> Option<RemoteRecord> {
    let remote_id = task.id.clone()?;
    let version_tag = task.etag.clone()?;
    let raw = serde_json::to_value(&task).ok()?;

    Some(RemoteRecord {
        remote_id,
        version_tag,
        updated_at: task.updated,
        deleted: task.deleted,
        raw,
    })
}

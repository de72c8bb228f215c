//! Local field sets, one per mirrored entity type.

use crate::{ResourceType, Timestamp};
use serde::{Deserialize, Serialize};

/// Fields of a client record, mirrored to directory contacts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
}

/// Fields of an appointment, mirrored to calendar events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFields {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<Timestamp>,
    /// iCalendar UID, stable across calendars.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ical_uid: Option<String>,
}

/// Fields of a stored document, mirrored to drive files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fields of a spreadsheet (price lists, billing exports...).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpreadsheetFields {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Fields of a follow-up task, mirrored to the default task list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Timestamp>,
    #[serde(default)]
    pub completed: bool,
}

/// The field set of any mirrored local entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalFields {
    Client(ClientFields),
    Appointment(EventFields),
    Document(DocumentFields),
    Spreadsheet(SpreadsheetFields),
    Task(TaskFields),
}

impl LocalFields {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Self::Client(_) => ResourceType::Contacts,
            Self::Appointment(_) => ResourceType::Calendar,
            Self::Document(_) => ResourceType::Files,
            Self::Spreadsheet(_) => ResourceType::Spreadsheets,
            Self::Task(_) => ResourceType::Tasks,
        }
    }

    /// Human-readable label used in error reports.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Client(f) => &f.name,
            Self::Appointment(f) => &f.title,
            Self::Document(f) => &f.name,
            Self::Spreadsheet(f) => &f.title,
            Self::Task(f) => &f.title,
        }
    }

    /// Normalized identifying field used to pair unlinked records.
    ///
    /// Tasks have no identity: two tasks titled "Call back" are different tasks.
    pub fn identity(&self) -> Option<String> {
        let raw = match self {
            Self::Client(f) => f.email.as_deref().map(str::to_lowercase),
            Self::Appointment(f) => f.ical_uid.clone(),
            Self::Document(f) => Some(f.name.clone()),
            Self::Spreadsheet(f) => Some(f.title.clone()),
            Self::Task(_) => None,
        };
        raw.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}

//! Calendar: local appointments <-> directory events.

use super::{non_blank, wrong_kind};
use crate::{EventFields, LocalFields, RemoteRecord, ResourceType, Result, Timestamp};
use chrono::{NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// `confirmed`, `tentative` or `cancelled`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<EventTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<EventTime>,
    #[serde(rename = "iCalUID", default, skip_serializing_if = "Option::is_none")]
    pub ical_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<Timestamp>,
}

/// Either a timed instant or an all-day date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    fn at(instant: Timestamp) -> Self {
        Self {
            date_time: Some(instant),
            date: None,
            time_zone: Some("UTC".into()),
        }
    }

    /// All-day dates resolve to midnight UTC.
    fn instant(&self) -> Option<Timestamp> {
        self.date_time.or_else(|| {
            self.date
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
    }
}

pub fn to_remote(fields: &EventFields) -> Event {
    Event {
        summary: non_blank(Some(&fields.title)),
        description: non_blank(fields.description.as_deref()),
        location: non_blank(fields.location.as_deref()),
        start: fields.starts_at.map(EventTime::at),
        end: fields.ends_at.map(EventTime::at),
        ical_uid: non_blank(fields.ical_uid.as_deref()),
        ..Default::default()
    }
}

pub fn to_remote_fields(fields: &LocalFields) -> Result<Event> {
    match fields {
        LocalFields::Appointment(event) => Ok(to_remote(event)),
        other => Err(wrong_kind(ResourceType::Calendar, other)),
    }
}

pub fn to_local(event: &Event) -> EventFields {
    EventFields {
        title: non_blank(event.summary.as_deref()).unwrap_or_default(),
        description: non_blank(event.description.as_deref()),
        location: non_blank(event.location.as_deref()),
        starts_at: event.start.as_ref().and_then(EventTime::instant),
        ends_at: event.end.as_ref().and_then(EventTime::instant),
        ical_uid: non_blank(event.ical_uid.as_deref()),
    }
}

pub fn into_record(event: Event) -> Option<RemoteRecord> {
    let remote_id = event.id.clone()?;
    let version_tag = event.etag.clone()?;
    let deleted = event.status.as_deref() == Some("cancelled");
    let updated_at = event.updated;
    let raw = serde_json::to_value(&event).ok()?;

    Some(RemoteRecord {
        remote_id,
        version_tag,
        updated_at,
        deleted,
        raw,
    })
}

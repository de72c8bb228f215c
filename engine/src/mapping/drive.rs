//! Drive files: local documents and spreadsheets <-> directory files.
//!
//! Spreadsheets are drive files with the spreadsheet MIME type, so both local
//! entity types share one wire schema.

use super::{non_blank, wrong_kind};
use crate::{
    DocumentFields, LocalFields, RemoteRecord, ResourceType, Result, SpreadsheetFields, Timestamp,
};
use serde::{Deserialize, Serialize};

pub const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// File fields requested from the directory.
pub const FILE_FIELDS: &str = "id,name,mimeType,description,version,modifiedTime,trashed";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Monotonic file version, encoded by the API as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_time: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub trashed: bool,
}

pub fn document_to_remote(fields: &DocumentFields) -> DriveFile {
    DriveFile {
        name: non_blank(Some(&fields.name)),
        mime_type: non_blank(fields.mime_type.as_deref()),
        description: non_blank(fields.description.as_deref()),
        ..Default::default()
    }
}

pub fn spreadsheet_to_remote(fields: &SpreadsheetFields) -> DriveFile {
    DriveFile {
        name: non_blank(Some(&fields.title)),
        mime_type: Some(SPREADSHEET_MIME_TYPE.into()),
        description: non_blank(fields.description.as_deref()),
        ..Default::default()
    }
}

/// Build the file payload for documents or spreadsheets.
pub fn to_remote_fields(fields: &LocalFields) -> Result<DriveFile> {
    match fields {
        LocalFields::Document(doc) => Ok(document_to_remote(doc)),
        LocalFields::Spreadsheet(sheet) => Ok(spreadsheet_to_remote(sheet)),
        other => Err(wrong_kind(ResourceType::Files, other)),
    }
}

pub fn to_document(file: &DriveFile) -> DocumentFields {
    DocumentFields {
        name: non_blank(file.name.as_deref()).unwrap_or_default(),
        mime_type: non_blank(file.mime_type.as_deref()),
        description: non_blank(file.description.as_deref()),
    }
}

pub fn to_spreadsheet(file: &DriveFile) -> SpreadsheetFields {
    SpreadsheetFields {
        title: non_blank(file.name.as_deref()).unwrap_or_default(),
        description: non_blank(file.description.as_deref()),
    }
}

pub fn into_record(file: DriveFile) -> Option<RemoteRecord> {
    let remote_id = file.id.clone()?;
    let version_tag = file.version.clone()?;
    let raw = serde_json::to_value(&file).ok()?;

    Some(RemoteRecord {
        remote_id,
        version_tag,
        updated_at: file.modified_time,
        deleted: file.trashed,
        raw,
    })
}

/// Escape a value for a drive `q` string literal.
pub fn quote_query(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

//! Drive adapter shared by documents and spreadsheets.
//!
//! Drive has no sync tokens usable per file family, so the change token is
//! the highest `modifiedTime` seen, encoded as RFC 3339. Listings compare
//! with `>=`: the boundary file comes back once and is skipped as unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use bizsync_engine::mapping::drive::{
    self, quote_query, DriveFile, FILE_FIELDS, FOLDER_MIME_TYPE, SPREADSHEET_MIME_TYPE,
};
use bizsync_engine::{
    LocalFields, RemoteRecord, ResourceType, Result, SyncError, Timestamp, VersionTag,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::{
    check_expected_tag, collect_records, found, CreatedRemote, ListPage, ListRequest, RemoteAdapter,
};
use crate::google::{ApiRequest, GoogleClient};

const MAX_PAGE_SIZE: u32 = 1_000;
const SEARCH_PAGE_SIZE: u32 = 50;

/// Which slice of the drive an adapter mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveKind {
    /// Everything except folders and spreadsheets.
    Files,
    Spreadsheets,
}

impl DriveKind {
    fn resource(self) -> ResourceType {
        match self {
            Self::Files => ResourceType::Files,
            Self::Spreadsheets => ResourceType::Spreadsheets,
        }
    }

    fn mime_filter(self) -> String {
        match self {
            Self::Files => format!(
                "mimeType != {} and mimeType != {}",
                quote_query(FOLDER_MIME_TYPE),
                quote_query(SPREADSHEET_MIME_TYPE)
            ),
            Self::Spreadsheets => format!("mimeType = {}", quote_query(SPREADSHEET_MIME_TYPE)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

pub struct DriveAdapter {
    client: Arc<GoogleClient>,
    kind: DriveKind,
}

impl DriveAdapter {
    pub fn new(client: Arc<GoogleClient>, kind: DriveKind) -> Self {
        Self { client, kind }
    }

    fn file_path(remote_id: &str) -> String {
        format!("/files/{}", remote_id)
    }

    fn list_fields() -> String {
        format!("nextPageToken,files({})", FILE_FIELDS)
    }

    async fn fetch_page(
        &self,
        page_size: u32,
        page_token: Option<&str>,
        since: Option<Timestamp>,
    ) -> Result<ListPage> {
        let q = match since {
            // Incremental listings keep trashed files so they surface as tombstones.
            Some(since) => format!(
                "{} and modifiedTime >= {}",
                self.kind.mime_filter(),
                quote_query(&encode_token(since))
            ),
            None => format!("{} and trashed = false", self.kind.mime_filter()),
        };

        let request = ApiRequest::get("/files")
            .query("q", q)
            .query("orderBy", "modifiedTime")
            .query("pageSize", page_size.min(MAX_PAGE_SIZE).to_string())
            .query("fields", Self::list_fields())
            .query_opt("pageToken", page_token);

        let response: FileList = self.client.call(request).await?;
        let high_water = response.files.iter().filter_map(|f| f.modified_time).max();
        Ok(ListPage {
            records: collect_records(self.kind.resource(), response.files, drive::into_record),
            next_page_token: response.next_page_token,
            next_change_token: high_water.map(encode_token),
            token_reset: false,
        })
    }

    async fn fetch_file(&self, remote_id: &str) -> Result<DriveFile> {
        self.client
            .call(ApiRequest::get(Self::file_path(remote_id)).query("fields", FILE_FIELDS))
            .await
    }

    async fn query_files(&self, q: String) -> Result<Vec<RemoteRecord>> {
        let request = ApiRequest::get("/files")
            .query("q", q)
            .query("pageSize", SEARCH_PAGE_SIZE.to_string())
            .query("fields", Self::list_fields());
        let response: FileList = self.client.call(request).await?;
        Ok(collect_records(self.kind.resource(), response.files, drive::into_record))
    }
}

fn encode_token(at: Timestamp) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_token(token: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(token)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

#[async_trait]
impl RemoteAdapter for DriveAdapter {
    fn resource(&self) -> ResourceType {
        self.kind.resource()
    }

    async fn create(&self, fields: &LocalFields) -> Result<CreatedRemote> {
        if fields.resource_type() != self.kind.resource() {
            return Err(SyncError::Mapping(format!(
                "{} adapter cannot store {} fields",
                self.kind.resource(),
                fields.resource_type().entity_type()
            )));
        }
        let file = drive::to_remote_fields(fields)?;
        let request = ApiRequest::post("/files")
            .query("fields", FILE_FIELDS)
            .json(&file)?;

        let created: DriveFile = self.client.call(request).await?;
        CreatedRemote::from_parts(created.id, created.version)
    }

    async fn update(
        &self,
        remote_id: &str,
        fields: &LocalFields,
        expected_tag: Option<&str>,
    ) -> Result<VersionTag> {
        let mut file = drive::to_remote_fields(fields)?;
        // Drive has no conditional writes; compare versions first.
        let current = self.fetch_file(remote_id).await?;
        check_expected_tag(remote_id, expected_tag, current.version.as_deref())?;

        // The type of an existing file is fixed.
        file.mime_type = None;
        let request = ApiRequest::patch(Self::file_path(remote_id))
            .query("fields", FILE_FIELDS)
            .json(&file)?;

        let updated: DriveFile = self.client.call(request).await?;
        updated
            .version
            .ok_or_else(|| SyncError::Validation("update response lacks a version".to_string()))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.client
            .call_empty(ApiRequest::delete(Self::file_path(remote_id)))
            .await
    }

    async fn get(&self, remote_id: &str) -> Result<Option<RemoteRecord>> {
        let file = found(self.fetch_file(remote_id).await)?;
        Ok(file.and_then(drive::into_record))
    }

    async fn list(&self, request: ListRequest<'_>) -> Result<ListPage> {
        let since = match request.change_token {
            None => None,
            Some(token) => match decode_token(token) {
                Some(since) => Some(since),
                None => {
                    tracing::warn!(
                        resource = %self.kind.resource(),
                        token,
                        "unreadable change token, relisting everything"
                    );
                    let mut page = self.fetch_page(request.page_size, None, None).await?;
                    page.token_reset = true;
                    return Ok(page);
                }
            },
        };
        self.fetch_page(request.page_size, request.page_token, since).await
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteRecord>> {
        self.query_files(format!(
            "{} and trashed = false and name contains {}",
            self.kind.mime_filter(),
            quote_query(query)
        ))
        .await
    }

    async fn find_by_exact_field(&self, name: &str) -> Result<Option<RemoteRecord>> {
        let records = self
            .query_files(format!(
                "{} and trashed = false and name = {}",
                self.kind.mime_filter(),
                quote_query(name.trim())
            ))
            .await?;
        Ok(records.into_iter().next())
    }
}

//! Calendar adapter over the primary calendar's events.

use std::sync::Arc;

use async_trait::async_trait;
use bizsync_engine::mapping::calendar::{self, Event};
use bizsync_engine::{LocalFields, RemoteRecord, ResourceType, Result, SyncError, VersionTag};
use serde::Deserialize;

use super::{collect_records, found, CreatedRemote, ListPage, ListRequest, RemoteAdapter};
use crate::google::{ApiRequest, GoogleClient};

const EVENTS_PATH: &str = "/calendars/primary/events";
/// The events listing caps pages at 2500.
const MAX_PAGE_SIZE: u32 = 2_500;
const SEARCH_PAGE_SIZE: u32 = 50;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<Event>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

pub struct CalendarAdapter {
    client: Arc<GoogleClient>,
}

impl CalendarAdapter {
    pub fn new(client: Arc<GoogleClient>) -> Self {
        Self { client }
    }

    fn event_path(remote_id: &str) -> String {
        format!("{}/{}", EVENTS_PATH, remote_id)
    }

    async fn fetch_page(
        &self,
        page_size: u32,
        page_token: Option<&str>,
        sync_token: Option<&str>,
    ) -> Result<ListPage> {
        let mut request = ApiRequest::get(EVENTS_PATH)
            .query("maxResults", page_size.min(MAX_PAGE_SIZE).to_string())
            .query_opt("pageToken", page_token);
        // syncToken cannot be combined with filters; incremental pages
        // always include cancelled events.
        request = match sync_token {
            Some(token) => request.query("syncToken", token),
            None => request.query("showDeleted", "false"),
        };

        let response: EventsResponse = self.client.call(request).await?;
        Ok(ListPage {
            records: collect_records(ResourceType::Calendar, response.items, calendar::into_record),
            next_page_token: response.next_page_token,
            next_change_token: response.next_sync_token,
            token_reset: false,
        })
    }

    async fn query_events(&self, request: ApiRequest) -> Result<Vec<RemoteRecord>> {
        let response: EventsResponse = self.client.call(request).await?;
        Ok(collect_records(ResourceType::Calendar, response.items, calendar::into_record))
    }
}

#[async_trait]
impl RemoteAdapter for CalendarAdapter {
    fn resource(&self) -> ResourceType {
        ResourceType::Calendar
    }

    async fn create(&self, fields: &LocalFields) -> Result<CreatedRemote> {
        let event = calendar::to_remote_fields(fields)?;
        let created: Event = self
            .client
            .call(ApiRequest::post(EVENTS_PATH).json(&event)?)
            .await?;
        CreatedRemote::from_parts(created.id, created.etag)
    }

    async fn update(
        &self,
        remote_id: &str,
        fields: &LocalFields,
        expected_tag: Option<&str>,
    ) -> Result<VersionTag> {
        let event = calendar::to_remote_fields(fields)?;
        let request = ApiRequest::put(Self::event_path(remote_id))
            .if_match(expected_tag)
            .json(&event)?;

        let updated: Event = self.client.call(request).await?;
        updated
            .etag
            .ok_or_else(|| SyncError::Validation("update response lacks an etag".to_string()))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.client
            .call_empty(ApiRequest::delete(Self::event_path(remote_id)))
            .await
    }

    async fn get(&self, remote_id: &str) -> Result<Option<RemoteRecord>> {
        let event: Option<Event> =
            found(self.client.call(ApiRequest::get(Self::event_path(remote_id))).await)?;
        Ok(event.and_then(calendar::into_record))
    }

    async fn list(&self, request: ListRequest<'_>) -> Result<ListPage> {
        match self
            .fetch_page(request.page_size, request.page_token, request.change_token)
            .await
        {
            Err(SyncError::TokenExpired) if request.change_token.is_some() => {
                tracing::warn!("calendar sync token expired, relisting all events");
                let mut page = self.fetch_page(request.page_size, None, None).await?;
                page.token_reset = true;
                Ok(page)
            }
            other => other,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteRecord>> {
        self.query_events(
            ApiRequest::get(EVENTS_PATH)
                .query("q", query)
                .query("maxResults", SEARCH_PAGE_SIZE.to_string()),
        )
        .await
    }

    async fn find_by_exact_field(&self, ical_uid: &str) -> Result<Option<RemoteRecord>> {
        let records = self
            .query_events(ApiRequest::get(EVENTS_PATH).query("iCalUID", ical_uid.trim()))
            .await?;
        Ok(records.into_iter().find(|record| !record.deleted))
    }
}

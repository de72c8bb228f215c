//! Tasks adapter over the default task list.
//!
//! Like drive, the change token is a timestamp: the highest `updated` seen,
//! passed back as `updatedMin` (inclusive).

use std::sync::Arc;

use async_trait::async_trait;
use bizsync_engine::mapping::tasks::{self, Task};
use bizsync_engine::{
    LocalFields, RemoteRecord, ResourceType, Result, SyncError, Timestamp, VersionTag,
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;

use super::{
    check_expected_tag, collect_records, found, CreatedRemote, ListPage, ListRequest, RemoteAdapter,
};
use crate::google::{ApiRequest, GoogleClient};

const TASKS_PATH: &str = "/lists/@default/tasks";
const MAX_PAGE_SIZE: u32 = 100;
/// Pages scanned by a title search; the API has no server-side search.
const SEARCH_PAGE_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskList {
    #[serde(default)]
    items: Vec<Task>,
    next_page_token: Option<String>,
}

pub struct TasksAdapter {
    client: Arc<GoogleClient>,
}

impl TasksAdapter {
    pub fn new(client: Arc<GoogleClient>) -> Self {
        Self { client }
    }

    fn task_path(remote_id: &str) -> String {
        format!("{}/{}", TASKS_PATH, remote_id)
    }

    async fn fetch_page(
        &self,
        page_size: u32,
        page_token: Option<&str>,
        since: Option<Timestamp>,
    ) -> Result<ListPage> {
        let mut request = ApiRequest::get(TASKS_PATH)
            .query("maxResults", page_size.min(MAX_PAGE_SIZE).to_string())
            .query("showHidden", "true")
            .query_opt("pageToken", page_token);
        if let Some(since) = since {
            request = request
                .query("updatedMin", encode_token(since))
                .query("showDeleted", "true");
        }

        let response: TaskList = self.client.call(request).await?;
        let high_water = response.items.iter().filter_map(|t| t.updated).max();
        Ok(ListPage {
            records: collect_records(ResourceType::Tasks, response.items, tasks::into_record),
            next_page_token: response.next_page_token,
            next_change_token: high_water.map(encode_token),
            token_reset: false,
        })
    }

    async fn fetch_task(&self, remote_id: &str) -> Result<Task> {
        self.client.call(ApiRequest::get(Self::task_path(remote_id))).await
    }

    /// Scan the list for tasks whose title satisfies `matches`.
    async fn scan_titles(
        &self,
        matches: impl Fn(&str) -> bool + Send,
    ) -> Result<Vec<RemoteRecord>> {
        let mut found = Vec::new();
        let mut page_token: Option<String> = None;
        for _ in 0..SEARCH_PAGE_LIMIT {
            let page = self
                .fetch_page(MAX_PAGE_SIZE, page_token.as_deref(), None)
                .await?;
            found.extend(page.records.into_iter().filter(|record| {
                let task: Task = bizsync_engine::mapping::parse_wire(record);
                task.title.as_deref().is_some_and(&matches)
            }));
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(found)
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
impl RemoteAdapter for TasksAdapter {
    fn resource(&self) -> ResourceType {
        ResourceType::Tasks
    }

    async fn create(&self, fields: &LocalFields) -> Result<CreatedRemote> {
        let task = tasks::to_remote_fields(fields)?;
        let created: Task = self
            .client
            .call(ApiRequest::post(TASKS_PATH).json(&task)?)
            .await?;
        CreatedRemote::from_parts(created.id, created.etag)
    }

    async fn update(
        &self,
        remote_id: &str,
        fields: &LocalFields,
        expected_tag: Option<&str>,
    ) -> Result<VersionTag> {
        let mut task = tasks::to_remote_fields(fields)?;
        let current = self.fetch_task(remote_id).await?;
        check_expected_tag(remote_id, expected_tag, current.etag.as_deref())?;

        task.id = Some(remote_id.to_string());
        let updated: Task = self
            .client
            .call(ApiRequest::patch(Self::task_path(remote_id)).json(&task)?)
            .await?;
        updated
            .etag
            .ok_or_else(|| SyncError::Validation("update response lacks an etag".to_string()))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.client
            .call_empty(ApiRequest::delete(Self::task_path(remote_id)))
            .await
    }

    async fn get(&self, remote_id: &str) -> Result<Option<RemoteRecord>> {
        let task = found(self.fetch_task(remote_id).await)?;
        Ok(task.and_then(tasks::into_record))
    }

    async fn list(&self, request: ListRequest<'_>) -> Result<ListPage> {
        let since = match request.change_token {
            None => None,
            Some(token) => match decode_token(token) {
                Some(since) => Some(since),
                None => {
                    tracing::warn!(token, "unreadable tasks change token, relisting everything");
                    let mut page = self.fetch_page(request.page_size, None, None).await?;
                    page.token_reset = true;
                    return Ok(page);
                }
            },
        };
        self.fetch_page(request.page_size, request.page_token, since).await
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteRecord>> {
        let needle = query.trim().to_lowercase();
        self.scan_titles(|title| title.to_lowercase().contains(&needle))
            .await
    }

    async fn find_by_exact_field(&self, title: &str) -> Result<Option<RemoteRecord>> {
        let wanted = title.trim().to_string();
        let mut records = self.scan_titles(|candidate| candidate.trim() == wanted).await?;
        Ok(if records.is_empty() {
            None
        } else {
            Some(records.swap_remove(0))
        })
    }
}

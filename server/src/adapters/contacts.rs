//! Contacts adapter over the People API.

use std::sync::Arc;

use async_trait::async_trait;
use bizsync_engine::mapping::contacts::{self, Person, PERSON_FIELDS, UPDATE_PERSON_FIELDS};
use bizsync_engine::{LocalFields, RemoteRecord, ResourceType, Result, SyncError, VersionTag};
use serde::Deserialize;

use super::{collect_records, found, CreatedRemote, ListPage, ListRequest, RemoteAdapter};
use crate::google::{ApiRequest, GoogleClient};

const CONNECTIONS_PATH: &str = "/v1/people/me/connections";
const SEARCH_PAGE_SIZE: u32 = 30;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectionsResponse {
    #[serde(default)]
    connections: Vec<Person>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    person: Option<Person>,
}

pub struct ContactsAdapter {
    client: Arc<GoogleClient>,
}

impl ContactsAdapter {
    pub fn new(client: Arc<GoogleClient>) -> Self {
        Self { client }
    }

    async fn fetch_page(
        &self,
        page_size: u32,
        page_token: Option<&str>,
        sync_token: Option<&str>,
    ) -> Result<ListPage> {
        let request = ApiRequest::get(CONNECTIONS_PATH)
            .query("personFields", PERSON_FIELDS)
            .query("pageSize", page_size.to_string())
            .query("requestSyncToken", "true")
            .query_opt("pageToken", page_token)
            .query_opt("syncToken", sync_token);

        let response: ConnectionsResponse = self.client.call(request).await?;
        Ok(ListPage {
            records: collect_records(
                ResourceType::Contacts,
                response.connections,
                contacts::into_record,
            ),
            next_page_token: response.next_page_token,
            next_change_token: response.next_sync_token,
            token_reset: false,
        })
    }

    async fn fetch_person(&self, remote_id: &str) -> Result<Person> {
        self.client
            .call(
                ApiRequest::get(format!("/v1/{}", remote_id))
                    .query("personFields", PERSON_FIELDS),
            )
            .await
    }
}

#[async_trait]
impl RemoteAdapter for ContactsAdapter {
    fn resource(&self) -> ResourceType {
        ResourceType::Contacts
    }

    async fn create(&self, fields: &LocalFields) -> Result<CreatedRemote> {
        let person = contacts::to_remote_fields(fields)?;
        let request = ApiRequest::post("/v1/people:createContact")
            .query("personFields", PERSON_FIELDS)
            .json(&person)?;

        let created: Person = self.client.call(request).await?;
        CreatedRemote::from_parts(created.resource_name, created.etag)
    }

    async fn update(
        &self,
        remote_id: &str,
        fields: &LocalFields,
        expected_tag: Option<&str>,
    ) -> Result<VersionTag> {
        let mut person = contacts::to_remote_fields(fields)?;
        // The API refuses updates without an etag; fall back to the current one.
        person.etag = match expected_tag {
            Some(tag) => Some(tag.to_string()),
            None => self.fetch_person(remote_id).await?.etag,
        };
        person.resource_name = Some(remote_id.to_string());

        let request = ApiRequest::patch(format!("/v1/{}:updateContact", remote_id))
            .query("updatePersonFields", UPDATE_PERSON_FIELDS)
            .query("personFields", PERSON_FIELDS)
            .json(&person)?;

        let updated: Person = self.client.call(request).await?;
        updated
            .etag
            .ok_or_else(|| SyncError::Validation("update response lacks an etag".to_string()))
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.client
            .call_empty(ApiRequest::delete(format!("/v1/{}:deleteContact", remote_id)))
            .await
    }

    async fn get(&self, remote_id: &str) -> Result<Option<RemoteRecord>> {
        let person = found(self.fetch_person(remote_id).await)?;
        Ok(person.and_then(contacts::into_record))
    }

    async fn list(&self, request: ListRequest<'_>) -> Result<ListPage> {
        match self
            .fetch_page(request.page_size, request.page_token, request.change_token)
            .await
        {
            Err(SyncError::TokenExpired) if request.change_token.is_some() => {
                tracing::warn!("contacts sync token expired, relisting all connections");
                let mut page = self.fetch_page(request.page_size, None, None).await?;
                page.token_reset = true;
                Ok(page)
            }
            other => other,
        }
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteRecord>> {
        let request = ApiRequest::get("/v1/people:searchContacts")
            .query("query", query)
            .query("readMask", PERSON_FIELDS)
            .query("pageSize", SEARCH_PAGE_SIZE.to_string());

        let response: SearchResponse = self.client.call(request).await?;
        let people = response.results.into_iter().filter_map(|r| r.person).collect();
        Ok(collect_records(ResourceType::Contacts, people, contacts::into_record))
    }

    async fn find_by_exact_field(&self, email: &str) -> Result<Option<RemoteRecord>> {
        let wanted = email.trim();
        let candidates = self.search(wanted).await?;
        Ok(candidates.into_iter().find(|record| {
            let person: Person = bizsync_engine::mapping::parse_wire(record);
            person
                .email_addresses
                .iter()
                .filter_map(|e| e.value.as_deref())
                .any(|value| value.trim().eq_ignore_ascii_case(wanted))
        }))
    }
}

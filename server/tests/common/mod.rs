//! In-memory stores and a scripted directory for integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bizsync_engine::mapping::contacts;
use bizsync_engine::{
    ClientFields, LocalEntity, LocalFields, RemoteLink, RemoteRecord, ResourceType, Result,
    SyncError, SyncLogEntry, SyncWatermark, Timestamp, VersionTag,
};
use bizsync_server::adapters::{
    AdapterProvider, CreatedRemote, ListPage, ListRequest, RemoteAdapter,
};
use bizsync_server::google::classify;
use bizsync_server::store::{LocalStore, SyncLogSink, WatermarkStore};
use bizsync_server::sync::{EngineSettings, RetryPolicy, SyncEngine};
use chrono::Utc;

pub const ORG: &str = "org-1";

pub fn client(name: &str, email: &str) -> LocalFields {
    LocalFields::Client(ClientFields {
        name: name.into(),
        email: Some(email.into()),
        ..Default::default()
    })
}

pub fn client_fields(fields: &LocalFields) -> &ClientFields {
    match fields {
        LocalFields::Client(client) => client,
        other => panic!("expected client fields, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Local side
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    entities: Vec<LocalEntity>,
    next_id: u64,
    watermarks: HashMap<(String, ResourceType), SyncWatermark>,
    log: Vec<SyncLogEntry>,
    fail_listing: bool,
}

/// Local entities, watermarks and the sync log, all in memory.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add an entity that was never synced, modified `updated_at`.
    pub fn seed(&self, fields: LocalFields, updated_at: Timestamp) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("e-{}", state.next_id);
        state
            .entities
            .push(LocalEntity::new(id.clone(), ORG, fields, updated_at));
        id
    }

    /// Add an entity already linked to a remote record.
    pub fn seed_linked(
        &self,
        fields: LocalFields,
        remote_id: &str,
        version_tag: &str,
        updated_at: Timestamp,
        synced_at: Timestamp,
    ) -> String {
        let id = self.seed(fields, updated_at);
        let mut state = self.state.lock().unwrap();
        if let Some(entity) = state.entities.iter_mut().find(|e| e.id == id) {
            entity.link(RemoteLink::new(remote_id, version_tag), synced_at);
        }
        id
    }

    pub fn entity(&self, id: &str) -> LocalEntity {
        let state = self.state.lock().unwrap();
        state
            .entities
            .iter()
            .find(|e| e.id == id)
            .cloned()
            .unwrap_or_else(|| panic!("no entity {}", id))
    }

    pub fn entities(&self) -> Vec<LocalEntity> {
        self.state.lock().unwrap().entities.clone()
    }

    pub fn log_entries(&self) -> Vec<SyncLogEntry> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn watermark(&self, resource: ResourceType) -> Option<SyncWatermark> {
        self.state
            .lock()
            .unwrap()
            .watermarks
            .get(&(ORG.to_string(), resource))
            .cloned()
    }

    pub fn put_watermark(&self, watermark: SyncWatermark) {
        let key = (watermark.org_id.clone(), watermark.resource);
        self.state.lock().unwrap().watermarks.insert(key, watermark);
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state.lock().unwrap().fail_listing = fail;
    }

    fn with_entity(&self, id: &str, apply: impl FnOnce(&mut LocalEntity)) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.entities.iter_mut().find(|e| e.id == id) {
            Some(entity) => {
                apply(entity);
                Ok(())
            }
            None => Err(SyncError::Store(format!("entity {} does not exist", id))),
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn list_entities(
        &self,
        org_id: &str,
        resource: ResourceType,
    ) -> Result<Vec<LocalEntity>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(SyncError::Store("connection reset".into()));
        }
        Ok(state
            .entities
            .iter()
            .filter(|e| e.org_id == org_id && e.resource_type() == resource)
            .cloned()
            .collect())
    }

    async fn find_by_identity(
        &self,
        org_id: &str,
        resource: ResourceType,
        identity: &str,
    ) -> Result<Option<LocalEntity>> {
        let state = self.state.lock().unwrap();
        let mut matches: Vec<&LocalEntity> = state
            .entities
            .iter()
            .filter(|e| e.org_id == org_id && e.resource_type() == resource)
            .filter(|e| e.fields.identity().as_deref() == Some(identity))
            .collect();
        matches.sort_by_key(|e| e.is_linked());
        Ok(matches.first().map(|e| (*e).clone()))
    }

    async fn upsert_entity(
        &self,
        org_id: &str,
        fields: &LocalFields,
        link: Option<&RemoteLink>,
        synced_at: Timestamp,
    ) -> Result<LocalEntity> {
        let mut state = self.state.lock().unwrap();
        if let Some(link) = link {
            if let Some(existing) = state
                .entities
                .iter_mut()
                .find(|e| e.remote_id.as_deref() == Some(link.remote_id.as_str()))
            {
                existing.fields = fields.clone();
                existing.updated_at = synced_at;
                existing.link(link.clone(), synced_at);
                return Ok(existing.clone());
            }
        }

        state.next_id += 1;
        let mut entity = LocalEntity::new(
            format!("e-{}", state.next_id),
            org_id,
            fields.clone(),
            synced_at,
        );
        if let Some(link) = link {
            entity.link(link.clone(), synced_at);
        }
        state.entities.push(entity.clone());
        Ok(entity)
    }

    async fn link_remote(
        &self,
        entity_id: &str,
        link: &RemoteLink,
        synced_at: Timestamp,
    ) -> Result<()> {
        self.with_entity(entity_id, |e| e.link(link.clone(), synced_at))
    }

    async fn update_from_remote(
        &self,
        entity_id: &str,
        fields: &LocalFields,
        version_tag: &str,
        synced_at: Timestamp,
    ) -> Result<()> {
        self.with_entity(entity_id, |e| {
            e.fields = fields.clone();
            e.remote_version_tag = Some(version_tag.to_string());
            e.updated_at = synced_at;
            e.last_synced_at = Some(synced_at);
        })
    }

    async fn record_remote_version(&self, entity_id: &str, version_tag: &str) -> Result<()> {
        self.with_entity(entity_id, |e| {
            e.remote_version_tag = Some(version_tag.to_string());
            e.last_synced_at = None;
        })
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn load(&self, org_id: &str, resource: ResourceType) -> Result<Option<SyncWatermark>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .watermarks
            .get(&(org_id.to_string(), resource))
            .cloned())
    }

    async fn save(&self, watermark: &SyncWatermark) -> Result<()> {
        self.put_watermark(watermark.clone());
        Ok(())
    }
}

#[async_trait]
impl SyncLogSink for MemoryStore {
    async fn append(&self, entry: &SyncLogEntry) -> Result<()> {
        self.state.lock().unwrap().log.push(entry.clone());
        Ok(())
    }

    async fn recent(&self, org_id: &str, limit: u32) -> Result<Vec<SyncLogEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .log
            .iter()
            .rev()
            .filter(|e| e.org_id == org_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Remote side
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct FakeContact {
    fields: ClientFields,
    tag: String,
    updated_at: Option<Timestamp>,
    deleted: bool,
    changed_at_seq: u64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Calls {
    pub creates: u32,
    pub updates: u32,
    pub lists: u32,
    pub lookups: u32,
}

#[derive(Default)]
struct DirectoryState {
    contacts: BTreeMap<String, FakeContact>,
    seq: u64,
    next_id: u64,
    calls: Calls,
    rejected_names: HashSet<String>,
    forbidden: HashSet<String>,
    expired_tokens: HashSet<String>,
    transient_create_failures: u32,
    auth_revoked: bool,
    search_lag: bool,
    page_limit: Option<usize>,
}

/// A contacts directory that behaves like the real one, minus the network.
///
/// Change tokens are sequence numbers: a listing with token `n` returns
/// every contact changed after step `n`.
#[derive(Default)]
pub struct FakeDirectory {
    state: Mutex<DirectoryState>,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add or replace a contact as if edited remotely.
    pub fn put(
        &self,
        remote_id: &str,
        fields: ClientFields,
        tag: &str,
        updated_at: Option<Timestamp>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        state.contacts.insert(
            remote_id.to_string(),
            FakeContact {
                fields,
                tag: tag.to_string(),
                updated_at,
                deleted: false,
                changed_at_seq: seq,
            },
        );
    }

    pub fn remove(&self, remote_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.seq += 1;
        let seq = state.seq;
        if let Some(contact) = state.contacts.get_mut(remote_id) {
            contact.deleted = true;
            contact.changed_at_seq = seq;
        }
    }

    pub fn fields(&self, remote_id: &str) -> Option<ClientFields> {
        let state = self.state.lock().unwrap();
        state.contacts.get(remote_id).map(|c| c.fields.clone())
    }

    pub fn tag(&self, remote_id: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.contacts.get(remote_id).map(|c| c.tag.clone())
    }

    pub fn live_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.contacts.values().filter(|c| !c.deleted).count()
    }

    pub fn calls(&self) -> Calls {
        self.state.lock().unwrap().calls
    }

    pub fn reject_name(&self, name: &str) {
        self.state.lock().unwrap().rejected_names.insert(name.to_string());
    }

    /// Updates to this contact are refused the way the directory refuses a
    /// record the delegated user may read but not edit.
    pub fn forbid(&self, remote_id: &str) {
        self.state.lock().unwrap().forbidden.insert(remote_id.to_string());
    }

    pub fn expire_token(&self, token: &str) {
        self.state.lock().unwrap().expired_tokens.insert(token.to_string());
    }

    pub fn fail_creates_transiently(&self, times: u32) {
        self.state.lock().unwrap().transient_create_failures = times;
    }

    pub fn revoke_auth(&self) {
        self.state.lock().unwrap().auth_revoked = true;
    }

    /// Exact lookups miss, like a search index that has not caught up.
    pub fn lag_search(&self) {
        self.state.lock().unwrap().search_lag = true;
    }

    /// Cap listing pages below the requested page size.
    pub fn limit_pages(&self, size: usize) {
        self.state.lock().unwrap().page_limit = Some(size);
    }

    fn record(remote_id: &str, contact: &FakeContact) -> RemoteRecord {
        let mut person = contacts::to_remote(&contact.fields);
        person.resource_name = Some(remote_id.to_string());
        person.etag = Some(contact.tag.clone());
        let raw = serde_json::to_value(&person).unwrap();
        RemoteRecord {
            remote_id: remote_id.to_string(),
            version_tag: contact.tag.clone(),
            updated_at: contact.updated_at,
            deleted: contact.deleted,
            raw,
        }
    }

    fn check_auth(state: &DirectoryState) -> Result<()> {
        if state.auth_revoked {
            return Err(SyncError::AuthFailure("invalid_grant: account disabled".into()));
        }
        Ok(())
    }
}

fn expect_client(fields: &LocalFields) -> Result<ClientFields> {
    match fields {
        LocalFields::Client(client) => Ok(client.clone()),
        other => Err(SyncError::Mapping(format!("not a client: {:?}", other))),
    }
}

#[async_trait]
impl RemoteAdapter for FakeDirectory {
    fn resource(&self) -> ResourceType {
        ResourceType::Contacts
    }

    async fn create(&self, fields: &LocalFields) -> Result<CreatedRemote> {
        let client = expect_client(fields)?;
        let mut state = self.state.lock().unwrap();
        Self::check_auth(&state)?;
        state.calls.creates += 1;
        if state.transient_create_failures > 0 {
            state.transient_create_failures -= 1;
            return Err(SyncError::Transient {
                status: Some(503),
                message: "backend unavailable".into(),
            });
        }
        if state.rejected_names.contains(&client.name) {
            return Err(SyncError::Validation(format!("invalid contact {}", client.name)));
        }

        state.next_id += 1;
        state.seq += 1;
        let remote_id = format!("people/c{}", state.next_id);
        let tag = format!("etag-{}", state.seq);
        let seq = state.seq;
        state.contacts.insert(
            remote_id.clone(),
            FakeContact {
                fields: client,
                tag: tag.clone(),
                updated_at: Some(Utc::now()),
                deleted: false,
                changed_at_seq: seq,
            },
        );
        Ok(CreatedRemote {
            remote_id,
            version_tag: tag,
        })
    }

    async fn update(
        &self,
        remote_id: &str,
        fields: &LocalFields,
        expected_tag: Option<&str>,
    ) -> Result<VersionTag> {
        let client = expect_client(fields)?;
        let mut state = self.state.lock().unwrap();
        Self::check_auth(&state)?;
        state.calls.updates += 1;
        if state.forbidden.contains(remote_id) {
            let body = serde_json::json!({
                "error": {
                    "code": 403,
                    "status": "PERMISSION_DENIED",
                    "message": format!(
                        "The user does not have sufficient permissions for {}.",
                        remote_id
                    ),
                    "errors": [{ "reason": "insufficientFilePermissions" }]
                }
            });
            return Err(classify(403, &body.to_string()));
        }
        state.seq += 1;
        let seq = state.seq;

        let contact = state
            .contacts
            .get_mut(remote_id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| SyncError::NotFound(remote_id.to_string()))?;
        if let Some(expected) = expected_tag {
            if expected != contact.tag {
                return Err(SyncError::VersionConflict(format!(
                    "expected {}, found {}",
                    expected, contact.tag
                )));
            }
        }

        contact.fields = client;
        contact.tag = format!("etag-{}", seq);
        contact.updated_at = Some(Utc::now());
        contact.changed_at_seq = seq;
        Ok(contact.tag.clone())
    }

    async fn delete(&self, remote_id: &str) -> Result<()> {
        self.remove(remote_id);
        Ok(())
    }

    async fn get(&self, remote_id: &str) -> Result<Option<RemoteRecord>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .contacts
            .get(remote_id)
            .filter(|c| !c.deleted)
            .map(|c| Self::record(remote_id, c)))
    }

    async fn list(&self, request: ListRequest<'_>) -> Result<ListPage> {
        let mut state = self.state.lock().unwrap();
        Self::check_auth(&state)?;
        state.calls.lists += 1;

        let mut token_reset = false;
        let since = match request.change_token {
            None => None,
            Some(token) if state.expired_tokens.contains(token) => {
                token_reset = true;
                None
            }
            Some(token) => match token.parse::<u64>() {
                Ok(seq) => Some(seq),
                Err(_) => {
                    token_reset = true;
                    None
                }
            },
        };
        // Restarted listings ignore the old page position.
        let offset = if token_reset {
            0
        } else {
            request.page_token.and_then(|t| t.parse::<usize>().ok()).unwrap_or(0)
        };

        let matching: Vec<RemoteRecord> = state
            .contacts
            .iter()
            .filter(|(_, c)| match since {
                Some(seq) => c.changed_at_seq > seq,
                None => !c.deleted,
            })
            .map(|(id, c)| Self::record(id, c))
            .collect();

        let page_size = state
            .page_limit
            .unwrap_or(usize::MAX)
            .min(request.page_size as usize)
            .max(1);
        let records: Vec<RemoteRecord> = matching
            .iter()
            .skip(offset)
            .take(page_size)
            .cloned()
            .collect();
        let end = offset + records.len();
        let last_page = end >= matching.len();

        Ok(ListPage {
            records,
            next_page_token: (!last_page).then(|| end.to_string()),
            next_change_token: last_page.then(|| state.seq.to_string()),
            token_reset,
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteRecord>> {
        let state = self.state.lock().unwrap();
        let needle = query.to_lowercase();
        Ok(state
            .contacts
            .iter()
            .filter(|(_, c)| !c.deleted)
            .filter(|(_, c)| {
                c.fields.name.to_lowercase().contains(&needle)
                    || c.fields
                        .email
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains(&needle))
            })
            .map(|(id, c)| Self::record(id, c))
            .collect())
    }

    async fn find_by_exact_field(&self, email: &str) -> Result<Option<RemoteRecord>> {
        let mut state = self.state.lock().unwrap();
        Self::check_auth(&state)?;
        state.calls.lookups += 1;
        if state.search_lag {
            return Ok(None);
        }
        Ok(state
            .contacts
            .iter()
            .filter(|(_, c)| !c.deleted)
            .find(|(_, c)| {
                c.fields
                    .email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(email.trim()))
            })
            .map(|(id, c)| Self::record(id, c)))
    }
}

/// Serves one [`FakeDirectory`] for every resource type asked for.
pub struct FakeProvider {
    pub directory: Arc<FakeDirectory>,
    pub available: bool,
}

#[async_trait]
impl AdapterProvider for FakeProvider {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn adapter(&self, _resource: ResourceType) -> Result<Arc<dyn RemoteAdapter>> {
        if !self.available {
            return Err(SyncError::Unavailable);
        }
        let adapter: Arc<dyn RemoteAdapter> = self.directory.clone();
        Ok(adapter)
    }
}

pub fn quick_settings() -> EngineSettings {
    EngineSettings {
        page_size: 50,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
        },
    }
}

pub fn engine(directory: &Arc<FakeDirectory>, store: &Arc<MemoryStore>) -> SyncEngine {
    engine_with(directory, store, true)
}

pub fn engine_with(
    directory: &Arc<FakeDirectory>,
    store: &Arc<MemoryStore>,
    available: bool,
) -> SyncEngine {
    SyncEngine::new(
        Arc::new(FakeProvider {
            directory: Arc::clone(directory),
            available,
        }),
        store.clone(),
        store.clone(),
        store.clone(),
        quick_settings(),
    )
}

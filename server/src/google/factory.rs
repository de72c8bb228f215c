//! Lazily authenticated, cached API clients per resource type.

use std::sync::Arc;

use bizsync_engine::{ResourceType, Result, SyncError};
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::client::GoogleClient;
use super::credentials::{DelegatedSession, ServiceAccountKey, TokenSource};
use crate::config::DirectoryConfig;

/// Base URLs of the remote API families.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub contacts: String,
    pub calendar: String,
    pub drive: String,
    pub tasks: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            contacts: "https://people.googleapis.com".to_string(),
            calendar: "https://www.googleapis.com/calendar/v3".to_string(),
            drive: "https://www.googleapis.com/drive/v3".to_string(),
            tasks: "https://tasks.googleapis.com/tasks/v1".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every API family at one server.
    pub fn all_at(base_url: &str) -> Self {
        let base = base_url.trim_end_matches('/');
        Self {
            contacts: base.to_string(),
            calendar: format!("{}/calendar/v3", base),
            drive: format!("{}/drive/v3", base),
            tasks: format!("{}/tasks/v1", base),
        }
    }

    pub fn for_resource(&self, resource: ResourceType) -> &str {
        match resource {
            ResourceType::Contacts => &self.contacts,
            ResourceType::Calendar => &self.calendar,
            ResourceType::Files | ResourceType::Spreadsheets => &self.drive,
            ResourceType::Tasks => &self.tasks,
        }
    }
}

/// OAuth scope each resource type is granted.
pub fn scope_for(resource: ResourceType) -> &'static str {
    match resource {
        ResourceType::Contacts => "https://www.googleapis.com/auth/contacts",
        ResourceType::Calendar => "https://www.googleapis.com/auth/calendar",
        ResourceType::Files | ResourceType::Spreadsheets => "https://www.googleapis.com/auth/drive",
        ResourceType::Tasks => "https://www.googleapis.com/auth/tasks",
    }
}

/// Hands out authenticated clients.
///
/// The delegation session is built on first use and shared; each resource
/// type gets exactly one client, authenticated once before it is cached.
pub struct ClientFactory {
    config: Option<DirectoryConfig>,
    http: reqwest::Client,
    endpoints: Endpoints,
    session: Mutex<Option<Arc<DelegatedSession>>>,
    clients: DashMap<ResourceType, Arc<GoogleClient>>,
}

impl ClientFactory {
    pub fn new(config: Option<DirectoryConfig>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            endpoints: Endpoints::default(),
            session: Mutex::new(None),
            clients: DashMap::new(),
        }
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Pure configuration check; never touches the network.
    pub fn is_available(&self) -> bool {
        self.config.as_ref().is_some_and(DirectoryConfig::is_complete)
    }

    /// Return the cached client for `resource`, authenticating on first use.
    pub async fn get_client(&self, resource: ResourceType) -> Result<Arc<GoogleClient>> {
        if !self.is_available() {
            return Err(SyncError::Unavailable);
        }
        if let Some(client) = self.clients.get(&resource) {
            return Ok(Arc::clone(client.value()));
        }

        let session = self.session().await?;
        let scoped = session.scoped(scope_for(resource));
        // Authenticate now so bad credentials abort before any phase runs.
        scoped.access_token().await?;

        let tokens: Arc<dyn TokenSource> = Arc::new(scoped);
        let client = Arc::new(GoogleClient::new(
            self.http.clone(),
            tokens,
            self.endpoints.for_resource(resource),
        ));
        tracing::info!(
            resource = %resource,
            subject = %session.subject(),
            "directory client ready"
        );

        let cached = self.clients.entry(resource).or_insert(client);
        Ok(Arc::clone(cached.value()))
    }

    async fn session(&self) -> Result<Arc<DelegatedSession>> {
        let mut slot = self.session.lock().await;
        if let Some(session) = slot.as_ref() {
            return Ok(Arc::clone(session));
        }

        let config = self.config.as_ref().ok_or(SyncError::Unavailable)?;
        let key = ServiceAccountKey::from_json(&config.credentials_json)?;
        let session = Arc::new(DelegatedSession::new(
            self.http.clone(),
            key,
            config.subject.clone(),
        )?);
        tracing::debug!(
            client_email = %session.client_email(),
            subject = %session.subject(),
            "created delegation session"
        );

        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Drop the cached session and clients.
    #[cfg(test)]
    pub async fn reset(&self) {
        *self.session.lock().await = None;
        self.clients.clear();
    }
}

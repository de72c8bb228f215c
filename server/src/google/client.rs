//! Authenticated JSON client for one remote API family.

use std::sync::Arc;

use bizsync_engine::{Result, SyncError};
use reqwest::header::{ACCEPT, IF_MATCH};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::credentials::TokenSource;

/// One request against an API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    if_match: Option<String>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            if_match: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.query.push((name, value.into()));
        self
    }

    pub fn query_opt(self, name: &'static str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(name, value),
            None => self,
        }
    }

    pub fn json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|error| {
                SyncError::Mapping(format!("could not encode request body: {}", error))
            })?;
        self.body = Some(value);
        Ok(self)
    }

    /// Make the write conditional on the remote's current version tag.
    pub fn if_match(mut self, tag: Option<&str>) -> Self {
        self.if_match = tag.map(str::to_string);
        self
    }
}

/// Bearer-authenticated client bound to one API base URL.
pub struct GoogleClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    base_url: String,
}

impl GoogleClient {
    pub fn new(
        http: reqwest::Client,
        tokens: Arc<dyn TokenSource>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            tokens,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Send a request and decode the JSON response body.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        response.json::<T>().await.map_err(|error| {
            SyncError::Validation(format!("unexpected response from {}: {}", path, error))
        })
    }

    /// Send a request whose response body is irrelevant.
    pub async fn call_empty(&self, request: ApiRequest) -> Result<()> {
        self.send(request).await.map(|_| ())
    }

    async fn send(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{}", self.base_url, request.path);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(tag) = &request.if_match {
            builder = builder.header(IF_MATCH, tag.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|error| {
            SyncError::transient(format!("{} {} failed: {}", request.method, request.path, error))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = classify(status.as_u16(), &body);
        tracing::debug!(
            method = %request.method,
            path = %request.path,
            status = status.as_u16(),
            error = %error,
            "remote call failed"
        );
        Err(error)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

const RATE_LIMIT_REASONS: [&str; 3] = [
    "rateLimitExceeded",
    "userRateLimitExceeded",
    "quotaExceeded",
];

/// 403 reasons that reject the delegated credential itself. Any other 403
/// concerns one resource and stays a per-record failure.
const CREDENTIAL_REASONS: [&str; 5] = [
    "unauthorized_client",
    "domainPolicy",
    "accessNotConfigured",
    "ACCESS_TOKEN_SCOPE_INSUFFICIENT",
    "SERVICE_DISABLED",
];

/// Map an unsuccessful HTTP status and its error body to the sync taxonomy.
pub fn classify(status: u16, body: &str) -> SyncError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let detail = envelope.error;
    let message = if detail.message.is_empty() {
        format!("HTTP {}", status)
    } else {
        detail.message.clone()
    };
    let has_reason = |reasons: &[&str]| {
        detail
            .errors
            .iter()
            .any(|e| reasons.contains(&e.reason.as_str()))
    };
    let rate_limited = has_reason(&RATE_LIMIT_REASONS);
    let credential_rejected = has_reason(&CREDENTIAL_REASONS);

    match status {
        401 => SyncError::AuthFailure(message),
        403 if rate_limited => SyncError::Transient {
            status: Some(status),
            message,
        },
        403 if credential_rejected => SyncError::AuthFailure(message),
        404 => SyncError::NotFound(message),
        410 => SyncError::TokenExpired,
        400 if is_expired_token(&message) => SyncError::TokenExpired,
        409 | 412 => SyncError::VersionConflict(message),
        400 if detail.status == "FAILED_PRECONDITION" => SyncError::VersionConflict(message),
        429 | 500..=599 => SyncError::Transient {
            status: Some(status),
            message,
        },
        _ => SyncError::Validation(message),
    }
}

fn is_expired_token(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("sync token") && (lower.contains("expired") || lower.contains("invalid"))
}

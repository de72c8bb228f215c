//! Service-account credentials with domain-wide delegation.
//!
//! A signed assertion naming the impersonated subject is exchanged for a
//! short-lived access token per scope. Tokens are cached and refreshed a
//! minute before they expire.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bizsync_engine::{Result, SyncError};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3_600;
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Anything that can hand out a bearer token for API calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token, for tests and local tooling.
#[derive(Debug, Clone)]
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// The parts of a service-account key document the exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl fmt::Debug for ServiceAccountKey {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    pub fn from_json(document: &str) -> Result<Self> {
        serde_json::from_str(document).map_err(|error| {
            SyncError::AuthFailure(format!("service account key is malformed: {}", error))
        })
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at
            .checked_duration_since(Instant::now())
            .is_some_and(|left| left > REFRESH_MARGIN)
    }
}

/// An authenticated delegation session shared by every client of a process.
pub struct DelegatedSession {
    http: reqwest::Client,
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    subject: String,
    cache: RwLock<HashMap<String, CachedToken>>,
}

impl DelegatedSession {
    pub fn new(
        http: reqwest::Client,
        key: ServiceAccountKey,
        subject: impl Into<String>,
    ) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes()).map_err(|error| {
            SyncError::AuthFailure(format!("service account private key is unusable: {}", error))
        })?;

        Ok(Self {
            http,
            key,
            encoding_key,
            subject: subject.into(),
            cache: RwLock::new(HashMap::new()),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// A token source restricted to one scope.
    pub fn scoped(self: &Arc<Self>, scope: &str) -> ScopedToken {
        ScopedToken {
            session: Arc::clone(self),
            scope: scope.to_string(),
        }
    }

    /// Return a cached token for `scope`, exchanging a new assertion if needed.
    pub async fn token_for(&self, scope: &str) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(token) = cache.get(scope).filter(|t| t.is_fresh()) {
                return Ok(token.value.clone());
            }
        }

        let mut cache = self.cache.write().await;
        if let Some(token) = cache.get(scope).filter(|t| t.is_fresh()) {
            return Ok(token.value.clone());
        }

        let token = self.exchange(scope).await?;
        let value = token.value.clone();
        cache.insert(scope.to_string(), token);
        Ok(value)
    }

    fn assertion(&self, scope: &str, now: i64) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        let claims = AssertionClaims {
            iss: &self.key.client_email,
            sub: &self.subject,
            scope,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        encode(&header, &claims, &self.encoding_key)
            .map_err(|error| SyncError::AuthFailure(format!("could not sign assertion: {}", error)))
    }

    async fn exchange(&self, scope: &str) -> Result<CachedToken> {
        let assertion = self.assertion(scope, chrono::Utc::now().timestamp())?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|error| SyncError::transient(format!("token exchange failed: {}", error)))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(SyncError::Transient {
                status: Some(status.as_u16()),
                message: "token endpoint unavailable".to_string(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: TokenErrorResponse = serde_json::from_str(&body).unwrap_or_default();
            let message = match parsed.error_description {
                Some(description) => format!("{}: {}", parsed.error, description),
                None if !parsed.error.is_empty() => parsed.error,
                None => format!("token endpoint returned HTTP {}", status.as_u16()),
            };
            return Err(SyncError::AuthFailure(message));
        }

        let token: TokenResponse = response.json().await.map_err(|error| {
            SyncError::AuthFailure(format!("token response is malformed: {}", error))
        })?;

        tracing::debug!(
            client_email = %self.key.client_email,
            subject = %self.subject,
            scope,
            "obtained delegated access token"
        );

        let lifetime =
            Duration::from_secs(token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS as u64));
        Ok(CachedToken {
            value: token.access_token,
            expires_at: Instant::now() + lifetime,
        })
    }
}

/// A [`DelegatedSession`] bound to one scope.
#[derive(Clone)]
pub struct ScopedToken {
    session: Arc<DelegatedSession>,
    scope: String,
}

#[async_trait]
impl TokenSource for ScopedToken {
    async fn access_token(&self) -> Result<String> {
        self.session.token_for(&self.scope).await
    }
}

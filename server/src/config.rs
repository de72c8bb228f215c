//! Configuration management for the server.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use bizsync_engine::ResourceType;

/// Server configuration loaded from environment variables.
#[derive(Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Shared bearer secret for the trigger endpoints
    pub auth_secret: Option<String>,
    /// Remote directory credentials; `None` disables directory sync
    pub directory: Option<DirectoryConfig>,
    /// Serve every remote API family from one base URL (proxy or emulator)
    pub api_base_url: Option<String>,
    pub sync: SyncSettings,
}

/// Service-account credentials and the user they act on behalf of.
#[derive(Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    /// Service-account key document (JSON)
    pub credentials_json: String,
    /// Impersonated directory user
    pub subject: String,
}

impl DirectoryConfig {
    /// Both pieces must be present for the subsystem to be usable.
    pub fn is_complete(&self) -> bool {
        !self.credentials_json.trim().is_empty() && !self.subject.trim().is_empty()
    }
}

/// Tunables for sync runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub page_size: u32,
    /// Attempts per remote call, including the first one
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub schedule: Option<ScheduleConfig>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_attempts: 4,
            retry_base_delay: Duration::from_millis(250),
            schedule: None,
        }
    }
}

/// Periodic runs for a fixed set of organizations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub interval: Duration,
    pub org_ids: Vec<String>,
    pub resources: Vec<ResourceType>,
}

const DEFAULT_PAGE_SIZE: u32 = 200;
const MAX_PAGE_SIZE: u32 = 1_000;

impl fmt::Debug for DirectoryConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DirectoryConfig")
            .field("credentials_json", &"[REDACTED]")
            .field("subject", &self.subject)
            .finish()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database_url", &"[REDACTED]")
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "[REDACTED]"))
            .field("directory", &self.directory)
            .field("api_base_url", &self.api_base_url)
            .field("sync", &self.sync)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = value_or_default(&lookup, "HOST", "0.0.0.0");

        let port = value_or_default(&lookup, "PORT", "3000")
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url =
            optional_trimmed(&lookup, "DATABASE_URL").ok_or(ConfigError::MissingDatabaseUrl)?;

        let auth_secret = optional_trimmed(&lookup, "AUTH_SECRET");

        let credentials_json = match optional_trimmed(&lookup, "GOOGLE_SERVICE_ACCOUNT_KEY") {
            Some(inline) => Some(inline),
            None => match optional_trimmed(&lookup, "GOOGLE_SERVICE_ACCOUNT_KEY_FILE") {
                Some(path) => Some(std::fs::read_to_string(&path).map_err(|error| {
                    ConfigError::Invalid(format!(
                        "GOOGLE_SERVICE_ACCOUNT_KEY_FILE could not be read ({}): {}",
                        path, error
                    ))
                })?),
                None => None,
            },
        };
        let subject = optional_trimmed(&lookup, "GOOGLE_IMPERSONATE_SUBJECT");
        let api_base_url = optional_trimmed(&lookup, "GOOGLE_API_BASE_URL");
        let directory = match (credentials_json, subject) {
            (Some(credentials_json), Some(subject)) => Some(DirectoryConfig {
                credentials_json,
                subject,
            }),
            _ => None,
        };

        let page_size = parse_u64(&lookup, "SYNC_PAGE_SIZE", DEFAULT_PAGE_SIZE as u64)?
            .clamp(1, MAX_PAGE_SIZE as u64) as u32;

        let max_retries = parse_u64(&lookup, "SYNC_MAX_RETRIES", 3)?;
        if max_retries > 10 {
            return Err(ConfigError::Invalid(
                "SYNC_MAX_RETRIES must be in [0, 10]".to_string(),
            ));
        }

        let retry_base_ms = parse_u64(&lookup, "SYNC_RETRY_BASE_MS", 250)?;
        if !(10..=60_000).contains(&retry_base_ms) {
            return Err(ConfigError::Invalid(
                "SYNC_RETRY_BASE_MS must be in [10, 60000]".to_string(),
            ));
        }

        let schedule = parse_schedule(&lookup)?;

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            directory,
            api_base_url,
            sync: SyncSettings {
                page_size,
                max_attempts: max_retries as u32 + 1,
                retry_base_delay: Duration::from_millis(retry_base_ms),
                schedule,
            },
        })
    }

    pub fn directory_available(&self) -> bool {
        self.directory.as_ref().is_some_and(DirectoryConfig::is_complete)
    }
}

fn parse_schedule(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<Option<ScheduleConfig>, ConfigError> {
    let Some(orgs) = optional_trimmed(lookup, "SYNC_SCHEDULE_ORGS") else {
        return Ok(None);
    };
    let org_ids = split_list(&orgs);
    if org_ids.is_empty() {
        return Ok(None);
    }

    let interval_secs = parse_u64(lookup, "SYNC_INTERVAL_SECS", 900)?;
    if interval_secs < 60 {
        return Err(ConfigError::Invalid(
            "SYNC_INTERVAL_SECS must be >= 60".to_string(),
        ));
    }

    let resources = match optional_trimmed(lookup, "SYNC_SCHEDULE_RESOURCES") {
        Some(list) => split_list(&list)
            .iter()
            .map(|name| name.parse::<ResourceType>().map_err(ConfigError::Invalid))
            .collect::<Result<Vec<_>, _>>()?,
        None => ResourceType::ALL.to_vec(),
    };

    Ok(Some(ScheduleConfig {
        interval: Duration::from_secs(interval_secs),
        org_ids,
        resources,
    }))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: u64,
) -> Result<u64, ConfigError> {
    match optional_trimmed(lookup, name) {
        Some(value) => value
            .parse::<u64>()
            .map_err(|_| ConfigError::Invalid(format!("{} must be a non-negative integer", name))),
        None => Ok(default),
    }
}

fn value_or_default(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

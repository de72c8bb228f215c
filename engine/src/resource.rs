//! Resource types and the enumerations recorded in the sync log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A remote resource family, each mirrored by exactly one local entity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Contacts,
    Calendar,
    Files,
    Spreadsheets,
    Tasks,
}

impl ResourceType {
    pub const ALL: [ResourceType; 5] = [
        Self::Contacts,
        Self::Calendar,
        Self::Files,
        Self::Spreadsheets,
        Self::Tasks,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contacts => "contacts",
            Self::Calendar => "calendar",
            Self::Files => "files",
            Self::Spreadsheets => "spreadsheets",
            Self::Tasks => "tasks",
        }
    }

    /// Name of the local entity type mirrored by this resource.
    pub fn entity_type(&self) -> &'static str {
        match self {
            Self::Contacts => "client",
            Self::Calendar => "appointment",
            Self::Files => "document",
            Self::Spreadsheets => "spreadsheet",
            Self::Tasks => "task",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown resource type: {}", s))
    }
}

/// Which way a logged operation went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    ToRemote,
    FromRemote,
}

impl SyncDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToRemote => "to_remote",
            Self::FromRemote => "from_remote",
        }
    }
}

impl FromStr for SyncDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_remote" => Ok(Self::ToRemote),
            "from_remote" => Ok(Self::FromRemote),
            other => Err(format!("unknown sync direction: {}", other)),
        }
    }
}

/// Outcome of a logged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Failed,
    Conflict,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Conflict => "conflict",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "conflict" => Ok(Self::Conflict),
            other => Err(format!("unknown sync status: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_type_parses_its_own_name() {
        for resource in ResourceType::ALL {
            assert_eq!(resource.as_str().parse::<ResourceType>(), Ok(resource));
        }
        assert!("mail".parse::<ResourceType>().is_err());
    }

    #[test]
    fn serde_names_match_as_str() {
        let json = serde_json::to_string(&ResourceType::Spreadsheets).unwrap();
        assert_eq!(json, "\"spreadsheets\"");

        let json = serde_json::to_string(&SyncDirection::FromRemote).unwrap();
        assert_eq!(json, format!("\"{}\"", SyncDirection::FromRemote.as_str()));

        let json = serde_json::to_string(&SyncStatus::Conflict).unwrap();
        assert_eq!(json, "\"conflict\"");
    }
}

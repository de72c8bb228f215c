//! Database operations for the sync_log table.

use async_trait::async_trait;
use bizsync_engine::{Result, SyncDirection, SyncError, SyncLogEntry, SyncStatus, Timestamp};
use sqlx::Row;

use super::Pool;
use crate::store::SyncLogSink;

/// A stored log row from the database.
#[derive(Debug)]
pub struct StoredLogEntry {
    #[allow(dead_code)]
    pub id: i64,
    pub org_id: String,
    pub entity_type: String,
    pub entity_id: Option<String>,
    pub remote_id: Option<String>,
    pub direction: String,
    pub status: String,
    pub conflict_resolution: Option<String>,
    pub error_message: Option<String>,
    pub local_snapshot: Option<serde_json::Value>,
    pub remote_snapshot: Option<serde_json::Value>,
    pub occurred_at: Timestamp,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredLogEntry {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredLogEntry {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            entity_type: row.try_get("entity_type")?,
            entity_id: row.try_get("entity_id")?,
            remote_id: row.try_get("remote_id")?,
            direction: row.try_get("direction")?,
            status: row.try_get("status")?,
            conflict_resolution: row.try_get("conflict_resolution")?,
            error_message: row.try_get("error_message")?,
            local_snapshot: row.try_get("local_snapshot")?,
            remote_snapshot: row.try_get("remote_snapshot")?,
            occurred_at: row.try_get("occurred_at")?,
        })
    }
}

impl StoredLogEntry {
    pub fn to_entry(&self) -> Result<SyncLogEntry> {
        let direction = self
            .direction
            .parse::<SyncDirection>()
            .map_err(SyncError::Store)?;
        let status = self.status.parse::<SyncStatus>().map_err(SyncError::Store)?;

        Ok(SyncLogEntry {
            org_id: self.org_id.clone(),
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            remote_id: self.remote_id.clone(),
            direction,
            status,
            conflict_resolution: self.conflict_resolution.clone(),
            error_message: self.error_message.clone(),
            local_snapshot: self.local_snapshot.clone(),
            remote_snapshot: self.remote_snapshot.clone(),
            occurred_at: self.occurred_at,
        })
    }
}

/// Postgres-backed [`SyncLogSink`].
#[derive(Clone)]
pub struct PgSyncLog {
    pool: Pool,
}

impl PgSyncLog {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SyncLogSink for PgSyncLog {
    async fn append(&self, entry: &SyncLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_log (
                org_id, entity_type, entity_id, remote_id, direction, status,
                conflict_resolution, error_message, local_snapshot, remote_snapshot, occurred_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&entry.org_id)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.remote_id)
        .bind(entry.direction.as_str())
        .bind(entry.status.as_str())
        .bind(&entry.conflict_resolution)
        .bind(&entry.error_message)
        .bind(&entry.local_snapshot)
        .bind(&entry.remote_snapshot)
        .bind(entry.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(SyncError::store)?;

        Ok(())
    }

    async fn recent(&self, org_id: &str, limit: u32) -> Result<Vec<SyncLogEntry>> {
        let rows = sqlx::query_as::<_, StoredLogEntry>(
            r#"
            SELECT id, org_id, entity_type, entity_id, remote_id, direction, status,
                   conflict_resolution, error_message, local_snapshot, remote_snapshot, occurred_at
            FROM sync_log
            WHERE org_id = $1
            ORDER BY occurred_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(org_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(SyncError::store)?;

        rows.iter().map(StoredLogEntry::to_entry).collect()
    }
}

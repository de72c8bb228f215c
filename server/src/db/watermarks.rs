//! Database operations for the sync_watermarks table.

use async_trait::async_trait;
use bizsync_engine::{ResourceType, Result, SyncError, SyncWatermark, Timestamp};
use sqlx::Row;

use super::Pool;
use crate::store::WatermarkStore;

/// A stored watermark row from the database.
#[derive(Debug)]
pub struct StoredWatermark {
    pub org_id: String,
    pub resource_type: String,
    pub sync_token: Option<String>,
    pub last_full_sync_at: Option<Timestamp>,
    pub last_incremental_sync_at: Timestamp,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredWatermark {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredWatermark {
            org_id: row.try_get("org_id")?,
            resource_type: row.try_get("resource_type")?,
            sync_token: row.try_get("sync_token")?,
            last_full_sync_at: row.try_get("last_full_sync_at")?,
            last_incremental_sync_at: row.try_get("last_incremental_sync_at")?,
        })
    }
}

impl StoredWatermark {
    pub fn to_watermark(&self) -> Result<SyncWatermark> {
        let resource = self
            .resource_type
            .parse::<ResourceType>()
            .map_err(SyncError::Store)?;

        Ok(SyncWatermark {
            org_id: self.org_id.clone(),
            resource,
            sync_token: self.sync_token.clone(),
            last_full_sync_at: self.last_full_sync_at,
            last_incremental_sync_at: self.last_incremental_sync_at,
        })
    }
}

/// Postgres-backed [`WatermarkStore`].
#[derive(Clone)]
pub struct PgWatermarkStore {
    pool: Pool,
}

impl PgWatermarkStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatermarkStore for PgWatermarkStore {
    async fn load(&self, org_id: &str, resource: ResourceType) -> Result<Option<SyncWatermark>> {
        let row = sqlx::query_as::<_, StoredWatermark>(
            r#"
            SELECT org_id, resource_type, sync_token, last_full_sync_at, last_incremental_sync_at
            FROM sync_watermarks
            WHERE org_id = $1 AND resource_type = $2
            "#,
        )
        .bind(org_id)
        .bind(resource.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(SyncError::store)?;

        row.as_ref().map(StoredWatermark::to_watermark).transpose()
    }

    async fn save(&self, watermark: &SyncWatermark) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_watermarks (
                org_id, resource_type, sync_token, last_full_sync_at, last_incremental_sync_at
            )
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (org_id, resource_type) DO UPDATE SET
                sync_token = EXCLUDED.sync_token,
                last_full_sync_at = EXCLUDED.last_full_sync_at,
                last_incremental_sync_at = EXCLUDED.last_incremental_sync_at
            "#,
        )
        .bind(&watermark.org_id)
        .bind(watermark.resource.as_str())
        .bind(&watermark.sync_token)
        .bind(watermark.last_full_sync_at)
        .bind(watermark.last_incremental_sync_at)
        .execute(&self.pool)
        .await
        .map_err(SyncError::store)?;

        Ok(())
    }
}

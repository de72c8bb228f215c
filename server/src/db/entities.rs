//! Database operations for the local_entities table.

use async_trait::async_trait;
use bizsync_engine::{
    LocalEntity, LocalFields, RemoteLink, ResourceType, Result, SyncError, Timestamp,
};
use sqlx::{PgPool, Row};

use super::Pool;
use crate::store::LocalStore;

/// A stored entity row from the database.
#[derive(Debug)]
pub struct StoredEntity {
    pub id: String,
    pub org_id: String,
    pub fields: serde_json::Value,
    pub updated_at: Timestamp,
    pub remote_id: Option<String>,
    pub remote_version_tag: Option<String>,
    pub last_synced_at: Option<Timestamp>,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEntity {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> std::result::Result<Self, sqlx::Error> {
        Ok(StoredEntity {
            id: row.try_get("id")?,
            org_id: row.try_get("org_id")?,
            fields: row.try_get("fields")?,
            updated_at: row.try_get("updated_at")?,
            remote_id: row.try_get("remote_id")?,
            remote_version_tag: row.try_get("remote_version_tag")?,
            last_synced_at: row.try_get("last_synced_at")?,
        })
    }
}

impl StoredEntity {
    /// Convert database row to an engine entity.
    pub fn to_entity(&self) -> Result<LocalEntity> {
        let fields: LocalFields = serde_json::from_value(self.fields.clone()).map_err(|error| {
            SyncError::Store(format!("entity {} has unreadable fields: {}", self.id, error))
        })?;

        Ok(LocalEntity {
            id: self.id.clone(),
            org_id: self.org_id.clone(),
            fields,
            updated_at: self.updated_at,
            remote_id: self.remote_id.clone(),
            remote_version_tag: self.remote_version_tag.clone(),
            last_synced_at: self.last_synced_at,
        })
    }
}

const ENTITY_COLUMNS: &str =
    "id, org_id, fields, updated_at, remote_id, remote_version_tag, last_synced_at";

fn encode_fields(fields: &LocalFields) -> Result<serde_json::Value> {
    serde_json::to_value(fields).map_err(SyncError::store)
}

/// Postgres-backed [`LocalStore`].
#[derive(Clone)]
pub struct PgLocalStore {
    pool: Pool,
}

impl PgLocalStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LocalStore for PgLocalStore {
    async fn list_entities(
        &self,
        org_id: &str,
        resource: ResourceType,
    ) -> Result<Vec<LocalEntity>> {
        let rows = sqlx::query_as::<_, StoredEntity>(&format!(
            "SELECT {} FROM local_entities \
             WHERE org_id = $1 AND resource_type = $2 \
             ORDER BY updated_at, id",
            ENTITY_COLUMNS
        ))
        .bind(org_id)
        .bind(resource.as_str())
        .fetch_all(self.pool())
        .await
        .map_err(SyncError::store)?;

        rows.iter().map(StoredEntity::to_entity).collect()
    }

    async fn find_by_identity(
        &self,
        org_id: &str,
        resource: ResourceType,
        identity: &str,
    ) -> Result<Option<LocalEntity>> {
        let row = sqlx::query_as::<_, StoredEntity>(&format!(
            r#"
            SELECT {} FROM local_entities
            WHERE org_id = $1 AND resource_type = $2 AND identity = $3
            ORDER BY remote_id NULLS FIRST, updated_at
            LIMIT 1
            "#,
            ENTITY_COLUMNS
        ))
        .bind(org_id)
        .bind(resource.as_str())
        .bind(identity)
        .fetch_optional(self.pool())
        .await
        .map_err(SyncError::store)?;

        row.as_ref().map(StoredEntity::to_entity).transpose()
    }

    async fn upsert_entity(
        &self,
        org_id: &str,
        fields: &LocalFields,
        link: Option<&RemoteLink>,
        synced_at: Timestamp,
    ) -> Result<LocalEntity> {
        let id = uuid::Uuid::new_v4().to_string();
        let row = sqlx::query_as::<_, StoredEntity>(&format!(
            r#"
            INSERT INTO local_entities (
                id, org_id, resource_type, display_name, identity, fields,
                updated_at, remote_id, remote_version_tag, last_synced_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (org_id, resource_type, remote_id) WHERE remote_id IS NOT NULL
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                identity = EXCLUDED.identity,
                fields = EXCLUDED.fields,
                updated_at = EXCLUDED.updated_at,
                remote_version_tag = EXCLUDED.remote_version_tag,
                last_synced_at = EXCLUDED.last_synced_at
            RETURNING {}
            "#,
            ENTITY_COLUMNS
        ))
        .bind(&id)
        .bind(org_id)
        .bind(fields.resource_type().as_str())
        .bind(fields.display_name())
        .bind(fields.identity())
        .bind(encode_fields(fields)?)
        .bind(synced_at)
        .bind(link.map(|l| l.remote_id.as_str()))
        .bind(link.map(|l| l.version_tag.as_str()))
        .bind(link.map(|_| synced_at))
        .fetch_one(self.pool())
        .await
        .map_err(SyncError::store)?;

        row.to_entity()
    }

    async fn link_remote(
        &self,
        entity_id: &str,
        link: &RemoteLink,
        synced_at: Timestamp,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE local_entities
            SET remote_id = $2, remote_version_tag = $3, last_synced_at = $4
            WHERE id = $1
            "#,
        )
        .bind(entity_id)
        .bind(&link.remote_id)
        .bind(&link.version_tag)
        .bind(synced_at)
        .execute(self.pool())
        .await
        .map_err(SyncError::store)?;

        expect_one_row(entity_id, result.rows_affected())
    }

    async fn update_from_remote(
        &self,
        entity_id: &str,
        fields: &LocalFields,
        version_tag: &str,
        synced_at: Timestamp,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE local_entities
            SET display_name = $2, identity = $3, fields = $4,
                remote_version_tag = $5, updated_at = $6, last_synced_at = $6
            WHERE id = $1
            "#,
        )
        .bind(entity_id)
        .bind(fields.display_name())
        .bind(fields.identity())
        .bind(encode_fields(fields)?)
        .bind(version_tag)
        .bind(synced_at)
        .execute(self.pool())
        .await
        .map_err(SyncError::store)?;

        expect_one_row(entity_id, result.rows_affected())
    }

    async fn record_remote_version(&self, entity_id: &str, version_tag: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE local_entities \
             SET remote_version_tag = $2, last_synced_at = NULL \
             WHERE id = $1",
        )
        .bind(entity_id)
        .bind(version_tag)
        .execute(self.pool())
        .await
        .map_err(SyncError::store)?;

        expect_one_row(entity_id, result.rows_affected())
    }
}

fn expect_one_row(entity_id: &str, rows: u64) -> Result<()> {
    if rows == 0 {
        return Err(SyncError::Store(format!("entity {} does not exist", entity_id)));
    }
    Ok(())
}

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{RepoError, TagWithCount, TagsRepo, TagsWriteRepo};
use crate::domain::entities::TagRecord;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const TAG_COLUMNS: &str = "id, name, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TagRow {
    id: Uuid,
    name: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TagRow> for TagRecord {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TagCountRow {
    id: Uuid,
    name: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    post_count: i64,
}

#[async_trait]
impl TagsRepo for PostgresRepositories {
    async fn list_all(&self) -> Result<Vec<TagRecord>, RepoError> {
        let rows = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE deleted_at IS NULL ORDER BY name ASC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(rows.into_iter().map(TagRecord::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(TagRecord::from))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<TagRecord>, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(&format!(
            "SELECT {TAG_COLUMNS} FROM tags WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(TagRecord::from))
    }

    async fn list_popular(&self, limit: u32) -> Result<Vec<TagWithCount>, RepoError> {
        let rows = sqlx::query_as::<_, TagCountRow>(
            "SELECT t.id, t.name, t.created_at, t.updated_at, COUNT(p.id) AS post_count \
             FROM tags t \
             LEFT JOIN post_tags pt ON pt.tag_id = t.id \
             LEFT JOIN posts p \
                ON p.id = pt.post_id \
                AND p.deleted_at IS NULL \
                AND p.status = 'published'::post_status \
             WHERE t.deleted_at IS NULL \
             GROUP BY t.id, t.name, t.created_at, t.updated_at \
             ORDER BY post_count DESC, t.name ASC \
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(rows
            .into_iter()
            .map(|row| TagWithCount {
                record: TagRecord {
                    id: row.id,
                    name: row.name,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
                post_count: row.post_count,
            })
            .collect())
    }
}

#[async_trait]
impl TagsWriteRepo for PostgresRepositories {
    async fn create_tag(&self, name: &str) -> Result<TagRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, TagRow>(&format!(
            "INSERT INTO tags (id, name, created_at, updated_at) \
             VALUES ($1, $2, $3, $3) \
             RETURNING {TAG_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(TagRecord::from(row))
    }

    async fn update_tag(&self, id: Uuid, name: &str) -> Result<TagRecord, RepoError> {
        let row = sqlx::query_as::<_, TagRow>(&format!(
            "UPDATE tags SET name = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {TAG_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(TagRecord::from(row))
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM post_tags WHERE tag_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("UPDATE tags SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }
}

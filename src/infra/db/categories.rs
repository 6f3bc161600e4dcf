use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, CategoryWithCount, RepoError, UpdateCategoryParams,
};
use crate::domain::entities::CategoryRecord;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const CATEGORY_COLUMNS: &str = "id, name, description, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryCountRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    post_count: i64,
}

#[async_trait]
impl CategoriesRepo for PostgresRepositories {
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError> {
        let rows = sqlx::query_as::<_, CategoryCountRow>(
            "SELECT c.id, c.name, c.description, c.created_at, c.updated_at, \
                    COUNT(p.id) AS post_count \
             FROM categories c \
             LEFT JOIN post_categories pc ON pc.category_id = c.id \
             LEFT JOIN posts p ON p.id = pc.post_id AND p.deleted_at IS NULL \
             WHERE c.deleted_at IS NULL \
             GROUP BY c.id, c.name, c.description, c.created_at, c.updated_at \
             ORDER BY c.name ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(rows
            .into_iter()
            .map(|row| CategoryWithCount {
                record: CategoryRecord {
                    id: row.id,
                    name: row.name,
                    description: row.description,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
                post_count: row.post_count,
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(CategoryRecord::from))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRecord>, RepoError> {
        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE name = $1 AND deleted_at IS NULL"
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(CategoryRecord::from))
    }

    async fn count_posts(&self, id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) \
             FROM post_categories pc \
             INNER JOIN posts p ON p.id = pc.post_id AND p.deleted_at IS NULL \
             WHERE pc.category_id = $1",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl CategoriesWriteRepo for PostgresRepositories {
    async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CategoryRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let description = (!description.is_empty()).then_some(description);

        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "INSERT INTO categories (id, name, description, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CategoryRecord::from(row))
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let UpdateCategoryParams {
            id,
            name,
            description,
        } = params;
        let description = (!description.is_empty()).then_some(description);

        let row = sqlx::query_as::<_, CategoryRow>(&format!(
            "UPDATE categories SET name = $2, description = $3, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {CATEGORY_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .bind(description)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CategoryRecord::from(row))
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query("DELETE FROM post_categories WHERE category_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE categories SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }
}

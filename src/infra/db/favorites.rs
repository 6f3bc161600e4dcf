use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageParams;
use crate::application::repos::{
    AuthorSummary, FavoriteQueryFilter, FavoriteWithPost, FavoritesRepo, PostQueryFilter,
    PostWithRelations, RepoError,
};
use crate::domain::entities::{FavoriteRecord, PostRecord};
use crate::domain::types::PostStatus;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const FAVORITE_COLUMNS: &str = "id, user_id, post_id, created_at";

#[derive(sqlx::FromRow)]
struct FavoriteRow {
    id: Uuid,
    user_id: Uuid,
    post_id: Uuid,
    created_at: OffsetDateTime,
}

impl From<FavoriteRow> for FavoriteRecord {
    fn from(row: FavoriteRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            post_id: row.post_id,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FavoriteListRow {
    id: Uuid,
    user_id: Uuid,
    post_id: Uuid,
    created_at: OffsetDateTime,
    post_title: String,
    post_content: String,
    post_summary: Option<String>,
    post_cover: Option<String>,
    post_status: PostStatus,
    post_author_id: Uuid,
    post_view_count: i64,
    post_created_at: OffsetDateTime,
    post_updated_at: OffsetDateTime,
    author_user_id: Option<Uuid>,
    author_username: Option<String>,
    author_avatar: Option<String>,
}

impl FavoriteListRow {
    fn into_parts(self) -> (FavoriteRecord, PostRecord, Option<AuthorSummary>) {
        let author = match (self.author_user_id, self.author_username) {
            (Some(id), Some(username)) => Some(AuthorSummary {
                id,
                username,
                avatar: self.author_avatar,
            }),
            _ => None,
        };

        let favorite = FavoriteRecord {
            id: self.id,
            user_id: self.user_id,
            post_id: self.post_id,
            created_at: self.created_at,
        };

        let post = PostRecord {
            id: self.post_id,
            title: self.post_title,
            content: self.post_content,
            summary: self.post_summary,
            cover: self.post_cover,
            status: self.post_status,
            author_id: self.post_author_id,
            view_count: self.post_view_count,
            created_at: self.post_created_at,
            updated_at: self.post_updated_at,
        };

        (favorite, post, author)
    }
}

/// Appends the favorites/posts join narrowed to the rows `user_id` may see:
/// the post must be live and either published or the user's own.
fn push_favorite_join(qb: &mut QueryBuilder<'_, Postgres>, user_id: Uuid) {
    qb.push(
        " FROM favorites f \
         INNER JOIN posts p ON p.id = f.post_id AND p.deleted_at IS NULL \
         LEFT JOIN users u ON u.id = p.author_id AND u.deleted_at IS NULL \
         WHERE f.deleted_at IS NULL AND f.user_id = ",
    );
    qb.push_bind(user_id);
    qb.push(" AND (p.status = ");
    qb.push_bind(PostStatus::Published);
    qb.push(" OR p.author_id = ");
    qb.push_bind(user_id);
    qb.push(")");
}

#[async_trait]
impl FavoritesRepo for PostgresRepositories {
    async fn create_favorite(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<FavoriteRecord, RepoError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, FavoriteRow>(&format!(
            "INSERT INTO favorites (id, user_id, post_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             RETURNING {FAVORITE_COLUMNS}"
        ))
        .bind(id)
        .bind(user_id)
        .bind(post_id)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FavoriteRecord::from(row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FavoriteRecord>, RepoError> {
        let row = sqlx::query_as::<_, FavoriteRow>(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(FavoriteRecord::from))
    }

    async fn find_for_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<FavoriteRecord>, RepoError> {
        let row = sqlx::query_as::<_, FavoriteRow>(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorites \
             WHERE user_id = $1 AND post_id = $2 AND deleted_at IS NULL"
        ))
        .bind(user_id)
        .bind(post_id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(FavoriteRecord::from))
    }

    async fn delete_favorite(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE favorites SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
        page: PageParams,
    ) -> Result<Vec<FavoriteWithPost>, RepoError> {
        let post_filter = PostQueryFilter {
            tag: None,
            tag_id: filter.tag_id,
            category_id: filter.category_id,
            keyword: filter.keyword.clone(),
        };

        let mut qb = QueryBuilder::new(
            "SELECT f.id, f.user_id, f.post_id, f.created_at, \
                    p.title AS post_title, p.content AS post_content, \
                    p.summary AS post_summary, p.cover AS post_cover, \
                    p.status AS post_status, p.author_id AS post_author_id, \
                    p.view_count AS post_view_count, p.created_at AS post_created_at, \
                    p.updated_at AS post_updated_at, \
                    u.id AS author_user_id, u.username AS author_username, \
                    u.avatar AS author_avatar",
        );
        push_favorite_join(&mut qb, user_id);
        Self::apply_post_filter(&mut qb, &post_filter);
        qb.push(" ORDER BY f.created_at DESC, f.id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<FavoriteListRow>()
            .fetch_all(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        let post_ids: Vec<Uuid> = rows.iter().map(|row| row.post_id).collect();
        let mut tags = self.load_post_tags(&post_ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let (record, post, author) = row.into_parts();
                let tags = tags.remove(&post.id).unwrap_or_default();
                FavoriteWithPost {
                    record,
                    post: PostWithRelations {
                        record: post,
                        author,
                        tags,
                    },
                }
            })
            .collect())
    }

    async fn count_for_user(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
    ) -> Result<u64, RepoError> {
        let post_filter = PostQueryFilter {
            tag: None,
            tag_id: filter.tag_id,
            category_id: filter.category_id,
            keyword: filter.keyword.clone(),
        };

        let mut qb = QueryBuilder::new("SELECT COUNT(*)");
        push_favorite_join(&mut qb, user_id);
        Self::apply_post_filter(&mut qb, &post_filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }
}

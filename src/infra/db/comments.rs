use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageParams;
use crate::application::repos::{
    AuthorSummary, AuthoredComment, CommentQueryFilter, CommentWithAuthor, CommentsRepo,
    CreateCommentParams, RepoError,
};
use crate::domain::entities::CommentRecord;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const COMMENT_COLUMNS: &str = "id, content, author_id, post_id, parent_id, created_at, updated_at";

pub(super) const COMMENT_JOIN_SELECT: &str =
    "SELECT c.id, c.content, c.author_id, c.post_id, c.parent_id, c.created_at, c.updated_at, \
            u.id AS author_user_id, u.username AS author_username, u.avatar AS author_avatar \
     FROM comments c \
     LEFT JOIN users u ON u.id = c.author_id AND u.deleted_at IS NULL \
     WHERE c.deleted_at IS NULL";

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    content: String,
    author_id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            content: row.content,
            author_id: row.author_id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct CommentJoinRow {
    id: Uuid,
    content: String,
    author_id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    author_user_id: Option<Uuid>,
    author_username: Option<String>,
    author_avatar: Option<String>,
}

impl From<CommentJoinRow> for CommentWithAuthor {
    fn from(row: CommentJoinRow) -> Self {
        let author = match (row.author_user_id, row.author_username) {
            (Some(id), Some(username)) => Some(AuthorSummary {
                id,
                username,
                avatar: row.author_avatar,
            }),
            _ => None,
        };

        Self {
            record: CommentRecord {
                id: row.id,
                content: row.content,
                author_id: row.author_id,
                post_id: row.post_id,
                parent_id: row.parent_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            author,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AuthoredRow {
    id: Uuid,
    content: String,
    author_id: Uuid,
    post_id: Uuid,
    parent_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    post_title: String,
    parent_author: Option<String>,
    parent_content: Option<String>,
}

impl From<AuthoredRow> for AuthoredComment {
    fn from(row: AuthoredRow) -> Self {
        Self {
            record: CommentRecord {
                id: row.id,
                content: row.content,
                author_id: row.author_id,
                post_id: row.post_id,
                parent_id: row.parent_id,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            post_title: row.post_title,
            parent_author: row.parent_author,
            parent_content: row.parent_content,
        }
    }
}

fn apply_authored_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q CommentQueryFilter) {
    if let Some(post_id) = filter.post_id {
        qb.push(" AND c.post_id = ");
        qb.push_bind(post_id);
    }
    if let Some(keyword) = filter.keyword.as_ref() {
        qb.push(" AND c.content ILIKE ");
        qb.push_bind(format!("%{keyword}%"));
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_parents(
        &self,
        post_id: Uuid,
        page: PageParams,
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let mut qb = QueryBuilder::new(COMMENT_JOIN_SELECT);
        qb.push(" AND c.post_id = ");
        qb.push_bind(post_id);
        qb.push(" AND c.parent_id IS NULL ORDER BY c.created_at DESC, c.id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<CommentJoinRow>()
            .fetch_all(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    async fn count_parents(&self, post_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM comments \
             WHERE post_id = $1 AND parent_id IS NULL AND deleted_at IS NULL",
        )
        .bind(post_id)
        .fetch_one(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }

    async fn list_replies(
        &self,
        parent_ids: &[Uuid],
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, CommentJoinRow>(&format!(
            "{COMMENT_JOIN_SELECT} AND c.parent_id = ANY($1) \
             ORDER BY c.created_at ASC, c.id ASC"
        ))
        .bind(parent_ids)
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(rows.into_iter().map(CommentWithAuthor::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(CommentRecord::from))
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentWithAuthor, RepoError> {
        let CreateCommentParams {
            content,
            author_id,
            post_id,
            parent_id,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "INSERT INTO comments (id, content, author_id, post_id, parent_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .bind(author_id)
        .bind(post_id)
        .bind(parent_id)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let author = self.load_author_summary(author_id).await?;

        Ok(CommentWithAuthor {
            record: CommentRecord::from(row),
            author,
        })
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<CommentRecord, RepoError> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "UPDATE comments SET content = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {COMMENT_COLUMNS}"
        ))
        .bind(id)
        .bind(content)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CommentRecord::from(row))
    }

    async fn delete_cascade(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE notifications SET deleted_at = now() \
             WHERE deleted_at IS NULL AND comment_id IN \
                (SELECT id FROM comments WHERE id = $1 OR parent_id = $1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE comments SET deleted_at = now() \
             WHERE parent_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE comments SET deleted_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn list_by_author(
        &self,
        author_id: Uuid,
        filter: &CommentQueryFilter,
        page: PageParams,
    ) -> Result<Vec<AuthoredComment>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT c.id, c.content, c.author_id, c.post_id, c.parent_id, \
                    c.created_at, c.updated_at, \
                    p.title AS post_title, \
                    pu.username AS parent_author, \
                    pc.content AS parent_content \
             FROM comments c \
             INNER JOIN posts p ON p.id = c.post_id AND p.deleted_at IS NULL \
             LEFT JOIN comments pc ON pc.id = c.parent_id AND pc.deleted_at IS NULL \
             LEFT JOIN users pu ON pu.id = pc.author_id AND pu.deleted_at IS NULL \
             WHERE c.deleted_at IS NULL AND c.author_id = ",
        );
        qb.push_bind(author_id);
        apply_authored_filter(&mut qb, filter);
        qb.push(" ORDER BY c.created_at DESC, c.id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<AuthoredRow>()
            .fetch_all(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Ok(rows.into_iter().map(AuthoredComment::from).collect())
    }

    async fn count_by_author(
        &self,
        author_id: Uuid,
        filter: &CommentQueryFilter,
    ) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT COUNT(*) FROM comments c \
             INNER JOIN posts p ON p.id = c.post_id AND p.deleted_at IS NULL \
             WHERE c.deleted_at IS NULL AND c.author_id = ",
        );
        qb.push_bind(author_id);
        apply_authored_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }
}

impl PostgresRepositories {
    async fn load_author_summary(&self, id: Uuid) -> Result<Option<AuthorSummary>, RepoError> {
        #[derive(sqlx::FromRow)]
        struct AuthorRow {
            id: Uuid,
            username: String,
            avatar: Option<String>,
        }

        let row = sqlx::query_as::<_, AuthorRow>(
            "SELECT id, username, avatar FROM users WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(|row| AuthorSummary {
            id: row.id,
            username: row.username,
            avatar: row.avatar,
        }))
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageParams;
use crate::application::repos::{
    AuthorSummary, CommentWithAuthor, CreatePostParams, PostDetail, PostListScope, PostQueryFilter,
    PostWithRelations, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::domain::entities::{PostRecord, TagRecord};
use crate::domain::types::PostStatus;

use super::PostgresRepositories;
use super::comments::{COMMENT_JOIN_SELECT, CommentJoinRow};
use super::util::map_sqlx_error;

const POST_COLUMNS: &str =
    "id, title, content, summary, cover, status, author_id, view_count, created_at, updated_at";

const POST_JOIN_SELECT: &str =
    "SELECT p.id, p.title, p.content, p.summary, p.cover, p.status, p.author_id, \
            p.view_count, p.created_at, p.updated_at, \
            u.id AS author_user_id, u.username AS author_username, u.avatar AS author_avatar \
     FROM posts p \
     LEFT JOIN users u ON u.id = p.author_id AND u.deleted_at IS NULL \
     WHERE p.deleted_at IS NULL";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    title: String,
    content: String,
    summary: Option<String>,
    cover: Option<String>,
    status: PostStatus,
    author_id: Uuid,
    view_count: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            content: row.content,
            summary: row.summary,
            cover: row.cover,
            status: row.status,
            author_id: row.author_id,
            view_count: row.view_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(super) struct PostJoinRow {
    id: Uuid,
    title: String,
    content: String,
    summary: Option<String>,
    cover: Option<String>,
    status: PostStatus,
    author_id: Uuid,
    view_count: i64,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    author_user_id: Option<Uuid>,
    author_username: Option<String>,
    author_avatar: Option<String>,
}

impl PostJoinRow {
    pub(super) fn into_parts(self) -> (PostRecord, Option<AuthorSummary>) {
        let author = match (self.author_user_id, self.author_username) {
            (Some(id), Some(username)) => Some(AuthorSummary {
                id,
                username,
                avatar: self.author_avatar,
            }),
            _ => None,
        };

        let record = PostRecord {
            id: self.id,
            title: self.title,
            content: self.content,
            summary: self.summary,
            cover: self.cover,
            status: self.status,
            author_id: self.author_id,
            view_count: self.view_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };

        (record, author)
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn list_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
        page: PageParams,
    ) -> Result<Vec<PostWithRelations>, RepoError> {
        let mut qb = QueryBuilder::new(POST_JOIN_SELECT);
        Self::apply_scope_conditions(&mut qb, scope);
        Self::apply_post_filter(&mut qb, filter);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<PostJoinRow>()
            .fetch_all(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut tags = self.load_post_tags(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let (record, author) = row.into_parts();
                let tags = tags.remove(&record.id).unwrap_or_default();
                PostWithRelations {
                    record,
                    author,
                    tags,
                }
            })
            .collect())
    }

    async fn count_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
    ) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE p.deleted_at IS NULL");
        Self::apply_scope_conditions(&mut qb, scope);
        Self::apply_post_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let row = sqlx::query_as::<_, PostRow>(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(PostRecord::from))
    }

    async fn find_with_relations(&self, id: Uuid) -> Result<Option<PostWithRelations>, RepoError> {
        let Some(row) = sqlx::query_as::<_, PostJoinRow>(&format!(
            "{POST_JOIN_SELECT} AND p.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?
        else {
            return Ok(None);
        };

        let mut tags = self.load_post_tags(&[id]).await?;
        let (record, author) = row.into_parts();
        let tags = tags.remove(&record.id).unwrap_or_default();

        Ok(Some(PostWithRelations {
            record,
            author,
            tags,
        }))
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<PostDetail>, RepoError> {
        let Some(with_relations) = self.find_with_relations(id).await? else {
            return Ok(None);
        };

        let comment_rows = sqlx::query_as::<_, CommentJoinRow>(&format!(
            "{COMMENT_JOIN_SELECT} AND c.post_id = $1 ORDER BY c.created_at ASC, c.id ASC"
        ))
        .bind(id)
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        let PostWithRelations {
            record,
            author,
            tags,
        } = with_relations;

        Ok(Some(PostDetail {
            record,
            author,
            tags,
            comments: comment_rows
                .into_iter()
                .map(CommentWithAuthor::from)
                .collect(),
        }))
    }

    async fn count_by_author(&self, author_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM posts WHERE author_id = $1 AND deleted_at IS NULL",
        )
        .bind(author_id)
        .fetch_one(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let CreatePostParams {
            title,
            content,
            summary,
            cover,
            status,
            author_id,
            tag_names,
            category_ids,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, PostRow>(&format!(
            "INSERT INTO posts (id, title, content, summary, cover, status, author_id, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8) \
             RETURNING {POST_COLUMNS}"
        ))
        .bind(id)
        .bind(title)
        .bind(content)
        .bind(summary)
        .bind(cover)
        .bind(status)
        .bind(author_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let tag_ids = ensure_tags(&mut tx, &tag_names).await?;
        link_tags(&mut tx, id, &tag_ids).await?;
        link_categories(&mut tx, id, &category_ids).await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let UpdatePostParams {
            id,
            title,
            content,
            summary,
            cover,
            status,
            tag_names,
            category_ids,
        } = params;

        let mut tx = self.pool().begin().await.map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new("UPDATE posts SET updated_at = now()");
        if let Some(title) = title {
            qb.push(", title = ");
            qb.push_bind(title);
        }
        if let Some(content) = content {
            qb.push(", content = ");
            qb.push_bind(content);
        }
        if let Some(summary) = summary {
            qb.push(", summary = ");
            qb.push_bind(summary);
        }
        if let Some(cover) = cover {
            qb.push(", cover = ");
            qb.push_bind(cover);
        }
        if let Some(status) = status {
            qb.push(", status = ");
            qb.push_bind(status);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(POST_COLUMNS);

        let row = qb
            .build_query_as::<PostRow>()
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(names) = tag_names {
            sqlx::query("DELETE FROM post_tags WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            let tag_ids = ensure_tags(&mut tx, &names).await?;
            link_tags(&mut tx, id, &tag_ids).await?;
        }

        if let Some(category_ids) = category_ids {
            sqlx::query("DELETE FROM post_categories WHERE post_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;

            link_categories(&mut tx, id, &category_ids).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        sqlx::query("UPDATE posts SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn add_view_count(&self, id: Uuid, amount: i64) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE posts SET view_count = view_count + $2 \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(amount)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}

impl PostgresRepositories {
    /// Tags for a batch of posts, keyed by post id. Posts without tags are
    /// simply absent from the map.
    pub(super) async fn load_post_tags(
        &self,
        post_ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<TagRecord>>, RepoError> {
        if post_ids.is_empty() {
            return Ok(HashMap::new());
        }

        #[derive(sqlx::FromRow)]
        struct PostTagRow {
            post_id: Uuid,
            id: Uuid,
            name: String,
            created_at: OffsetDateTime,
            updated_at: OffsetDateTime,
        }

        let rows = sqlx::query_as::<_, PostTagRow>(
            "SELECT pt.post_id, t.id, t.name, t.created_at, t.updated_at \
             FROM post_tags pt \
             INNER JOIN tags t ON t.id = pt.tag_id AND t.deleted_at IS NULL \
             WHERE pt.post_id = ANY($1) \
             ORDER BY t.name ASC",
        )
        .bind(post_ids)
        .fetch_all(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        let mut map: HashMap<Uuid, Vec<TagRecord>> = HashMap::new();
        for row in rows {
            map.entry(row.post_id).or_default().push(TagRecord {
                id: row.id,
                name: row.name,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }

        Ok(map)
    }
}

/// Resolves tag names to ids inside the transaction, inserting names that
/// do not exist yet.
async fn ensure_tags(
    tx: &mut Transaction<'_, Postgres>,
    names: &[String],
) -> Result<Vec<Uuid>, RepoError> {
    let mut ids = Vec::with_capacity(names.len());

    for name in names {
        let existing: Option<Uuid> =
            sqlx::query_scalar("SELECT id FROM tags WHERE name = $1 AND deleted_at IS NULL")
                .bind(name)
                .fetch_optional(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;

        let tag_id = match existing {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                sqlx::query(
                    "INSERT INTO tags (id, name, created_at, updated_at) \
                     VALUES ($1, $2, now(), now())",
                )
                .bind(id)
                .bind(name)
                .execute(&mut **tx)
                .await
                .map_err(map_sqlx_error)?;
                id
            }
        };

        ids.push(tag_id);
    }

    Ok(ids)
}

async fn link_tags(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    tag_ids: &[Uuid],
) -> Result<(), RepoError> {
    if tag_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO post_tags (post_id, tag_id) \
         SELECT $1, id FROM UNNEST($2::uuid[]) AS id \
         ON CONFLICT DO NOTHING",
    )
    .bind(post_id)
    .bind(tag_ids)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

async fn link_categories(
    tx: &mut Transaction<'_, Postgres>,
    post_id: Uuid,
    category_ids: &[Uuid],
) -> Result<(), RepoError> {
    if category_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        "INSERT INTO post_categories (post_id, category_id) \
         SELECT $1, id FROM UNNEST($2::uuid[]) AS id \
         ON CONFLICT DO NOTHING",
    )
    .bind(post_id)
    .bind(category_ids)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

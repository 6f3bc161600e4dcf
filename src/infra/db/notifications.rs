use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::PageParams;
use crate::application::repos::{
    AuthorSummary, CreateNotificationParams, NotificationQueryFilter, NotificationWithActor,
    NotificationsRepo, RepoError,
};
use crate::domain::entities::NotificationRecord;
use crate::domain::types::NotificationKind;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const NOTIFICATION_COLUMNS: &str = "id, kind, content, is_read, recipient_id, actor_id, \
     post_id, comment_id, redirect_url, created_at";

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    kind: NotificationKind,
    content: String,
    is_read: bool,
    recipient_id: Uuid,
    actor_id: Option<Uuid>,
    post_id: Option<Uuid>,
    comment_id: Option<Uuid>,
    redirect_url: Option<String>,
    created_at: OffsetDateTime,
}

impl From<NotificationRow> for NotificationRecord {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            content: row.content,
            is_read: row.is_read,
            recipient_id: row.recipient_id,
            actor_id: row.actor_id,
            post_id: row.post_id,
            comment_id: row.comment_id,
            redirect_url: row.redirect_url,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NotificationJoinRow {
    id: Uuid,
    kind: NotificationKind,
    content: String,
    is_read: bool,
    recipient_id: Uuid,
    actor_id: Option<Uuid>,
    post_id: Option<Uuid>,
    comment_id: Option<Uuid>,
    redirect_url: Option<String>,
    created_at: OffsetDateTime,
    actor_username: Option<String>,
    actor_avatar: Option<String>,
}

impl From<NotificationJoinRow> for NotificationWithActor {
    fn from(row: NotificationJoinRow) -> Self {
        let actor = match (row.actor_id, row.actor_username) {
            (Some(id), Some(username)) => Some(AuthorSummary {
                id,
                username,
                avatar: row.actor_avatar,
            }),
            _ => None,
        };

        Self {
            record: NotificationRecord {
                id: row.id,
                kind: row.kind,
                content: row.content,
                is_read: row.is_read,
                recipient_id: row.recipient_id,
                actor_id: row.actor_id,
                post_id: row.post_id,
                comment_id: row.comment_id,
                redirect_url: row.redirect_url,
                created_at: row.created_at,
            },
            actor,
        }
    }
}

fn apply_notification_filter<'q>(
    qb: &mut QueryBuilder<'q, Postgres>,
    filter: &'q NotificationQueryFilter,
) {
    if let Some(is_read) = filter.is_read {
        qb.push(" AND n.is_read = ");
        qb.push_bind(is_read);
    }
    if let Some(kind) = filter.kind {
        qb.push(" AND n.kind = ");
        qb.push_bind(kind);
    }
}

#[async_trait]
impl NotificationsRepo for PostgresRepositories {
    async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<NotificationRecord, RepoError> {
        let CreateNotificationParams {
            kind,
            content,
            recipient_id,
            actor_id,
            post_id,
            comment_id,
            redirect_url,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            "INSERT INTO notifications (id, kind, content, recipient_id, actor_id, \
                 post_id, comment_id, redirect_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9) \
             RETURNING {NOTIFICATION_COLUMNS}"
        ))
        .bind(id)
        .bind(kind)
        .bind(content)
        .bind(recipient_id)
        .bind(actor_id)
        .bind(post_id)
        .bind(comment_id)
        .bind(redirect_url)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(NotificationRecord::from(row))
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationQueryFilter,
        page: PageParams,
    ) -> Result<Vec<NotificationWithActor>, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT n.id, n.kind, n.content, n.is_read, n.recipient_id, n.actor_id, \
                    n.post_id, n.comment_id, n.redirect_url, n.created_at, \
                    a.username AS actor_username, a.avatar AS actor_avatar \
             FROM notifications n \
             LEFT JOIN users a ON a.id = n.actor_id AND a.deleted_at IS NULL \
             WHERE n.deleted_at IS NULL AND n.recipient_id = ",
        );
        qb.push_bind(user_id);
        apply_notification_filter(&mut qb, filter);
        qb.push(" ORDER BY n.created_at DESC, n.id DESC LIMIT ");
        qb.push_bind(page.limit());
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());

        let rows = qb
            .build_query_as::<NotificationJoinRow>()
            .fetch_all(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Ok(rows.into_iter().map(NotificationWithActor::from).collect())
    }

    async fn count_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationQueryFilter,
    ) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new(
            "SELECT COUNT(*) FROM notifications n \
             WHERE n.deleted_at IS NULL AND n.recipient_id = ",
        );
        qb.push_bind(user_id);
        apply_notification_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM notifications \
             WHERE deleted_at IS NULL AND recipient_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, updated_at = now() \
             WHERE id = $1 AND recipient_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, updated_at = now() \
             WHERE recipient_id = $1 AND is_read = FALSE AND deleted_at IS NULL",
        )
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE notifications SET deleted_at = now() \
             WHERE id = $1 AND recipient_id = $2 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}

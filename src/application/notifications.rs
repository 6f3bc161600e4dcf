//! The caller's notification inbox.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{DEFAULT_NOTIFICATION_PAGE_SIZE, PageData, PageParams};
use crate::application::repos::{
    NotificationQueryFilter, NotificationWithActor, NotificationsRepo, RepoError,
};
use crate::application::tokens::AuthUser;
use crate::domain::error::DomainError;
use crate::domain::types::NotificationKind;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone, Default)]
pub struct NotificationsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub is_read: Option<bool>,
    pub kind: Option<NotificationKind>,
}

/// A page of notifications plus the caller's unread total. The unread
/// count ignores the filters so badges stay accurate.
#[derive(Debug, Clone)]
pub struct NotificationInbox {
    pub page: PageData<NotificationWithActor>,
    pub unread: u64,
}

#[derive(Clone)]
pub struct NotificationService {
    notifications: Arc<dyn NotificationsRepo>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationsRepo>) -> Self {
        Self { notifications }
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        query: NotificationsQuery,
    ) -> Result<NotificationInbox, NotificationError> {
        let page = PageParams::new(query.page, query.size, DEFAULT_NOTIFICATION_PAGE_SIZE);
        let filter = NotificationQueryFilter {
            is_read: query.is_read,
            kind: query.kind,
        };

        let total = self.notifications.count_for_user(user.id, &filter).await?;
        let unread = self.notifications.count_unread(user.id).await?;
        let data = self
            .notifications
            .list_for_user(user.id, &filter, page)
            .await?;

        Ok(NotificationInbox {
            page: PageData::new(data, total, page),
            unread,
        })
    }

    /// Someone else's notification reads as absent, never as forbidden.
    pub async fn mark_read(&self, user: &AuthUser, id: Uuid) -> Result<(), NotificationError> {
        let affected = self.notifications.mark_read(id, user.id).await?;
        if affected == 0 {
            return Err(DomainError::not_found("notification").into());
        }
        Ok(())
    }

    /// Marks every unread notification read and reports how many changed.
    pub async fn mark_all_read(&self, user: &AuthUser) -> Result<u64, NotificationError> {
        Ok(self.notifications.mark_all_read(user.id).await?)
    }

    pub async fn delete(&self, user: &AuthUser, id: Uuid) -> Result<(), NotificationError> {
        let affected = self.notifications.delete_notification(id, user.id).await?;
        if affected == 0 {
            return Err(DomainError::not_found("notification").into());
        }
        Ok(())
    }
}

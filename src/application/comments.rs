//! Comments, threaded replies, and the notifications they raise.

use std::sync::Arc;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::application::pagination::{DEFAULT_COMMENT_PAGE_SIZE, PageData, PageParams};
use crate::application::posts::post_visible_to;
use crate::application::repos::{
    AuthoredComment, CommentQueryFilter, CommentWithAuthor, CommentsRepo, CreateCommentParams,
    CreateNotificationParams, NotificationsRepo, PostsRepo, RepoError,
};
use crate::application::tokens::AuthUser;
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::error::DomainError;
use crate::domain::types::NotificationKind;
use crate::domain::validate;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("only the author or an admin may modify this comment")]
    Forbidden,
}

#[derive(Debug, Clone)]
pub struct CreateCommentCommand {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default)]
pub struct AuthoredCommentsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub post_id: Option<Uuid>,
    pub keyword: Option<String>,
}

/// A top-level comment with its replies attached, the list shape.
/// Rows are stored flat; nesting happens here.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentThread {
    pub comment: CommentWithAuthor,
    pub replies: Vec<CommentWithAuthor>,
}

#[derive(Clone)]
pub struct CommentService {
    comments: Arc<dyn CommentsRepo>,
    posts: Arc<dyn PostsRepo>,
    notifications: Arc<dyn NotificationsRepo>,
}

impl CommentService {
    pub fn new(
        comments: Arc<dyn CommentsRepo>,
        posts: Arc<dyn PostsRepo>,
        notifications: Arc<dyn NotificationsRepo>,
    ) -> Self {
        Self {
            comments,
            posts,
            notifications,
        }
    }

    /// Top-level comments for a post, newest first, each with its
    /// replies oldest first. The page window covers parents only.
    pub async fn list_for_post(
        &self,
        viewer: Option<&AuthUser>,
        post_id: Uuid,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<PageData<CommentThread>, CommentError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        if !post_visible_to(&post, viewer) {
            return Err(DomainError::not_found("post").into());
        }

        let page = PageParams::new(page, size, DEFAULT_COMMENT_PAGE_SIZE);
        let total = self.comments.count_parents(post_id).await?;
        let parents = self.comments.list_parents(post_id, page).await?;

        let parent_ids: Vec<Uuid> = parents.iter().map(|parent| parent.record.id).collect();
        let replies = self.comments.list_replies(&parent_ids).await?;

        let mut threads: Vec<CommentThread> = parents
            .into_iter()
            .map(|comment| CommentThread {
                comment,
                replies: Vec::new(),
            })
            .collect();
        for reply in replies {
            if let Some(parent_id) = reply.record.parent_id
                && let Some(thread) = threads
                    .iter_mut()
                    .find(|thread| thread.comment.record.id == parent_id)
            {
                thread.replies.push(reply);
            }
        }

        Ok(PageData::new(threads, total, page))
    }

    pub async fn create_comment(
        &self,
        author: &AuthUser,
        post_id: Uuid,
        cmd: CreateCommentCommand,
    ) -> Result<CommentWithAuthor, CommentError> {
        let content = validate::non_empty(&cmd.content, "content")?;

        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        if !post_visible_to(&post, Some(author)) {
            return Err(DomainError::not_found("post").into());
        }

        let parent = match cmd.parent_id {
            Some(parent_id) => {
                let parent = self
                    .comments
                    .find_by_id(parent_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("parent comment"))?;
                if parent.post_id != post_id {
                    return Err(DomainError::validation(
                        "parent comment belongs to a different post",
                    )
                    .into());
                }
                Some(parent)
            }
            None => None,
        };

        let comment = self
            .comments
            .create_comment(CreateCommentParams {
                content,
                author_id: author.id,
                post_id,
                parent_id: cmd.parent_id,
            })
            .await?;

        self.notify(author, &post, parent.as_ref(), &comment.record)
            .await;

        Ok(comment)
    }

    pub async fn update_comment(
        &self,
        viewer: &AuthUser,
        id: Uuid,
        content: &str,
    ) -> Result<CommentRecord, CommentError> {
        let content = validate::non_empty(content, "content")?;
        let existing = self
            .comments
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("comment"))?;
        ensure_can_modify(&existing, viewer)?;

        let record = self.comments.update_content(id, &content).await?;
        Ok(record)
    }

    /// Removes the comment, its direct replies, and the notifications
    /// referencing any of them, all in one transaction.
    pub async fn delete_comment(&self, viewer: &AuthUser, id: Uuid) -> Result<(), CommentError> {
        let existing = self
            .comments
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("comment"))?;
        ensure_can_modify(&existing, viewer)?;

        self.comments.delete_cascade(id).await?;
        Ok(())
    }

    /// The caller's own comments with post titles and reply context.
    pub async fn list_authored(
        &self,
        viewer: &AuthUser,
        query: AuthoredCommentsQuery,
    ) -> Result<PageData<AuthoredComment>, CommentError> {
        let page = PageParams::new(query.page, query.size, DEFAULT_COMMENT_PAGE_SIZE);
        let filter = CommentQueryFilter {
            post_id: query.post_id,
            keyword: validate::optional(query.keyword),
        };

        let total = self.comments.count_by_author(viewer.id, &filter).await?;
        let data = self
            .comments
            .list_by_author(viewer.id, &filter, page)
            .await?;
        Ok(PageData::new(data, total, page))
    }

    /// Best effort: a failed notification never fails the comment.
    async fn notify(
        &self,
        actor: &AuthUser,
        post: &PostRecord,
        parent: Option<&CommentRecord>,
        comment: &CommentRecord,
    ) {
        let (recipient, kind, content) = match parent {
            None => (
                post.author_id,
                NotificationKind::Comment,
                format!(
                    "{} commented on your post \"{}\"",
                    actor.username, post.title
                ),
            ),
            Some(parent) => (
                parent.author_id,
                NotificationKind::Reply,
                format!(
                    "{} replied to your comment on \"{}\"",
                    actor.username, post.title
                ),
            ),
        };
        if recipient == actor.id {
            return;
        }

        let params = CreateNotificationParams {
            kind,
            content,
            recipient_id: recipient,
            actor_id: Some(actor.id),
            post_id: Some(post.id),
            comment_id: Some(comment.id),
            redirect_url: format!("/posts/{}#comment-{}", post.id, comment.id),
        };
        if let Err(err) = self.notifications.create_notification(params).await {
            warn!(recipient = %recipient, error = %err, "failed to create comment notification");
        }
    }
}

fn ensure_can_modify(record: &CommentRecord, viewer: &AuthUser) -> Result<(), CommentError> {
    if record.author_id == viewer.id || viewer.is_admin() {
        Ok(())
    } else {
        Err(CommentError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    use crate::application::repos::{
        PostDetail, PostListScope, PostQueryFilter, PostWithRelations,
    };
    use crate::domain::entities::NotificationRecord;
    use crate::domain::types::{PostStatus, UserRole};

    fn user(name: &str) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            username: name.to_string(),
            role: UserRole::User,
        }
    }

    fn published_post(author_id: Uuid) -> PostRecord {
        PostRecord {
            id: Uuid::new_v4(),
            title: "Cache notes".to_string(),
            content: "Body".to_string(),
            summary: None,
            cover: None,
            status: PostStatus::Published,
            author_id,
            view_count: 0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn comment_row(author_id: Uuid, post_id: Uuid, parent_id: Option<Uuid>) -> CommentRecord {
        CommentRecord {
            id: Uuid::new_v4(),
            content: "Nice one".to_string(),
            author_id,
            post_id,
            parent_id,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    struct StubPostsRepo {
        record: Option<PostRecord>,
    }

    #[async_trait]
    impl PostsRepo for StubPostsRepo {
        async fn list_posts(
            &self,
            _scope: PostListScope,
            _filter: &PostQueryFilter,
            _page: PageParams,
        ) -> Result<Vec<PostWithRelations>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_posts(
            &self,
            _scope: PostListScope,
            _filter: &PostQueryFilter,
        ) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
            Ok(self.record.clone().filter(|record| record.id == id))
        }

        async fn find_with_relations(
            &self,
            _id: Uuid,
        ) -> Result<Option<PostWithRelations>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn find_detail(&self, _id: Uuid) -> Result<Option<PostDetail>, RepoError> {
            unreachable!("not used in these tests")
        }

        async fn count_by_author(&self, _author_id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct FakeCommentsRepo {
        rows: Mutex<Vec<CommentRecord>>,
    }

    impl FakeCommentsRepo {
        fn with_rows(rows: Vec<CommentRecord>) -> Self {
            Self {
                rows: Mutex::new(rows),
            }
        }
    }

    #[async_trait]
    impl CommentsRepo for FakeCommentsRepo {
        async fn list_parents(
            &self,
            post_id: Uuid,
            page: PageParams,
        ) -> Result<Vec<CommentWithAuthor>, RepoError> {
            let rows = self.rows.lock().unwrap();
            let parents: Vec<CommentWithAuthor> = rows
                .iter()
                .filter(|row| row.post_id == post_id && row.parent_id.is_none())
                .skip(page.offset() as usize)
                .take(page.limit() as usize)
                .map(|row| CommentWithAuthor {
                    record: row.clone(),
                    author: None,
                })
                .collect();
            Ok(parents)
        }

        async fn count_parents(&self, post_id: Uuid) -> Result<u64, RepoError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|row| row.post_id == post_id && row.parent_id.is_none())
                .count() as u64)
        }

        async fn list_replies(
            &self,
            parent_ids: &[Uuid],
        ) -> Result<Vec<CommentWithAuthor>, RepoError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows
                .iter()
                .filter(|row| {
                    row.parent_id
                        .is_some_and(|parent| parent_ids.contains(&parent))
                })
                .map(|row| CommentWithAuthor {
                    record: row.clone(),
                    author: None,
                })
                .collect())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().find(|row| row.id == id).cloned())
        }

        async fn create_comment(
            &self,
            params: CreateCommentParams,
        ) -> Result<CommentWithAuthor, RepoError> {
            let record = CommentRecord {
                id: Uuid::new_v4(),
                content: params.content,
                author_id: params.author_id,
                post_id: params.post_id,
                parent_id: params.parent_id,
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            };
            self.rows.lock().unwrap().push(record.clone());
            Ok(CommentWithAuthor {
                record,
                author: None,
            })
        }

        async fn update_content(
            &self,
            id: Uuid,
            content: &str,
        ) -> Result<CommentRecord, RepoError> {
            let mut rows = self.rows.lock().unwrap();
            let row = rows
                .iter_mut()
                .find(|row| row.id == id)
                .ok_or(RepoError::NotFound)?;
            row.content = content.to_string();
            row.updated_at = OffsetDateTime::now_utc();
            Ok(row.clone())
        }

        async fn delete_cascade(&self, id: Uuid) -> Result<(), RepoError> {
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|row| row.id != id && row.parent_id != Some(id));
            Ok(())
        }

        async fn list_by_author(
            &self,
            _author_id: Uuid,
            _filter: &CommentQueryFilter,
            _page: PageParams,
        ) -> Result<Vec<AuthoredComment>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_by_author(
            &self,
            _author_id: Uuid,
            _filter: &CommentQueryFilter,
        ) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    #[derive(Default)]
    struct RecordingNotificationsRepo {
        created: Mutex<Vec<CreateNotificationParams>>,
    }

    #[async_trait]
    impl NotificationsRepo for RecordingNotificationsRepo {
        async fn create_notification(
            &self,
            params: CreateNotificationParams,
        ) -> Result<NotificationRecord, RepoError> {
            let record = NotificationRecord {
                id: Uuid::new_v4(),
                kind: params.kind,
                content: params.content.clone(),
                is_read: false,
                recipient_id: params.recipient_id,
                actor_id: params.actor_id,
                post_id: params.post_id,
                comment_id: params.comment_id,
                redirect_url: Some(params.redirect_url.clone()),
                created_at: OffsetDateTime::now_utc(),
            };
            self.created.lock().unwrap().push(params);
            Ok(record)
        }

        async fn list_for_user(
            &self,
            _user_id: Uuid,
            _filter: &crate::application::repos::NotificationQueryFilter,
            _page: PageParams,
        ) -> Result<Vec<crate::application::repos::NotificationWithActor>, RepoError> {
            Ok(Vec::new())
        }

        async fn count_for_user(
            &self,
            _user_id: Uuid,
            _filter: &crate::application::repos::NotificationQueryFilter,
        ) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn count_unread(&self, _user_id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn mark_read(&self, _id: Uuid, _user_id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn mark_all_read(&self, _user_id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }

        async fn delete_notification(&self, _id: Uuid, _user_id: Uuid) -> Result<u64, RepoError> {
            Ok(0)
        }
    }

    struct Fixture {
        service: CommentService,
        notifications: Arc<RecordingNotificationsRepo>,
    }

    fn fixture(post: Option<PostRecord>, rows: Vec<CommentRecord>) -> Fixture {
        let notifications = Arc::new(RecordingNotificationsRepo::default());
        let service = CommentService::new(
            Arc::new(FakeCommentsRepo::with_rows(rows)),
            Arc::new(StubPostsRepo { record: post }),
            notifications.clone(),
        );
        Fixture {
            service,
            notifications,
        }
    }

    #[tokio::test]
    async fn commenting_on_anothers_post_notifies_the_author() {
        let owner = user("owner");
        let commenter = user("visitor");
        let post = published_post(owner.id);
        let post_id = post.id;
        let fixture = fixture(Some(post), Vec::new());

        let comment = fixture
            .service
            .create_comment(
                &commenter,
                post_id,
                CreateCommentCommand {
                    content: "Great post".to_string(),
                    parent_id: None,
                },
            )
            .await
            .expect("comment created");

        let created = fixture.notifications.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, NotificationKind::Comment);
        assert_eq!(created[0].recipient_id, owner.id);
        assert_eq!(created[0].actor_id, Some(commenter.id));
        assert_eq!(
            created[0].redirect_url,
            format!("/posts/{post_id}#comment-{}", comment.record.id)
        );
        assert!(created[0].content.contains("visitor"));
    }

    #[tokio::test]
    async fn commenting_on_your_own_post_stays_silent() {
        let owner = user("owner");
        let post = published_post(owner.id);
        let post_id = post.id;
        let fixture = fixture(Some(post), Vec::new());

        fixture
            .service
            .create_comment(
                &owner,
                post_id,
                CreateCommentCommand {
                    content: "Note to self".to_string(),
                    parent_id: None,
                },
            )
            .await
            .expect("comment created");

        assert!(fixture.notifications.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn replying_notifies_the_parent_author_not_the_post_owner() {
        let owner = user("owner");
        let parent_author = user("first");
        let replier = user("second");
        let post = published_post(owner.id);
        let post_id = post.id;
        let parent = comment_row(parent_author.id, post_id, None);
        let parent_id = parent.id;
        let fixture = fixture(Some(post), vec![parent]);

        fixture
            .service
            .create_comment(
                &replier,
                post_id,
                CreateCommentCommand {
                    content: "Agreed".to_string(),
                    parent_id: Some(parent_id),
                },
            )
            .await
            .expect("reply created");

        let created = fixture.notifications.created.lock().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].kind, NotificationKind::Reply);
        assert_eq!(created[0].recipient_id, parent_author.id);
    }

    #[tokio::test]
    async fn replying_to_your_own_comment_stays_silent() {
        let owner = user("owner");
        let commenter = user("talker");
        let post = published_post(owner.id);
        let post_id = post.id;
        let parent = comment_row(commenter.id, post_id, None);
        let parent_id = parent.id;
        let fixture = fixture(Some(post), vec![parent]);

        fixture
            .service
            .create_comment(
                &commenter,
                post_id,
                CreateCommentCommand {
                    content: "Following up".to_string(),
                    parent_id: Some(parent_id),
                },
            )
            .await
            .expect("reply created");

        assert!(fixture.notifications.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_parent_from_another_post_is_rejected() {
        let owner = user("owner");
        let commenter = user("visitor");
        let post = published_post(owner.id);
        let post_id = post.id;
        // Parent hangs off a different post entirely.
        let stray_parent = comment_row(owner.id, Uuid::new_v4(), None);
        let stray_id = stray_parent.id;
        let fixture = fixture(Some(post), vec![stray_parent]);

        let result = fixture
            .service
            .create_comment(
                &commenter,
                post_id,
                CreateCommentCommand {
                    content: "Hello".to_string(),
                    parent_id: Some(stray_id),
                },
            )
            .await;

        assert!(matches!(
            result,
            Err(CommentError::Domain(DomainError::Validation { .. }))
        ));
        assert!(fixture.notifications.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn threads_attach_replies_to_their_parents() {
        let owner = user("owner");
        let post = published_post(owner.id);
        let post_id = post.id;

        let first = comment_row(owner.id, post_id, None);
        let second = comment_row(owner.id, post_id, None);
        let reply_to_first = comment_row(owner.id, post_id, Some(first.id));
        let first_id = first.id;
        let reply_id = reply_to_first.id;

        let fixture = fixture(Some(post), vec![first, second, reply_to_first]);
        let page = fixture
            .service
            .list_for_post(None, post_id, None, None)
            .await
            .expect("listing");

        assert_eq!(page.total, 2);
        let thread = page
            .data
            .iter()
            .find(|thread| thread.comment.record.id == first_id)
            .expect("first thread present");
        assert_eq!(thread.replies.len(), 1);
        assert_eq!(thread.replies[0].record.id, reply_id);
    }

    #[tokio::test]
    async fn editing_someone_elses_comment_is_forbidden() {
        let owner = user("owner");
        let outsider = user("outsider");
        let post = published_post(owner.id);
        let row = comment_row(owner.id, post.id, None);
        let row_id = row.id;
        let fixture = fixture(Some(post), vec![row]);

        let result = fixture
            .service
            .update_comment(&outsider, row_id, "rewritten")
            .await;
        assert!(matches!(result, Err(CommentError::Forbidden)));
    }

    #[tokio::test]
    async fn admins_moderate_other_peoples_comments() {
        let owner = user("owner");
        let mut admin = user("root");
        admin.role = UserRole::Admin;
        let post = published_post(owner.id);
        let post_id = post.id;
        let row = comment_row(owner.id, post_id, None);
        let row_id = row.id;
        let fixture = fixture(Some(post), vec![row]);

        let edited = fixture
            .service
            .update_comment(&admin, row_id, "cleaned up")
            .await
            .expect("admin edits the comment");
        assert_eq!(edited.content, "cleaned up");

        fixture
            .service
            .delete_comment(&admin, row_id)
            .await
            .expect("admin removes the comment");
        let page = fixture
            .service
            .list_for_post(None, post_id, None, None)
            .await
            .expect("listing");
        assert_eq!(page.total, 0);
    }
}

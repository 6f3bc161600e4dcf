//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::PageParams;
use crate::domain::entities::{
    CategoryRecord, CommentRecord, FavoriteRecord, NotificationRecord, PostRecord, TagRecord,
    UserRecord,
};
use crate::domain::types::{NotificationKind, PostStatus, UserRole};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn duplicate(constraint: impl Into<String>) -> Self {
        Self::Duplicate {
            constraint: constraint.into(),
        }
    }
}

/// Author fields embedded in list and detail responses. Never carries
/// the password hash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorSummary {
    pub id: Uuid,
    pub username: String,
    pub avatar: Option<String>,
}

impl From<&UserRecord> for AuthorSummary {
    fn from(user: &UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct UpdateProfileParams {
    pub id: Uuid,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub avatar: Option<String>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError>;

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepoError>;

    async fn update_theme(
        &self,
        id: Uuid,
        theme: serde_json::Value,
    ) -> Result<UserRecord, RepoError>;

    async fn count_admins(&self) -> Result<u64, RepoError>;
}

/// Which rows a post listing may see. Resolved by the service from the
/// caller's identity and the requested status filter.
#[derive(Debug, Clone, Copy)]
pub enum PostListScope {
    /// Published posts only.
    Published,
    /// Published posts plus the viewer's own drafts.
    VisibleTo { viewer: Uuid },
    /// Posts authored by the viewer, optionally narrowed by status.
    Authored {
        viewer: Uuid,
        status: Option<PostStatus>,
    },
    /// Everything, optionally narrowed by status. Admin only.
    Admin { status: Option<PostStatus> },
}

#[derive(Debug, Clone, Default)]
pub struct PostQueryFilter {
    pub tag: Option<String>,
    pub tag_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub keyword: Option<String>,
}

/// Post row joined with its author and tags, the shape list responses use.
#[derive(Debug, Clone, PartialEq)]
pub struct PostWithRelations {
    pub record: PostRecord,
    pub author: Option<AuthorSummary>,
    pub tags: Vec<TagRecord>,
}

/// Full single-post read model returned on a cache miss.
#[derive(Debug, Clone, PartialEq)]
pub struct PostDetail {
    pub record: PostRecord,
    pub author: Option<AuthorSummary>,
    pub tags: Vec<TagRecord>,
    pub comments: Vec<CommentWithAuthor>,
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn list_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
        page: PageParams,
    ) -> Result<Vec<PostWithRelations>, RepoError>;

    async fn count_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
    ) -> Result<u64, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;

    /// Loads the post with author and tags, the shape write responses use.
    async fn find_with_relations(&self, id: Uuid) -> Result<Option<PostWithRelations>, RepoError>;

    /// Loads the post with author, tags and the full comment set.
    async fn find_detail(&self, id: Uuid) -> Result<Option<PostDetail>, RepoError>;

    async fn count_by_author(&self, author_id: Uuid) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: PostStatus,
    pub author_id: Uuid,
    pub tag_names: Vec<String>,
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: Option<PostStatus>,
    /// `Some` replaces the full tag set, `None` leaves it untouched.
    pub tag_names: Option<Vec<String>>,
    /// `Some` replaces the full category set, `None` leaves it untouched.
    pub category_ids: Option<Vec<Uuid>>,
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Inserts the post and its tag/category associations in one
    /// transaction. Tags are resolved by name, creating missing ones.
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    /// Applies field updates and association replacements in one
    /// transaction; a failure rolls back every row.
    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError>;

    /// Adds `amount` to the persisted view count. Used by the cache
    /// flush job.
    async fn add_view_count(&self, id: Uuid, amount: i64) -> Result<(), RepoError>;
}

/// Comment row joined with its author summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentWithAuthor {
    pub record: CommentRecord,
    pub author: Option<AuthorSummary>,
}

/// Row shape for the caller's own comment listing.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthoredComment {
    pub record: CommentRecord,
    pub post_title: String,
    pub parent_author: Option<String>,
    pub parent_content: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentQueryFilter {
    pub post_id: Option<Uuid>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateCommentParams {
    pub content: String,
    pub author_id: Uuid,
    pub post_id: Uuid,
    pub parent_id: Option<Uuid>,
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Top-level comments for a post, newest first.
    async fn list_parents(
        &self,
        post_id: Uuid,
        page: PageParams,
    ) -> Result<Vec<CommentWithAuthor>, RepoError>;

    async fn count_parents(&self, post_id: Uuid) -> Result<u64, RepoError>;

    /// Replies to any of the given parents, oldest first.
    async fn list_replies(&self, parent_ids: &[Uuid])
    -> Result<Vec<CommentWithAuthor>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError>;

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentWithAuthor, RepoError>;

    async fn update_content(&self, id: Uuid, content: &str) -> Result<CommentRecord, RepoError>;

    /// Soft-deletes the comment, its direct replies and every
    /// notification referencing any of them, in one transaction.
    async fn delete_cascade(&self, id: Uuid) -> Result<(), RepoError>;

    async fn list_by_author(
        &self,
        author_id: Uuid,
        filter: &CommentQueryFilter,
        page: PageParams,
    ) -> Result<Vec<AuthoredComment>, RepoError>;

    async fn count_by_author(
        &self,
        author_id: Uuid,
        filter: &CommentQueryFilter,
    ) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone, Default)]
pub struct FavoriteQueryFilter {
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub keyword: Option<String>,
}

/// Favorite row joined with the favorited post.
#[derive(Debug, Clone, PartialEq)]
pub struct FavoriteWithPost {
    pub record: FavoriteRecord,
    pub post: PostWithRelations,
}

#[async_trait]
pub trait FavoritesRepo: Send + Sync {
    async fn create_favorite(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<FavoriteRecord, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FavoriteRecord>, RepoError>;

    async fn find_for_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<FavoriteRecord>, RepoError>;

    async fn delete_favorite(&self, id: Uuid) -> Result<(), RepoError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
        page: PageParams,
    ) -> Result<Vec<FavoriteWithPost>, RepoError>;

    async fn count_for_user(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
    ) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct CreateNotificationParams {
    pub kind: NotificationKind,
    pub content: String,
    pub recipient_id: Uuid,
    pub actor_id: Option<Uuid>,
    pub post_id: Option<Uuid>,
    pub comment_id: Option<Uuid>,
    pub redirect_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct NotificationQueryFilter {
    pub is_read: Option<bool>,
    pub kind: Option<NotificationKind>,
}

/// Notification row joined with the acting user, when any.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationWithActor {
    pub record: NotificationRecord,
    pub actor: Option<AuthorSummary>,
}

#[async_trait]
pub trait NotificationsRepo: Send + Sync {
    async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<NotificationRecord, RepoError>;

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationQueryFilter,
        page: PageParams,
    ) -> Result<Vec<NotificationWithActor>, RepoError>;

    async fn count_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationQueryFilter,
    ) -> Result<u64, RepoError>;

    async fn count_unread(&self, user_id: Uuid) -> Result<u64, RepoError>;

    /// Marks the notification read when it belongs to `user_id`.
    /// Returns the number of rows touched.
    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<u64, RepoError>;

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError>;

    /// Deletes the notification when it belongs to `user_id`. Returns
    /// the number of rows touched.
    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagWithCount {
    pub record: TagRecord,
    pub post_count: i64,
}

#[async_trait]
pub trait TagsRepo: Send + Sync {
    async fn list_all(&self) -> Result<Vec<TagRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<TagRecord>, RepoError>;

    /// Tags ordered by published-post count, then name.
    async fn list_popular(&self, limit: u32) -> Result<Vec<TagWithCount>, RepoError>;
}

#[async_trait]
pub trait TagsWriteRepo: Send + Sync {
    async fn create_tag(&self, name: &str) -> Result<TagRecord, RepoError>;

    async fn update_tag(&self, id: Uuid, name: &str) -> Result<TagRecord, RepoError>;

    /// Clears post associations, then soft-deletes the tag, in one
    /// transaction.
    async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryWithCount {
    pub record: CategoryRecord,
    pub post_count: i64,
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRecord>, RepoError>;

    async fn count_posts(&self, id: Uuid) -> Result<u64, RepoError>;
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryParams {
    pub id: Uuid,
    pub name: String,
    pub description: String,
}

#[async_trait]
pub trait CategoriesWriteRepo: Send + Sync {
    async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CategoryRecord, RepoError>;

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError>;
}

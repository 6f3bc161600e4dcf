//! Request and response bodies for the JSON API.
//!
//! The wire format is camelCase with RFC 3339 timestamps; the structs here
//! translate between that and the snake_case domain records. Response types
//! implement `From` for the read models the services return.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::comments::CommentThread;
use crate::application::notifications::NotificationInbox;
use crate::application::pagination::PageData;
use crate::application::repos::{
    AuthorSummary, AuthoredComment, CategoryWithCount, CommentWithAuthor, FavoriteWithPost,
    NotificationWithActor, PostDetail, PostWithRelations, TagWithCount,
};
use crate::application::users::UserProfile;
use crate::domain::entities::{
    CategoryRecord, CommentRecord, FavoriteRecord, PostRecord, TagRecord, UserRecord,
};
use crate::domain::types::{NotificationKind, PostStatus, UserRole};

/// Reply previews in the authored-comments listing stop after this many
/// characters.
const REPLY_PREVIEW_CHARS: usize = 50;

fn default_post_status() -> PostStatus {
    PostStatus::Draft
}

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreateRequest {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub cover: Option<String>,
    #[serde(default = "default_post_status")]
    pub status: PostStatus,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<String>>,
    pub category_ids: Option<Vec<Uuid>>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentCreateRequest {
    pub content: String,
    pub parent_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CommentUpdateRequest {
    pub content: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct TagUpsertRequest {
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CategoryUpsertRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordChangeRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeRequest {
    pub dark_mode: Option<bool>,
    pub theme_color: Option<String>,
    pub font_size: Option<String>,
}

// ---------------------------------------------------------------------------
// Response bodies
// ---------------------------------------------------------------------------

/// Standard list envelope.
#[derive(Debug, Serialize, Deserialize)]
pub struct PageResponse<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
}

impl<T> From<PageData<T>> for PageResponse<T> {
    fn from(page: PageData<T>) -> Self {
        Self {
            data: page.data,
            total: page.total,
            page: page.page,
            size: page.size,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: UserRole,
    pub avatar: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    pub theme_settings: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<UserRecord> for UserResponse {
    fn from(user: UserRecord) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            role: user.role,
            avatar: user.avatar,
            bio: user.bio,
            website: user.website,
            github: user.github,
            twitter: user.twitter,
            theme_settings: user.theme_settings,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthorResponse {
    pub id: Uuid,
    pub username: String,
    pub avatar: Option<String>,
}

impl From<AuthorSummary> for AuthorResponse {
    fn from(author: AuthorSummary) -> Self {
        Self {
            id: author.id,
            username: author.username,
            avatar: author.avatar,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagResponse {
    pub id: Uuid,
    pub name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<TagRecord> for TagResponse {
    fn from(tag: TagRecord) -> Self {
        Self {
            id: tag.id,
            name: tag.name,
            created_at: tag.created_at,
            updated_at: tag.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagWithCountResponse {
    #[serde(flatten)]
    pub tag: TagResponse,
    pub post_count: i64,
}

impl From<TagWithCount> for TagWithCountResponse {
    fn from(tag: TagWithCount) -> Self {
        Self {
            tag: tag.record.into(),
            post_count: tag.post_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<CategoryRecord> for CategoryResponse {
    fn from(category: CategoryRecord) -> Self {
        Self {
            id: category.id,
            name: category.name,
            description: category.description,
            created_at: category.created_at,
            updated_at: category.updated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryWithCountResponse {
    #[serde(flatten)]
    pub category: CategoryResponse,
    pub post_count: i64,
}

impl From<CategoryWithCount> for CategoryWithCountResponse {
    fn from(category: CategoryWithCount) -> Self {
        Self {
            category: category.record.into(),
            post_count: category.post_count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: PostStatus,
    pub author_id: Uuid,
    pub view_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorResponse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<TagResponse>,
}

impl PostResponse {
    /// Build a bare response from a record alone. Cache hits return
    /// this shape, without author or tag relations.
    pub fn from_record(record: PostRecord) -> Self {
        Self {
            id: record.id,
            title: record.title,
            content: record.content,
            summary: record.summary,
            cover: record.cover,
            status: record.status,
            author_id: record.author_id,
            view_count: record.view_count,
            created_at: record.created_at,
            updated_at: record.updated_at,
            author: None,
            tags: Vec::new(),
        }
    }
}

impl From<PostWithRelations> for PostResponse {
    fn from(post: PostWithRelations) -> Self {
        let mut response = Self::from_record(post.record);
        response.author = post.author.map(AuthorResponse::from);
        response.tags = post.tags.into_iter().map(TagResponse::from).collect();
        response
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostDetailResponse {
    #[serde(flatten)]
    pub post: PostResponse,
    pub comments: Vec<CommentResponse>,
}

impl From<PostDetail> for PostDetailResponse {
    fn from(detail: PostDetail) -> Self {
        let mut post = PostResponse::from_record(detail.record);
        post.author = detail.author.map(AuthorResponse::from);
        post.tags = detail.tags.into_iter().map(TagResponse::from).collect();
        Self {
            post,
            comments: detail
                .comments
                .into_iter()
                .map(CommentResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: Uuid,
    pub content: String,
    pub author_id: Uuid,
    pub post_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<AuthorResponse>,
}

impl From<CommentRecord> for CommentResponse {
    fn from(record: CommentRecord) -> Self {
        Self {
            id: record.id,
            content: record.content,
            author_id: record.author_id,
            post_id: record.post_id,
            parent_id: record.parent_id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            author: None,
        }
    }
}

impl From<CommentWithAuthor> for CommentResponse {
    fn from(comment: CommentWithAuthor) -> Self {
        let mut response = Self::from(comment.record);
        response.author = comment.author.map(AuthorResponse::from);
        response
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentThreadResponse {
    #[serde(flatten)]
    pub comment: CommentResponse,
    pub replies: Vec<CommentResponse>,
}

impl From<CommentThread> for CommentThreadResponse {
    fn from(thread: CommentThread) -> Self {
        Self {
            comment: thread.comment.into(),
            replies: thread
                .replies
                .into_iter()
                .map(CommentResponse::from)
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthoredCommentResponse {
    pub id: Uuid,
    pub content: String,
    pub post_id: Uuid,
    pub post_title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// `"author: first 50 chars..."` of the parent comment, when this
    /// comment is a reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<AuthoredComment> for AuthoredCommentResponse {
    fn from(comment: AuthoredComment) -> Self {
        let reply_to = comment.parent_author.as_deref().map(|author| {
            reply_preview(author, comment.parent_content.as_deref().unwrap_or_default())
        });
        Self {
            id: comment.record.id,
            content: comment.record.content,
            post_id: comment.record.post_id,
            post_title: comment.post_title,
            parent_id: comment.record.parent_id,
            reply_to,
            created_at: comment.record.created_at,
            updated_at: comment.record.updated_at,
        }
    }
}

fn reply_preview(author: &str, content: &str) -> String {
    let preview: String = content.chars().take(REPLY_PREVIEW_CHARS).collect();
    if content.chars().count() > REPLY_PREVIEW_CHARS {
        format!("{author}: {preview}...")
    } else {
        format!("{author}: {preview}")
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub post_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<FavoriteRecord> for FavoriteResponse {
    fn from(favorite: FavoriteRecord) -> Self {
        Self {
            id: favorite.id,
            user_id: favorite.user_id,
            post_id: favorite.post_id,
            created_at: favorite.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteWithPostResponse {
    #[serde(flatten)]
    pub favorite: FavoriteResponse,
    pub post: PostResponse,
}

impl From<FavoriteWithPost> for FavoriteWithPostResponse {
    fn from(favorite: FavoriteWithPost) -> Self {
        Self {
            favorite: favorite.record.into(),
            post: favorite.post.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FavoriteStatusResponse {
    pub favorited: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorite: Option<FavoriteResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub content: String,
    pub is_read: bool,
    pub recipient_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<AuthorResponse>,
}

impl From<NotificationWithActor> for NotificationResponse {
    fn from(notification: NotificationWithActor) -> Self {
        let record = notification.record;
        Self {
            id: record.id,
            kind: record.kind,
            content: record.content,
            is_read: record.is_read,
            recipient_id: record.recipient_id,
            actor_id: record.actor_id,
            post_id: record.post_id,
            comment_id: record.comment_id,
            redirect_url: record.redirect_url,
            created_at: record.created_at,
            actor: notification.actor.map(AuthorResponse::from),
        }
    }
}

/// List envelope for notifications; carries the unread badge count
/// alongside the page.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListResponse {
    pub data: Vec<NotificationResponse>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub unread_count: u64,
}

impl From<NotificationInbox> for NotificationListResponse {
    fn from(inbox: NotificationInbox) -> Self {
        Self {
            data: inbox
                .page
                .data
                .into_iter()
                .map(NotificationResponse::from)
                .collect(),
            total: inbox.page.total,
            page: inbox.page.page,
            size: inbox.page.size,
            unread_count: inbox.unread,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    #[serde(flatten)]
    pub user: UserResponse,
    pub post_count: u64,
    pub comment_count: u64,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            user: profile.user.into(),
            post_count: profile.post_count,
            comment_count: profile.comment_count,
        }
    }
}

/// Profile update result. A fresh token is present only when the
/// username changed and the session claims had to be reissued.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileUpdateResponse {
    pub user: UserResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AffectedResponse {
    pub affected: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagDetailResponse {
    pub tag: TagResponse,
    pub posts: PageResponse<PostResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryDetailResponse {
    pub category: CategoryResponse,
    pub posts: PageResponse<PostResponse>,
}

//! Shared fixtures for the integration tests: an in-memory
//! implementation of every repository trait plus a fully wired
//! [`ApiState`] over it.
//!
//! `MemoryRepos` mirrors the observable behavior of the Postgres
//! adapter, including listing order, scope visibility, and the unique
//! constraint names the services match on.

#![allow(dead_code)]

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use http_body_util::BodyExt;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use foglio::application::auth::{AdminSeed, AuthService, LoginCommand, RegisterCommand};
use foglio::application::comments::CommentService;
use foglio::application::favorites::FavoriteService;
use foglio::application::jobs::{CacheWorker, JobQueue};
use foglio::application::notifications::NotificationService;
use foglio::application::pagination::PageParams;
use foglio::application::posts::PostService;
use foglio::application::repos::{
    AuthorSummary, AuthoredComment, CategoriesRepo, CategoriesWriteRepo, CategoryWithCount,
    CommentQueryFilter, CommentWithAuthor, CommentsRepo, CreateCommentParams,
    CreateNotificationParams, CreatePostParams, CreateUserParams, FavoriteQueryFilter,
    FavoriteWithPost, FavoritesRepo, NotificationQueryFilter, NotificationWithActor,
    NotificationsRepo, PostDetail, PostListScope, PostQueryFilter, PostWithRelations, PostsRepo,
    PostsWriteRepo, RepoError, TagWithCount, TagsRepo, TagsWriteRepo, UpdateCategoryParams,
    UpdatePostParams, UpdateProfileParams, UsersRepo,
};
use foglio::application::taxonomy::TaxonomyService;
use foglio::application::tokens::{AuthUser, TokenCodec};
use foglio::application::users::UserService;
use foglio::cache::MemoryCacheStore;
use foglio::config::UploadSettings;
use foglio::domain::entities::{
    CategoryRecord, CommentRecord, FavoriteRecord, NotificationRecord, PostRecord, TagRecord,
    UserRecord,
};
use foglio::domain::types::{PostStatus, UserRole};
use foglio::infra::http::api::state::ApiState;
use foglio::infra::uploads::AvatarStore;

pub const CACHE_TTL_SECS: u64 = 60;
pub const FLUSH_THRESHOLD: i64 = 10;
pub const TEST_PASSWORD: &str = "correct horse";

// ---------------------------------------------------------------------------
// In-memory repositories
// ---------------------------------------------------------------------------

/// All ten repository traits over plain vectors, the way the Postgres
/// adapter implements them all on one type.
#[derive(Default)]
pub struct MemoryRepos {
    clock: AtomicI64,
    users: Mutex<Vec<UserRecord>>,
    posts: Mutex<Vec<PostRecord>>,
    post_tags: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    post_categories: Mutex<HashMap<Uuid, Vec<Uuid>>>,
    tags: Mutex<Vec<TagRecord>>,
    categories: Mutex<Vec<CategoryRecord>>,
    comments: Mutex<Vec<CommentRecord>>,
    favorites: Mutex<Vec<FavoriteRecord>>,
    notifications: Mutex<Vec<NotificationRecord>>,
    /// Every `add_view_count` call, for flush assertions.
    pub flushed_views: Mutex<Vec<(Uuid, i64)>>,
}

impl MemoryRepos {
    /// Strictly increasing timestamps keep ordering assertions
    /// deterministic even for back-to-back inserts.
    fn now(&self) -> OffsetDateTime {
        let tick = self.clock.fetch_add(1, Ordering::SeqCst);
        datetime!(2025-06-01 12:00 UTC) + Duration::microseconds(tick)
    }

    pub fn view_count_of(&self, post_id: Uuid) -> i64 {
        self.posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == post_id)
            .map(|post| post.view_count)
            .unwrap_or_default()
    }

    pub fn notification_count(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }

    fn author_summary(&self, user_id: Uuid) -> Option<AuthorSummary> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.id == user_id)
            .map(AuthorSummary::from)
    }

    fn tags_of(&self, post_id: Uuid) -> Vec<TagRecord> {
        let assoc = self.post_tags.lock().unwrap();
        let tags = self.tags.lock().unwrap();
        let mut out: Vec<TagRecord> = assoc
            .get(&post_id)
            .into_iter()
            .flatten()
            .filter_map(|tag_id| tags.iter().find(|tag| tag.id == *tag_id).cloned())
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn with_relations(&self, record: PostRecord) -> PostWithRelations {
        let author = self.author_summary(record.author_id);
        let tags = self.tags_of(record.id);
        PostWithRelations {
            record,
            author,
            tags,
        }
    }

    fn with_comment_author(&self, record: CommentRecord) -> CommentWithAuthor {
        let author = self.author_summary(record.author_id);
        CommentWithAuthor { record, author }
    }

    fn scope_allows(record: &PostRecord, scope: PostListScope) -> bool {
        match scope {
            PostListScope::Published => record.status == PostStatus::Published,
            PostListScope::VisibleTo { viewer } => {
                record.status == PostStatus::Published || record.author_id == viewer
            }
            PostListScope::Authored { viewer, status } => {
                record.author_id == viewer && status.is_none_or(|status| record.status == status)
            }
            PostListScope::Admin { status } => status.is_none_or(|status| record.status == status),
        }
    }

    fn filter_allows(&self, record: &PostRecord, filter: &PostQueryFilter) -> bool {
        if let Some(tag) = filter.tag.as_ref()
            && !self.tags_of(record.id).iter().any(|t| &t.name == tag)
        {
            return false;
        }
        if let Some(tag_id) = filter.tag_id
            && !self
                .post_tags
                .lock()
                .unwrap()
                .get(&record.id)
                .is_some_and(|ids| ids.contains(&tag_id))
        {
            return false;
        }
        if let Some(category_id) = filter.category_id
            && !self
                .post_categories
                .lock()
                .unwrap()
                .get(&record.id)
                .is_some_and(|ids| ids.contains(&category_id))
        {
            return false;
        }
        if let Some(keyword) = filter.keyword.as_ref() {
            let keyword = keyword.to_lowercase();
            if !record.title.to_lowercase().contains(&keyword)
                && !record.content.to_lowercase().contains(&keyword)
            {
                return false;
            }
        }
        true
    }

    fn matching_posts(&self, scope: PostListScope, filter: &PostQueryFilter) -> Vec<PostRecord> {
        let posts = self.posts.lock().unwrap();
        let mut rows: Vec<PostRecord> = posts
            .iter()
            .filter(|post| Self::scope_allows(post, scope) && self.filter_allows(post, filter))
            .cloned()
            .collect();
        drop(posts);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows
    }

    fn resolve_tag_names(&self, names: &[String]) -> Vec<Uuid> {
        let mut tags = self.tags.lock().unwrap();
        names
            .iter()
            .map(|name| {
                if let Some(existing) = tags.iter().find(|tag| &tag.name == name) {
                    return existing.id;
                }
                let now = self.now();
                let tag = TagRecord {
                    id: Uuid::new_v4(),
                    name: name.clone(),
                    created_at: now,
                    updated_at: now,
                };
                let id = tag.id;
                tags.push(tag);
                id
            })
            .collect()
    }

    fn check_category_ids(&self, ids: &[Uuid]) -> Result<(), RepoError> {
        let categories = self.categories.lock().unwrap();
        for id in ids {
            if !categories.iter().any(|category| category.id == *id) {
                return Err(RepoError::Integrity {
                    message: "post_categories_category_id_fkey".to_string(),
                });
            }
        }
        Ok(())
    }
}

fn page_window<T>(rows: Vec<T>, page: PageParams) -> Vec<T> {
    rows.into_iter()
        .skip(page.offset() as usize)
        .take(page.limit() as usize)
        .collect()
}

#[async_trait]
impl UsersRepo for MemoryRepos {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|user| user.email == params.email) {
            return Err(RepoError::duplicate("users_email_key"));
        }
        if users.iter().any(|user| user.username == params.username) {
            return Err(RepoError::duplicate("users_username_key"));
        }
        let now = self.now();
        let user = UserRecord {
            id: Uuid::new_v4(),
            username: params.username,
            email: params.email,
            password_hash: params.password_hash,
            role: params.role,
            avatar: None,
            bio: None,
            website: None,
            github: None,
            twitter: None,
            theme_settings: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.id == id)
            .cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|user| user.email == email)
            .cloned())
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let now = self.now();
        let mut users = self.users.lock().unwrap();
        if let Some(name) = params.username.as_ref()
            && users
                .iter()
                .any(|user| user.id != params.id && &user.username == name)
        {
            return Err(RepoError::duplicate("users_username_key"));
        }
        let user = users
            .iter_mut()
            .find(|user| user.id == params.id)
            .ok_or(RepoError::NotFound)?;
        if let Some(username) = params.username {
            user.username = username;
        }
        if let Some(bio) = params.bio {
            user.bio = Some(bio);
        }
        if let Some(website) = params.website {
            user.website = Some(website);
        }
        if let Some(github) = params.github {
            user.github = Some(github);
        }
        if let Some(twitter) = params.twitter {
            user.twitter = Some(twitter);
        }
        if let Some(avatar) = params.avatar {
            user.avatar = Some(avatar);
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepoError> {
        let now = self.now();
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.iter_mut().find(|user| user.id == id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = now;
        }
        Ok(())
    }

    async fn update_theme(
        &self,
        id: Uuid,
        theme: serde_json::Value,
    ) -> Result<UserRecord, RepoError> {
        let now = self.now();
        let mut users = self.users.lock().unwrap();
        let user = users
            .iter_mut()
            .find(|user| user.id == id)
            .ok_or(RepoError::NotFound)?;
        user.theme_settings = theme;
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn count_admins(&self) -> Result<u64, RepoError> {
        let count = self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|user| user.role == UserRole::Admin)
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl PostsRepo for MemoryRepos {
    async fn list_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
        page: PageParams,
    ) -> Result<Vec<PostWithRelations>, RepoError> {
        let rows = page_window(self.matching_posts(scope, filter), page);
        Ok(rows
            .into_iter()
            .map(|record| self.with_relations(record))
            .collect())
    }

    async fn count_posts(
        &self,
        scope: PostListScope,
        filter: &PostQueryFilter,
    ) -> Result<u64, RepoError> {
        Ok(self.matching_posts(scope, filter).len() as u64)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        Ok(self
            .posts
            .lock()
            .unwrap()
            .iter()
            .find(|post| post.id == id)
            .cloned())
    }

    async fn find_with_relations(&self, id: Uuid) -> Result<Option<PostWithRelations>, RepoError> {
        Ok(PostsRepo::find_by_id(self, id)
            .await?
            .map(|record| self.with_relations(record)))
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<PostDetail>, RepoError> {
        let Some(relations) = self.find_with_relations(id).await? else {
            return Ok(None);
        };
        let mut rows: Vec<CommentRecord> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.post_id == id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(Some(PostDetail {
            record: relations.record,
            author: relations.author,
            tags: relations.tags,
            comments: rows
                .into_iter()
                .map(|record| self.with_comment_author(record))
                .collect(),
        }))
    }

    async fn count_by_author(&self, author_id: Uuid) -> Result<u64, RepoError> {
        let count = self
            .posts
            .lock()
            .unwrap()
            .iter()
            .filter(|post| post.author_id == author_id)
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepos {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        self.check_category_ids(&params.category_ids)?;
        let tag_ids = self.resolve_tag_names(&params.tag_names);
        let now = self.now();
        let record = PostRecord {
            id: Uuid::new_v4(),
            title: params.title,
            content: params.content,
            summary: params.summary,
            cover: params.cover,
            status: params.status,
            author_id: params.author_id,
            view_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.post_tags.lock().unwrap().insert(record.id, tag_ids);
        self.post_categories
            .lock()
            .unwrap()
            .insert(record.id, params.category_ids);
        self.posts.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        if let Some(ids) = params.category_ids.as_ref() {
            self.check_category_ids(ids)?;
        }
        let tag_ids = params
            .tag_names
            .as_ref()
            .map(|names| self.resolve_tag_names(names));
        let now = self.now();

        let mut posts = self.posts.lock().unwrap();
        let post = posts
            .iter_mut()
            .find(|post| post.id == params.id)
            .ok_or(RepoError::NotFound)?;
        if let Some(title) = params.title {
            post.title = title;
        }
        if let Some(content) = params.content {
            post.content = content;
        }
        if let Some(summary) = params.summary {
            post.summary = Some(summary);
        }
        if let Some(cover) = params.cover {
            post.cover = Some(cover);
        }
        if let Some(status) = params.status {
            post.status = status;
        }
        post.updated_at = now;
        let record = post.clone();
        drop(posts);

        if let Some(tag_ids) = tag_ids {
            self.post_tags.lock().unwrap().insert(params.id, tag_ids);
        }
        if let Some(category_ids) = params.category_ids {
            self.post_categories
                .lock()
                .unwrap()
                .insert(params.id, category_ids);
        }
        Ok(record)
    }

    async fn delete_post(&self, id: Uuid) -> Result<(), RepoError> {
        // Dependent rows stay, as under the soft delete; the listing
        // joins above hide them once the post is gone.
        self.posts.lock().unwrap().retain(|post| post.id != id);
        Ok(())
    }

    async fn add_view_count(&self, id: Uuid, amount: i64) -> Result<(), RepoError> {
        let mut posts = self.posts.lock().unwrap();
        if let Some(post) = posts.iter_mut().find(|post| post.id == id) {
            post.view_count += amount;
            self.flushed_views.lock().unwrap().push((id, amount));
        }
        Ok(())
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepos {
    async fn list_parents(
        &self,
        post_id: Uuid,
        page: PageParams,
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let mut rows: Vec<CommentRecord> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.post_id == post_id && comment.parent_id.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_window(rows, page)
            .into_iter()
            .map(|record| self.with_comment_author(record))
            .collect())
    }

    async fn count_parents(&self, post_id: Uuid) -> Result<u64, RepoError> {
        let count = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| comment.post_id == post_id && comment.parent_id.is_none())
            .count();
        Ok(count as u64)
    }

    async fn list_replies(
        &self,
        parent_ids: &[Uuid],
    ) -> Result<Vec<CommentWithAuthor>, RepoError> {
        let mut rows: Vec<CommentRecord> = self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|comment| {
                comment
                    .parent_id
                    .is_some_and(|parent| parent_ids.contains(&parent))
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rows
            .into_iter()
            .map(|record| self.with_comment_author(record))
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CommentRecord>, RepoError> {
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .find(|comment| comment.id == id)
            .cloned())
    }

    async fn create_comment(
        &self,
        params: CreateCommentParams,
    ) -> Result<CommentWithAuthor, RepoError> {
        let now = self.now();
        let record = CommentRecord {
            id: Uuid::new_v4(),
            content: params.content,
            author_id: params.author_id,
            post_id: params.post_id,
            parent_id: params.parent_id,
            created_at: now,
            updated_at: now,
        };
        self.comments.lock().unwrap().push(record.clone());
        Ok(self.with_comment_author(record))
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<CommentRecord, RepoError> {
        let now = self.now();
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .iter_mut()
            .find(|comment| comment.id == id)
            .ok_or(RepoError::NotFound)?;
        comment.content = content.to_string();
        comment.updated_at = now;
        Ok(comment.clone())
    }

    async fn delete_cascade(&self, id: Uuid) -> Result<(), RepoError> {
        let mut comments = self.comments.lock().unwrap();
        let mut doomed: Vec<Uuid> = comments
            .iter()
            .filter(|comment| comment.parent_id == Some(id))
            .map(|comment| comment.id)
            .collect();
        doomed.push(id);
        self.notifications.lock().unwrap().retain(|notification| {
            !notification
                .comment_id
                .is_some_and(|comment_id| doomed.contains(&comment_id))
        });
        comments.retain(|comment| !doomed.contains(&comment.id));
        Ok(())
    }

    async fn list_by_author(
        &self,
        author_id: Uuid,
        filter: &CommentQueryFilter,
        page: PageParams,
    ) -> Result<Vec<AuthoredComment>, RepoError> {
        let comments = self.comments.lock().unwrap();
        let posts = self.posts.lock().unwrap();
        let users = self.users.lock().unwrap();

        let mut rows: Vec<AuthoredComment> = comments
            .iter()
            .filter(|comment| comment.author_id == author_id)
            .filter(|comment| {
                filter
                    .post_id
                    .is_none_or(|post_id| comment.post_id == post_id)
            })
            .filter(|comment| {
                filter.keyword.as_ref().is_none_or(|keyword| {
                    comment
                        .content
                        .to_lowercase()
                        .contains(&keyword.to_lowercase())
                })
            })
            .filter_map(|comment| {
                // Inner join: comments on a deleted post drop out.
                let post = posts.iter().find(|post| post.id == comment.post_id)?;
                let parent = comment
                    .parent_id
                    .and_then(|parent_id| comments.iter().find(|c| c.id == parent_id));
                let parent_author = parent
                    .and_then(|p| users.iter().find(|user| user.id == p.author_id))
                    .map(|user| user.username.clone());
                Some(AuthoredComment {
                    record: comment.clone(),
                    post_title: post.title.clone(),
                    parent_author,
                    parent_content: parent.map(|p| p.content.clone()),
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.record.id.cmp(&a.record.id))
        });
        Ok(page_window(rows, page))
    }

    async fn count_by_author(
        &self,
        author_id: Uuid,
        filter: &CommentQueryFilter,
    ) -> Result<u64, RepoError> {
        let comments = self.comments.lock().unwrap();
        let posts = self.posts.lock().unwrap();
        let count = comments
            .iter()
            .filter(|comment| comment.author_id == author_id)
            .filter(|comment| {
                filter
                    .post_id
                    .is_none_or(|post_id| comment.post_id == post_id)
            })
            .filter(|comment| {
                filter.keyword.as_ref().is_none_or(|keyword| {
                    comment
                        .content
                        .to_lowercase()
                        .contains(&keyword.to_lowercase())
                })
            })
            .filter(|comment| posts.iter().any(|post| post.id == comment.post_id))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl FavoritesRepo for MemoryRepos {
    async fn create_favorite(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<FavoriteRecord, RepoError> {
        let mut favorites = self.favorites.lock().unwrap();
        if favorites
            .iter()
            .any(|favorite| favorite.user_id == user_id && favorite.post_id == post_id)
        {
            return Err(RepoError::duplicate("favorites_user_id_post_id_key"));
        }
        let record = FavoriteRecord {
            id: Uuid::new_v4(),
            user_id,
            post_id,
            created_at: self.now(),
        };
        favorites.push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<FavoriteRecord>, RepoError> {
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .iter()
            .find(|favorite| favorite.id == id)
            .cloned())
    }

    async fn find_for_post(
        &self,
        user_id: Uuid,
        post_id: Uuid,
    ) -> Result<Option<FavoriteRecord>, RepoError> {
        Ok(self
            .favorites
            .lock()
            .unwrap()
            .iter()
            .find(|favorite| favorite.user_id == user_id && favorite.post_id == post_id)
            .cloned())
    }

    async fn delete_favorite(&self, id: Uuid) -> Result<(), RepoError> {
        self.favorites
            .lock()
            .unwrap()
            .retain(|favorite| favorite.id != id);
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
        page: PageParams,
    ) -> Result<Vec<FavoriteWithPost>, RepoError> {
        let rows = page_window(self.visible_favorites(user_id, filter), page);
        Ok(rows
            .into_iter()
            .map(|(record, post)| FavoriteWithPost {
                record,
                post: self.with_relations(post),
            })
            .collect())
    }

    async fn count_for_user(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
    ) -> Result<u64, RepoError> {
        Ok(self.visible_favorites(user_id, filter).len() as u64)
    }
}

impl MemoryRepos {
    /// Favorites joined with their posts, narrowed to what the user may
    /// see: the post must exist and be published or their own.
    fn visible_favorites(
        &self,
        user_id: Uuid,
        filter: &FavoriteQueryFilter,
    ) -> Vec<(FavoriteRecord, PostRecord)> {
        let post_filter = PostQueryFilter {
            tag: None,
            tag_id: filter.tag_id,
            category_id: filter.category_id,
            keyword: filter.keyword.clone(),
        };
        let favorites = self.favorites.lock().unwrap();
        let posts = self.posts.lock().unwrap();
        let mut rows: Vec<(FavoriteRecord, PostRecord)> = favorites
            .iter()
            .filter(|favorite| favorite.user_id == user_id)
            .filter_map(|favorite| {
                let post = posts.iter().find(|post| post.id == favorite.post_id)?;
                if post.status != PostStatus::Published && post.author_id != user_id {
                    return None;
                }
                if !self.filter_allows(post, &post_filter) {
                    return None;
                }
                Some((favorite.clone(), post.clone()))
            })
            .collect();
        rows.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at).then(b.0.id.cmp(&a.0.id)));
        rows
    }
}

#[async_trait]
impl NotificationsRepo for MemoryRepos {
    async fn create_notification(
        &self,
        params: CreateNotificationParams,
    ) -> Result<NotificationRecord, RepoError> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            kind: params.kind,
            content: params.content,
            is_read: false,
            recipient_id: params.recipient_id,
            actor_id: params.actor_id,
            post_id: params.post_id,
            comment_id: params.comment_id,
            redirect_url: Some(params.redirect_url),
            created_at: self.now(),
        };
        self.notifications.lock().unwrap().push(record.clone());
        Ok(record)
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationQueryFilter,
        page: PageParams,
    ) -> Result<Vec<NotificationWithActor>, RepoError> {
        let mut rows: Vec<NotificationRecord> = self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|notification| notification.recipient_id == user_id)
            .filter(|notification| {
                filter
                    .is_read
                    .is_none_or(|is_read| notification.is_read == is_read)
            })
            .filter(|notification| filter.kind.is_none_or(|kind| notification.kind == kind))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(page_window(rows, page)
            .into_iter()
            .map(|record| {
                let actor = record.actor_id.and_then(|id| self.author_summary(id));
                NotificationWithActor { record, actor }
            })
            .collect())
    }

    async fn count_for_user(
        &self,
        user_id: Uuid,
        filter: &NotificationQueryFilter,
    ) -> Result<u64, RepoError> {
        let count = self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|notification| notification.recipient_id == user_id)
            .filter(|notification| {
                filter
                    .is_read
                    .is_none_or(|is_read| notification.is_read == is_read)
            })
            .filter(|notification| filter.kind.is_none_or(|kind| notification.kind == kind))
            .count();
        Ok(count as u64)
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let count = self
            .notifications
            .lock()
            .unwrap()
            .iter()
            .filter(|notification| notification.recipient_id == user_id && !notification.is_read)
            .count();
        Ok(count as u64)
    }

    async fn mark_read(&self, id: Uuid, user_id: Uuid) -> Result<u64, RepoError> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications
            .iter_mut()
            .find(|notification| notification.id == id && notification.recipient_id == user_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn mark_all_read(&self, user_id: Uuid) -> Result<u64, RepoError> {
        let mut affected = 0;
        for notification in self.notifications.lock().unwrap().iter_mut() {
            if notification.recipient_id == user_id && !notification.is_read {
                notification.is_read = true;
                affected += 1;
            }
        }
        Ok(affected)
    }

    async fn delete_notification(&self, id: Uuid, user_id: Uuid) -> Result<u64, RepoError> {
        let mut notifications = self.notifications.lock().unwrap();
        let before = notifications.len();
        notifications
            .retain(|notification| !(notification.id == id && notification.recipient_id == user_id));
        Ok((before - notifications.len()) as u64)
    }
}

#[async_trait]
impl TagsRepo for MemoryRepos {
    async fn list_all(&self) -> Result<Vec<TagRecord>, RepoError> {
        let mut tags = self.tags.lock().unwrap().clone();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .iter()
            .find(|tag| tag.id == id)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<TagRecord>, RepoError> {
        Ok(self
            .tags
            .lock()
            .unwrap()
            .iter()
            .find(|tag| tag.name == name)
            .cloned())
    }

    async fn list_popular(&self, limit: u32) -> Result<Vec<TagWithCount>, RepoError> {
        let tags = self.tags.lock().unwrap().clone();
        let assoc = self.post_tags.lock().unwrap();
        let posts = self.posts.lock().unwrap();
        let mut rows: Vec<TagWithCount> = tags
            .into_iter()
            .map(|record| {
                // Popularity counts published posts only; a tag with
                // none still shows up with a zero.
                let post_count = posts
                    .iter()
                    .filter(|post| post.status == PostStatus::Published)
                    .filter(|post| {
                        assoc
                            .get(&post.id)
                            .is_some_and(|ids| ids.contains(&record.id))
                    })
                    .count() as i64;
                TagWithCount { record, post_count }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.post_count
                .cmp(&a.post_count)
                .then(a.record.name.cmp(&b.record.name))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }
}

#[async_trait]
impl TagsWriteRepo for MemoryRepos {
    async fn create_tag(&self, name: &str) -> Result<TagRecord, RepoError> {
        let mut tags = self.tags.lock().unwrap();
        if tags.iter().any(|tag| tag.name == name) {
            return Err(RepoError::duplicate("tags_name_key"));
        }
        let now = self.now();
        let record = TagRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: now,
            updated_at: now,
        };
        tags.push(record.clone());
        Ok(record)
    }

    async fn update_tag(&self, id: Uuid, name: &str) -> Result<TagRecord, RepoError> {
        let now = self.now();
        let mut tags = self.tags.lock().unwrap();
        if tags.iter().any(|tag| tag.id != id && tag.name == name) {
            return Err(RepoError::duplicate("tags_name_key"));
        }
        let tag = tags
            .iter_mut()
            .find(|tag| tag.id == id)
            .ok_or(RepoError::NotFound)?;
        tag.name = name.to_string();
        tag.updated_at = now;
        Ok(tag.clone())
    }

    async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError> {
        self.tags.lock().unwrap().retain(|tag| tag.id != id);
        for ids in self.post_tags.lock().unwrap().values_mut() {
            ids.retain(|tag_id| *tag_id != id);
        }
        Ok(())
    }
}

#[async_trait]
impl CategoriesRepo for MemoryRepos {
    async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError> {
        let categories = self.categories.lock().unwrap().clone();
        let mut rows: Vec<CategoryWithCount> = Vec::with_capacity(categories.len());
        for record in categories {
            let post_count = self.live_post_count(record.id) as i64;
            rows.push(CategoryWithCount { record, post_count });
        }
        rows.sort_by(|a, b| a.record.name.cmp(&b.record.name));
        Ok(rows)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|category| category.id == id)
            .cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRecord>, RepoError> {
        Ok(self
            .categories
            .lock()
            .unwrap()
            .iter()
            .find(|category| category.name == name)
            .cloned())
    }

    async fn count_posts(&self, id: Uuid) -> Result<u64, RepoError> {
        Ok(self.live_post_count(id))
    }
}

impl MemoryRepos {
    /// Category usage counts every live post regardless of status, the
    /// same window the delete gate checks.
    fn live_post_count(&self, category_id: Uuid) -> u64 {
        let assoc = self.post_categories.lock().unwrap();
        let posts = self.posts.lock().unwrap();
        posts
            .iter()
            .filter(|post| {
                assoc
                    .get(&post.id)
                    .is_some_and(|ids| ids.contains(&category_id))
            })
            .count() as u64
    }
}

#[async_trait]
impl CategoriesWriteRepo for MemoryRepos {
    async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CategoryRecord, RepoError> {
        let mut categories = self.categories.lock().unwrap();
        if categories.iter().any(|category| category.name == name) {
            return Err(RepoError::duplicate("categories_name_key"));
        }
        let now = self.now();
        let record = CategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            created_at: now,
            updated_at: now,
        };
        categories.push(record.clone());
        Ok(record)
    }

    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let now = self.now();
        let mut categories = self.categories.lock().unwrap();
        if categories
            .iter()
            .any(|category| category.id != params.id && category.name == params.name)
        {
            return Err(RepoError::duplicate("categories_name_key"));
        }
        let category = categories
            .iter_mut()
            .find(|category| category.id == params.id)
            .ok_or(RepoError::NotFound)?;
        category.name = params.name;
        category.description = (!params.description.is_empty()).then_some(params.description);
        category.updated_at = now;
        Ok(category.clone())
    }

    async fn delete_category(&self, id: Uuid) -> Result<(), RepoError> {
        self.categories
            .lock()
            .unwrap()
            .retain(|category| category.id != id);
        for ids in self.post_categories.lock().unwrap().values_mut() {
            ids.retain(|category_id| *category_id != id);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

/// Everything a test needs: the API state over in-memory repositories,
/// direct handles on those repositories and the cache store, and the
/// cache worker to drain between steps.
pub struct TestBackend {
    pub state: ApiState,
    pub repos: Arc<MemoryRepos>,
    pub store: Arc<MemoryCacheStore>,
    pub worker: CacheWorker,
    _avatar_dir: tempfile::TempDir,
}

pub fn build_backend() -> TestBackend {
    let repos = Arc::new(MemoryRepos::default());
    let store = Arc::new(MemoryCacheStore::new());
    let (queue, rx) = JobQueue::new();

    let users_repo: Arc<dyn UsersRepo> = repos.clone();
    let posts_repo: Arc<dyn PostsRepo> = repos.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repos.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repos.clone();
    let favorites_repo: Arc<dyn FavoritesRepo> = repos.clone();
    let notifications_repo: Arc<dyn NotificationsRepo> = repos.clone();
    let tags_repo: Arc<dyn TagsRepo> = repos.clone();
    let tags_write_repo: Arc<dyn TagsWriteRepo> = repos.clone();
    let categories_repo: Arc<dyn CategoriesRepo> = repos.clone();
    let categories_write_repo: Arc<dyn CategoriesWriteRepo> = repos.clone();

    let tokens = TokenCodec::new("test-secret", Duration::hours(1));
    let worker = CacheWorker::new(
        rx,
        store.clone(),
        posts_write_repo.clone(),
        CACHE_TTL_SECS,
        FLUSH_THRESHOLD,
    );

    let avatar_dir = tempfile::tempdir().expect("avatar dir");
    let uploads = UploadSettings {
        directory: avatar_dir.path().to_path_buf(),
        public_base: "/uploads".to_string(),
        max_request_bytes: NonZeroU64::new(2 * 1024 * 1024).expect("nonzero"),
    };
    let avatars = Arc::new(AvatarStore::new(&uploads).expect("avatar store"));

    let state = ApiState {
        auth: Arc::new(AuthService::new(users_repo.clone(), tokens.clone())),
        posts: Arc::new(PostService::new(
            posts_repo.clone(),
            posts_write_repo,
            store.clone(),
            queue,
        )),
        comments: Arc::new(CommentService::new(
            comments_repo.clone(),
            posts_repo.clone(),
            notifications_repo.clone(),
        )),
        favorites: Arc::new(FavoriteService::new(favorites_repo, posts_repo.clone())),
        notifications: Arc::new(NotificationService::new(notifications_repo)),
        taxonomy: Arc::new(TaxonomyService::new(
            tags_repo,
            tags_write_repo,
            categories_repo,
            categories_write_repo,
            posts_repo.clone(),
        )),
        users: Arc::new(UserService::new(
            users_repo,
            posts_repo,
            comments_repo,
            tokens.clone(),
        )),
        tokens,
        avatars,
        upload_limit: 2 * 1024 * 1024,
    };

    TestBackend {
        state,
        repos,
        store,
        worker,
        _avatar_dir: avatar_dir,
    }
}

// ---------------------------------------------------------------------------
// Account helpers
// ---------------------------------------------------------------------------

pub fn auth_user_of(user: &UserRecord) -> AuthUser {
    AuthUser {
        id: user.id,
        username: user.username.clone(),
        role: user.role,
    }
}

/// Registers a fresh account through the real service and returns its
/// identity plus session token.
pub async fn register(state: &ApiState, username: &str) -> (AuthUser, String) {
    let session = state
        .auth
        .register(RegisterCommand {
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password: TEST_PASSWORD.to_string(),
        })
        .await
        .expect("register");
    (auth_user_of(&session.user), session.token)
}

/// Seeds the bootstrap admin and signs it in.
pub async fn seed_admin(state: &ApiState) -> (AuthUser, String) {
    let seed = AdminSeed::default();
    state
        .auth
        .ensure_default_admin(&seed)
        .await
        .expect("seed admin");
    let session = state
        .auth
        .login(LoginCommand {
            email: seed.email,
            password: seed.password,
        })
        .await
        .expect("admin login");
    (auth_user_of(&session.user), session.token)
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

/// Collects a response body and decodes it as JSON.
pub async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> (StatusCode, T) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|err| panic!("decode {status} body: {err}"));
    (status, value)
}

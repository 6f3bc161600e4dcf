//! Post CRUD and the cache-aside single-post read.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::application::jobs::{CacheJob, JobQueue};
use crate::application::pagination::{DEFAULT_POST_PAGE_SIZE, PageData, PageParams};
use crate::application::repos::{
    CreatePostParams, PostDetail, PostListScope, PostQueryFilter, PostWithRelations, PostsRepo,
    PostsWriteRepo, RepoError, UpdatePostParams,
};
use crate::application::tokens::AuthUser;
use crate::cache::{CacheStore, PostSnapshot, post_key};
use crate::domain::entities::PostRecord;
use crate::domain::error::DomainError;
use crate::domain::types::PostStatus;
use crate::domain::validate;

const METRIC_CACHE_HIT: &str = "foglio_post_cache_hit_total";
const METRIC_CACHE_MISS: &str = "foglio_post_cache_miss_total";

#[derive(Debug, Error)]
pub enum PostError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("only the author or an admin may modify this post")]
    Forbidden,
}

/// The `status` list parameter as the caller sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Draft,
    Published,
    All,
}

impl TryFrom<&str> for StatusFilter {
    type Error = DomainError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "draft" => Ok(Self::Draft),
            "published" => Ok(Self::Published),
            "all" => Ok(Self::All),
            other => Err(DomainError::validation(format!(
                "unknown status filter `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListPostsQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub status: Option<StatusFilter>,
    pub tag: Option<String>,
    pub category_id: Option<Uuid>,
    pub keyword: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreatePostCommand {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: PostStatus,
    pub tags: Vec<String>,
    pub category_ids: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct UpdatePostCommand {
    pub id: Uuid,
    pub title: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub cover: Option<String>,
    pub status: Option<PostStatus>,
    pub tags: Option<Vec<String>>,
    pub category_ids: Option<Vec<Uuid>>,
}

/// What a single-post read produced. A cache hit serves the bare row;
/// a miss serves the full detail loaded from the database.
#[derive(Debug, Clone)]
pub enum PostRead {
    Cached(PostRecord),
    Full(PostDetail),
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    writes: Arc<dyn PostsWriteRepo>,
    store: Arc<dyn CacheStore>,
    jobs: JobQueue,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        writes: Arc<dyn PostsWriteRepo>,
        store: Arc<dyn CacheStore>,
        jobs: JobQueue,
    ) -> Self {
        Self {
            posts,
            writes,
            store,
            jobs,
        }
    }

    pub async fn list_posts(
        &self,
        viewer: Option<&AuthUser>,
        query: ListPostsQuery,
    ) -> Result<PageData<PostWithRelations>, PostError> {
        let page = PageParams::new(query.page, query.size, DEFAULT_POST_PAGE_SIZE);
        let Some(scope) = resolve_scope(viewer, query.status) else {
            return Ok(PageData::new(Vec::new(), 0, page));
        };
        let filter = PostQueryFilter {
            tag: validate::optional(query.tag),
            tag_id: None,
            category_id: query.category_id,
            keyword: validate::optional(query.keyword),
        };

        let total = self.posts.count_posts(scope, &filter).await?;
        let data = self.posts.list_posts(scope, &filter, page).await?;
        Ok(PageData::new(data, total, page))
    }

    /// The caller's own posts, drafts included.
    pub async fn list_authored(
        &self,
        viewer: &AuthUser,
        status: Option<StatusFilter>,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<PageData<PostWithRelations>, PostError> {
        let page = PageParams::new(page, size, DEFAULT_POST_PAGE_SIZE);
        let status = match status {
            Some(StatusFilter::Draft) => Some(PostStatus::Draft),
            Some(StatusFilter::Published) => Some(PostStatus::Published),
            Some(StatusFilter::All) | None => None,
        };
        let scope = PostListScope::Authored {
            viewer: viewer.id,
            status,
        };
        let filter = PostQueryFilter::default();

        let total = self.posts.count_posts(scope, &filter).await?;
        let data = self.posts.list_posts(scope, &filter, page).await?;
        Ok(PageData::new(data, total, page))
    }

    /// Cache-aside single-post read. Cache trouble of any kind degrades
    /// to a database read; maintenance happens in background jobs.
    pub async fn get_post(
        &self,
        viewer: Option<&AuthUser>,
        id: Uuid,
    ) -> Result<PostRead, PostError> {
        match self.store.hash_get_all(&post_key(id)).await {
            Ok(fields) if !fields.is_empty() => match PostSnapshot::parse(&fields) {
                Ok(snapshot) => {
                    let record = snapshot.into_record();
                    ensure_visible(&record, viewer)?;
                    counter!(METRIC_CACHE_HIT).increment(1);
                    self.jobs.submit(CacheJob::RecordView { post_id: id });
                    return Ok(PostRead::Cached(record));
                }
                Err(err) => {
                    warn!(post_id = %id, error = %err, "cached post is unreadable, reloading");
                }
            },
            Ok(_) => {}
            Err(err) => {
                warn!(post_id = %id, error = %err, "cache read failed, falling back to the database");
            }
        }

        counter!(METRIC_CACHE_MISS).increment(1);
        let detail = self
            .posts
            .find_detail(id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        ensure_visible(&detail.record, viewer)?;
        self.jobs.submit(CacheJob::PopulatePost {
            snapshot: PostSnapshot::from_record(&detail.record),
        });
        Ok(PostRead::Full(detail))
    }

    pub async fn create_post(
        &self,
        author: &AuthUser,
        cmd: CreatePostCommand,
    ) -> Result<PostWithRelations, PostError> {
        let title = validate::post_title(&cmd.title)?;
        let content = validate::non_empty(&cmd.content, "content")?;
        let summary = validate::optional(cmd.summary);
        if let Some(summary) = &summary {
            validate::post_summary(summary)?;
        }
        let tag_names = normalize_tags(cmd.tags)?;

        let record = self
            .writes
            .create_post(CreatePostParams {
                title,
                content,
                summary,
                cover: validate::optional(cmd.cover),
                status: cmd.status,
                author_id: author.id,
                tag_names,
                category_ids: dedupe_ids(cmd.category_ids),
            })
            .await?;

        self.load_with_relations(record.id).await
    }

    pub async fn update_post(
        &self,
        viewer: &AuthUser,
        cmd: UpdatePostCommand,
    ) -> Result<PostWithRelations, PostError> {
        let existing = self
            .posts
            .find_by_id(cmd.id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        ensure_can_modify(&existing, viewer)?;

        let title = cmd
            .title
            .map(|title| validate::post_title(&title))
            .transpose()?;
        let content = cmd
            .content
            .map(|content| validate::non_empty(&content, "content"))
            .transpose()?;
        let summary = validate::optional(cmd.summary);
        if let Some(summary) = &summary {
            validate::post_summary(summary)?;
        }
        let tag_names = cmd.tags.map(normalize_tags).transpose()?;

        self.writes
            .update_post(UpdatePostParams {
                id: cmd.id,
                title,
                content,
                summary,
                cover: validate::optional(cmd.cover),
                status: cmd.status,
                tag_names,
                category_ids: cmd.category_ids.map(dedupe_ids),
            })
            .await?;

        self.jobs.submit(CacheJob::InvalidatePost { post_id: cmd.id });
        self.load_with_relations(cmd.id).await
    }

    pub async fn delete_post(&self, viewer: &AuthUser, id: Uuid) -> Result<(), PostError> {
        let existing = self
            .posts
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        ensure_can_modify(&existing, viewer)?;

        self.writes.delete_post(id).await?;
        self.jobs.submit(CacheJob::PurgePost { post_id: id });
        Ok(())
    }

    async fn load_with_relations(&self, id: Uuid) -> Result<PostWithRelations, PostError> {
        let post = self
            .posts
            .find_with_relations(id)
            .await?
            .ok_or_else(|| DomainError::invariant("post missing after write"))?;
        Ok(post)
    }
}

/// Maps the caller and the requested status window onto a repo scope.
/// `None` means the combination can never match a visible row.
fn resolve_scope(viewer: Option<&AuthUser>, status: Option<StatusFilter>) -> Option<PostListScope> {
    match (viewer, status) {
        (Some(user), Some(StatusFilter::All)) if user.is_admin() => {
            Some(PostListScope::Admin { status: None })
        }
        (Some(user), Some(StatusFilter::Draft)) if user.is_admin() => Some(PostListScope::Admin {
            status: Some(PostStatus::Draft),
        }),
        (Some(user), Some(StatusFilter::Draft)) => Some(PostListScope::Authored {
            viewer: user.id,
            status: Some(PostStatus::Draft),
        }),
        (Some(user), Some(StatusFilter::All)) => Some(PostListScope::VisibleTo { viewer: user.id }),
        (None, Some(StatusFilter::Draft)) => None,
        _ => Some(PostListScope::Published),
    }
}

/// A draft is visible only to its author or an admin.
pub(crate) fn post_visible_to(record: &PostRecord, viewer: Option<&AuthUser>) -> bool {
    record.status == PostStatus::Published
        || viewer.is_some_and(|user| user.id == record.author_id || user.is_admin())
}

/// A hidden draft reads as absent, never as forbidden.
fn ensure_visible(record: &PostRecord, viewer: Option<&AuthUser>) -> Result<(), PostError> {
    if post_visible_to(record, viewer) {
        Ok(())
    } else {
        Err(DomainError::not_found("post").into())
    }
}

fn ensure_can_modify(record: &PostRecord, viewer: &AuthUser) -> Result<(), PostError> {
    if record.author_id == viewer.id || viewer.is_admin() {
        Ok(())
    } else {
        Err(PostError::Forbidden)
    }
}

fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, DomainError> {
    let mut names: Vec<String> = Vec::new();
    for tag in tags {
        let name = validate::taxonomy_name(&tag, "tag")?;
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}

fn dedupe_ids(ids: Vec<Uuid>) -> Vec<Uuid> {
    let mut seen: Vec<Uuid> = Vec::new();
    for id in ids {
        if !seen.contains(&id) {
            seen.push(id);
        }
    }
    seen
}

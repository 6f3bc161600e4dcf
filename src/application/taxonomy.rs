//! Tags and categories, including the admin-only write paths. Admin
//! gating itself lives in the HTTP middleware.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{DEFAULT_POST_PAGE_SIZE, PageData, PageParams};
use crate::application::repos::{
    CategoriesRepo, CategoriesWriteRepo, CategoryWithCount, PostListScope, PostQueryFilter,
    PostWithRelations, PostsRepo, RepoError, TagWithCount, TagsRepo, TagsWriteRepo,
    UpdateCategoryParams,
};
use crate::domain::entities::{CategoryRecord, TagRecord};
use crate::domain::error::DomainError;
use crate::domain::validate;

pub const DEFAULT_POPULAR_TAG_LIMIT: u32 = 10;
pub const MAX_POPULAR_TAG_LIMIT: u32 = 50;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("{entity} name already in use")]
    NameTaken { entity: &'static str },
    #[error("category still has posts")]
    CategoryInUse,
}

/// Detail response: the tag plus a page of its published posts.
#[derive(Debug, Clone)]
pub struct TagDetail {
    pub tag: TagRecord,
    pub posts: PageData<PostWithRelations>,
}

#[derive(Debug, Clone)]
pub struct CategoryDetail {
    pub category: CategoryRecord,
    pub posts: PageData<PostWithRelations>,
}

#[derive(Debug, Clone)]
pub struct CategoryCommand {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Clone)]
pub struct TaxonomyService {
    tags: Arc<dyn TagsRepo>,
    tag_writes: Arc<dyn TagsWriteRepo>,
    categories: Arc<dyn CategoriesRepo>,
    category_writes: Arc<dyn CategoriesWriteRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl TaxonomyService {
    pub fn new(
        tags: Arc<dyn TagsRepo>,
        tag_writes: Arc<dyn TagsWriteRepo>,
        categories: Arc<dyn CategoriesRepo>,
        category_writes: Arc<dyn CategoriesWriteRepo>,
        posts: Arc<dyn PostsRepo>,
    ) -> Self {
        Self {
            tags,
            tag_writes,
            categories,
            category_writes,
            posts,
        }
    }

    pub async fn list_tags(&self) -> Result<Vec<TagRecord>, TaxonomyError> {
        Ok(self.tags.list_all().await?)
    }

    /// Tags ordered by published-post count, then name. An out-of-range
    /// limit falls back to the default rather than erroring.
    pub async fn popular_tags(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<TagWithCount>, TaxonomyError> {
        let limit = match limit {
            Some(value) if (1..=MAX_POPULAR_TAG_LIMIT).contains(&value) => value,
            _ => DEFAULT_POPULAR_TAG_LIMIT,
        };
        Ok(self.tags.list_popular(limit).await?)
    }

    pub async fn tag_detail(
        &self,
        id: Uuid,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<TagDetail, TaxonomyError> {
        let tag = self
            .tags
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("tag"))?;

        let filter = PostQueryFilter {
            tag_id: Some(id),
            ..Default::default()
        };
        let posts = self.published_page(&filter, page, size).await?;
        Ok(TagDetail { tag, posts })
    }

    pub async fn create_tag(&self, name: &str) -> Result<TagRecord, TaxonomyError> {
        let name = validate::taxonomy_name(name, "tag name")?;
        if self.tags.find_by_name(&name).await?.is_some() {
            return Err(TaxonomyError::NameTaken { entity: "tag" });
        }

        match self.tag_writes.create_tag(&name).await {
            Ok(record) => Ok(record),
            Err(RepoError::Duplicate { .. }) => Err(TaxonomyError::NameTaken { entity: "tag" }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn update_tag(&self, id: Uuid, name: &str) -> Result<TagRecord, TaxonomyError> {
        let name = validate::taxonomy_name(name, "tag name")?;
        if self.tags.find_by_id(id).await?.is_none() {
            return Err(DomainError::not_found("tag").into());
        }
        if let Some(existing) = self.tags.find_by_name(&name).await?
            && existing.id != id
        {
            return Err(TaxonomyError::NameTaken { entity: "tag" });
        }

        Ok(self.tag_writes.update_tag(id, &name).await?)
    }

    pub async fn delete_tag(&self, id: Uuid) -> Result<(), TaxonomyError> {
        if self.tags.find_by_id(id).await?.is_none() {
            return Err(DomainError::not_found("tag").into());
        }
        self.tag_writes.delete_tag(id).await?;
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<Vec<CategoryWithCount>, TaxonomyError> {
        Ok(self.categories.list_with_counts().await?)
    }

    pub async fn category_detail(
        &self,
        id: Uuid,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<CategoryDetail, TaxonomyError> {
        let category = self
            .categories
            .find_by_id(id)
            .await?
            .ok_or_else(|| DomainError::not_found("category"))?;

        let filter = PostQueryFilter {
            category_id: Some(id),
            ..Default::default()
        };
        let posts = self.published_page(&filter, page, size).await?;
        Ok(CategoryDetail { category, posts })
    }

    pub async fn create_category(
        &self,
        cmd: CategoryCommand,
    ) -> Result<CategoryRecord, TaxonomyError> {
        let (name, description) = validate_category(&cmd)?;
        if self.categories.find_by_name(&name).await?.is_some() {
            return Err(TaxonomyError::NameTaken { entity: "category" });
        }

        match self
            .category_writes
            .create_category(&name, &description)
            .await
        {
            Ok(record) => Ok(record),
            Err(RepoError::Duplicate { .. }) => {
                Err(TaxonomyError::NameTaken { entity: "category" })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn update_category(
        &self,
        id: Uuid,
        cmd: CategoryCommand,
    ) -> Result<CategoryRecord, TaxonomyError> {
        let (name, description) = validate_category(&cmd)?;
        if self.categories.find_by_id(id).await?.is_none() {
            return Err(DomainError::not_found("category").into());
        }
        if let Some(existing) = self.categories.find_by_name(&name).await?
            && existing.id != id
        {
            return Err(TaxonomyError::NameTaken { entity: "category" });
        }

        Ok(self
            .category_writes
            .update_category(UpdateCategoryParams {
                id,
                name,
                description,
            })
            .await?)
    }

    /// A category with posts still attached refuses to go.
    pub async fn delete_category(&self, id: Uuid) -> Result<(), TaxonomyError> {
        if self.categories.find_by_id(id).await?.is_none() {
            return Err(DomainError::not_found("category").into());
        }
        if self.categories.count_posts(id).await? > 0 {
            return Err(TaxonomyError::CategoryInUse);
        }
        self.category_writes.delete_category(id).await?;
        Ok(())
    }

    async fn published_page(
        &self,
        filter: &PostQueryFilter,
        page: Option<u32>,
        size: Option<u32>,
    ) -> Result<PageData<PostWithRelations>, TaxonomyError> {
        let page = PageParams::new(page, size, DEFAULT_POST_PAGE_SIZE);
        let total = self
            .posts
            .count_posts(PostListScope::Published, filter)
            .await?;
        let data = self
            .posts
            .list_posts(PostListScope::Published, filter, page)
            .await?;
        Ok(PageData::new(data, total, page))
    }
}

fn validate_category(cmd: &CategoryCommand) -> Result<(String, String), TaxonomyError> {
    let name = validate::taxonomy_name(&cmd.name, "category name")?;
    let description = match &cmd.description {
        Some(value) => {
            let trimmed = value.trim();
            validate::at_most(trimmed, validate::DESCRIPTION_MAX, "description")?;
            trimmed.to_string()
        }
        None => String::new(),
    };
    Ok((name, description))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use time::OffsetDateTime;

    use crate::application::repos::PostDetail;
    use crate::domain::entities::PostRecord;
    use crate::domain::types::PostStatus;

    fn tag(name: &str) -> TagRecord {
        TagRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn category(name: &str) -> CategoryRecord {
        CategoryRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    fn published_row(tag: &TagRecord) -> PostWithRelations {
        PostWithRelations {
            record: PostRecord {
                id: Uuid::new_v4(),
                title: "Tagged".to_string(),
                content: "Body".to_string(),
                summary: None,
                cover: None,
                status: PostStatus::Published,
                author_id: Uuid::new_v4(),
                view_count: 0,
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            },
            author: None,
            tags: vec![tag.clone()],
        }
    }

    struct StubTagsRepo {
        rows: Vec<TagRecord>,
        popular: Vec<TagWithCount>,
    }

    #[async_trait]
    impl TagsRepo for StubTagsRepo {
        async fn list_all(&self) -> Result<Vec<TagRecord>, RepoError> {
            Ok(self.rows.clone())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<TagRecord>, RepoError> {
            Ok(self.rows.iter().find(|row| row.id == id).cloned())
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<TagRecord>, RepoError> {
            Ok(self.rows.iter().find(|row| row.name == name).cloned())
        }

        async fn list_popular(&self, limit: u32) -> Result<Vec<TagWithCount>, RepoError> {
            Ok(self.popular.iter().take(limit as usize).cloned().collect())
        }
    }

    #[derive(Default)]
    struct RecordingTagsWriter {
        created: Mutex<Vec<String>>,
        deleted: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl TagsWriteRepo for RecordingTagsWriter {
        async fn create_tag(&self, name: &str) -> Result<TagRecord, RepoError> {
            self.created.lock().unwrap().push(name.to_string());
            Ok(tag(name))
        }

        async fn update_tag(&self, id: Uuid, name: &str) -> Result<TagRecord, RepoError> {
            Ok(TagRecord {
                id,
                name: name.to_string(),
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            })
        }

        async fn delete_tag(&self, id: Uuid) -> Result<(), RepoError> {
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }
    }

    struct StubCategoriesRepo {
        rows: Vec<CategoryRecord>,
        posts_attached: u64,
    }

    #[async_trait]
    impl CategoriesRepo for StubCategoriesRepo {
        async fn list_with_counts(&self) -> Result<Vec<CategoryWithCount>, RepoError> {
            Ok(self
                .rows
                .iter()
                .map(|row| CategoryWithCount {
                    record: row.clone(),
                    post_count: self.posts_attached as i64,
                })
                .collect())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<CategoryRecord>, RepoError> {
            Ok(self.rows.iter().find(|row| row.id == id).cloned())
        }

        async fn find_by_name(&self, name: &str) -> Result<Option<CategoryRecord>, RepoError> {
            Ok(self.rows.iter().find(|row| row.name == name).cloned())
        }

        async fn count_posts(&self, _id: Uuid) -> Result<u64, RepoError> {
            Ok(self.posts_attached)
        }
    }

    #[derive(Default)]
    struct RecordingCategoriesWriter {
        deleted: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl CategoriesWriteRepo for RecordingCategoriesWriter {
        async fn create_category(
            &self,
            name: &str,
            description: &str,
        ) -> Result<CategoryRecord, RepoError> {
            Ok(CategoryRecord {
                id: Uuid::new_v4(),
                name: name.to_string(),
                description: (!description.is_empty()).then(|| description.to_string()),
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            })
        }

        async fn update_category(
            &self,
            params: UpdateCategoryParams,
        ) -> Result<CategoryRecord, RepoError> {
            Ok(CategoryRecord {
                id: params.id,
                name: params.name,
                description: (!params.description.is_empty()).then_some(params.description),
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            })
        }

        async fn delete_category(&self, id: Uuid) -> Result<(), RepoError> {
            self.deleted.lock().unwrap().push(id);
            Ok(())
        }
    }

    struct StubPostsRepo {
        rows: Vec<PostWithRelations>,
    }

    #[async_trait]
    impl PostsRepo for StubPostsRepo {
        async fn list_posts(
            &self,
            scope: PostListScope,
            filter: &PostQueryFilter,
            _page: PageParams,
        ) -> Result<Vec<PostWithRelations>, RepoError> {
            assert!(matches!(scope, PostListScope::Published));
            Ok(self
                .rows
                .iter()
                .filter(|row| {
                    filter
                        .tag_id
                        .is_none_or(|id| row.tags.iter().any(|tag| tag.id == id))
                })
                .cloned()
                .collect())
        }

        async fn count_posts(
            &self,
            _scope: PostListScope,
            filter: &PostQueryFilter,
        ) -> Result<u64, RepoError> {
            Ok(self
                .rows
                .iter()
                .filter(|row| {
                    filter
                        .tag_id
                        .is_none_or(|id| row.tags.iter().any(|tag| tag.id == id))
                })
                .count() as u64)
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<PostRecord>, RepoError> {
            unreachable!("not used in these tests")
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

    struct Fixture {
        service: TaxonomyService,
        tag_writes: Arc<RecordingTagsWriter>,
        category_writes: Arc<RecordingCategoriesWriter>,
    }

    fn fixture(
        tags: Vec<TagRecord>,
        categories: Vec<CategoryRecord>,
        posts_attached: u64,
        posts: Vec<PostWithRelations>,
    ) -> Fixture {
        let tag_writes = Arc::new(RecordingTagsWriter::default());
        let category_writes = Arc::new(RecordingCategoriesWriter::default());
        let service = TaxonomyService::new(
            Arc::new(StubTagsRepo {
                rows: tags,
                popular: Vec::new(),
            }),
            tag_writes.clone(),
            Arc::new(StubCategoriesRepo {
                rows: categories,
                posts_attached,
            }),
            category_writes.clone(),
            Arc::new(StubPostsRepo { rows: posts }),
        );
        Fixture {
            service,
            tag_writes,
            category_writes,
        }
    }

    #[tokio::test]
    async fn popular_limit_falls_back_when_out_of_range() {
        let popular: Vec<TagWithCount> = (0..20)
            .map(|n| TagWithCount {
                record: tag(&format!("tag-{n}")),
                post_count: 20 - n,
            })
            .collect();
        let service = TaxonomyService::new(
            Arc::new(StubTagsRepo {
                rows: Vec::new(),
                popular,
            }),
            Arc::new(RecordingTagsWriter::default()),
            Arc::new(StubCategoriesRepo {
                rows: Vec::new(),
                posts_attached: 0,
            }),
            Arc::new(RecordingCategoriesWriter::default()),
            Arc::new(StubPostsRepo { rows: Vec::new() }),
        );

        assert_eq!(service.popular_tags(None).await.expect("default").len(), 10);
        assert_eq!(
            service.popular_tags(Some(0)).await.expect("zero").len(),
            10
        );
        assert_eq!(
            service.popular_tags(Some(51)).await.expect("over").len(),
            10
        );
        assert_eq!(
            service.popular_tags(Some(15)).await.expect("in range").len(),
            15
        );
    }

    #[tokio::test]
    async fn tag_detail_embeds_its_published_posts() {
        let rust = tag("rust");
        let other = tag("go");
        let rust_id = rust.id;
        let rows = vec![published_row(&rust), published_row(&other)];
        let fixture = fixture(vec![rust, other], Vec::new(), 0, rows);

        let detail = fixture
            .service
            .tag_detail(rust_id, None, None)
            .await
            .expect("detail");
        assert_eq!(detail.tag.id, rust_id);
        assert_eq!(detail.posts.total, 1);
        assert_eq!(detail.posts.data.len(), 1);
    }

    #[tokio::test]
    async fn creating_a_duplicate_tag_name_is_rejected() {
        let fixture = fixture(vec![tag("rust")], Vec::new(), 0, Vec::new());

        let result = fixture.service.create_tag("rust").await;
        assert!(matches!(
            result,
            Err(TaxonomyError::NameTaken { entity: "tag" })
        ));
        assert!(fixture.tag_writes.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn renaming_a_tag_over_another_is_rejected() {
        let rust = tag("rust");
        let go = tag("go");
        let rust_id = rust.id;
        let fixture = fixture(vec![rust, go], Vec::new(), 0, Vec::new());

        let clash = fixture.service.update_tag(rust_id, "go").await;
        assert!(matches!(clash, Err(TaxonomyError::NameTaken { .. })));

        // Keeping its own name is fine.
        let kept = fixture.service.update_tag(rust_id, "rust").await;
        assert!(kept.is_ok());
    }

    #[tokio::test]
    async fn deleting_a_missing_tag_is_not_found() {
        let fixture = fixture(Vec::new(), Vec::new(), 0, Vec::new());

        let result = fixture.service.delete_tag(Uuid::new_v4()).await;
        assert!(matches!(
            result,
            Err(TaxonomyError::Domain(DomainError::NotFound { .. }))
        ));
        assert!(fixture.tag_writes.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn a_category_with_posts_refuses_deletion() {
        let row = category("engineering");
        let id = row.id;
        let fixture = fixture(Vec::new(), vec![row], 3, Vec::new());

        let result = fixture.service.delete_category(id).await;
        assert!(matches!(result, Err(TaxonomyError::CategoryInUse)));
        assert!(fixture.category_writes.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn an_empty_category_deletes_cleanly() {
        let row = category("scratch");
        let id = row.id;
        let fixture = fixture(Vec::new(), vec![row], 0, Vec::new());

        fixture.service.delete_category(id).await.expect("deleted");
        assert_eq!(*fixture.category_writes.deleted.lock().unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn category_descriptions_are_trimmed_and_bounded() {
        let fixture = fixture(Vec::new(), Vec::new(), 0, Vec::new());

        let record = fixture
            .service
            .create_category(CategoryCommand {
                name: "notes".to_string(),
                description: Some("  day to day  ".to_string()),
            })
            .await
            .expect("created");
        assert_eq!(record.description.as_deref(), Some("day to day"));

        let overlong = fixture
            .service
            .create_category(CategoryCommand {
                name: "big".to_string(),
                description: Some("x".repeat(201)),
            })
            .await;
        assert!(matches!(
            overlong,
            Err(TaxonomyError::Domain(DomainError::Validation { .. }))
        ));
    }
}

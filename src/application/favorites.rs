//! Post favorites: add, check, remove, and the caller's own list.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::pagination::{DEFAULT_FAVORITE_PAGE_SIZE, PageData, PageParams};
use crate::application::posts::post_visible_to;
use crate::application::repos::{
    FavoriteQueryFilter, FavoriteWithPost, FavoritesRepo, PostsRepo, RepoError,
};
use crate::application::tokens::AuthUser;
use crate::domain::entities::FavoriteRecord;
use crate::domain::error::DomainError;
use crate::domain::validate;

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("post already favorited")]
    AlreadyFavorited,
}

#[derive(Debug, Clone, Default)]
pub struct FavoritesQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub keyword: Option<String>,
}

#[derive(Clone)]
pub struct FavoriteService {
    favorites: Arc<dyn FavoritesRepo>,
    posts: Arc<dyn PostsRepo>,
}

impl FavoriteService {
    pub fn new(favorites: Arc<dyn FavoritesRepo>, posts: Arc<dyn PostsRepo>) -> Self {
        Self { favorites, posts }
    }

    pub async fn favorite_post(
        &self,
        user: &AuthUser,
        post_id: Uuid,
    ) -> Result<FavoriteRecord, FavoriteError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or_else(|| DomainError::not_found("post"))?;
        if !post_visible_to(&post, Some(user)) {
            return Err(DomainError::not_found("post").into());
        }

        if self
            .favorites
            .find_for_post(user.id, post_id)
            .await?
            .is_some()
        {
            return Err(FavoriteError::AlreadyFavorited);
        }

        match self.favorites.create_favorite(user.id, post_id).await {
            Ok(record) => Ok(record),
            // Lost a race with a concurrent favorite of the same post.
            Err(RepoError::Duplicate { .. }) => Err(FavoriteError::AlreadyFavorited),
            Err(err) => Err(err.into()),
        }
    }

    /// The caller's favorite of the post, when one exists. Querying a
    /// post that does not exist simply reads as not favorited.
    pub async fn check(
        &self,
        user: &AuthUser,
        post_id: Uuid,
    ) -> Result<Option<FavoriteRecord>, FavoriteError> {
        Ok(self.favorites.find_for_post(user.id, post_id).await?)
    }

    /// Removes the caller's favorite. Someone else's favorite reads as
    /// absent, never as forbidden.
    pub async fn remove(&self, user: &AuthUser, favorite_id: Uuid) -> Result<(), FavoriteError> {
        let favorite = self
            .favorites
            .find_by_id(favorite_id)
            .await?
            .filter(|favorite| favorite.user_id == user.id)
            .ok_or_else(|| DomainError::not_found("favorite"))?;

        self.favorites.delete_favorite(favorite.id).await?;
        Ok(())
    }

    pub async fn list(
        &self,
        user: &AuthUser,
        query: FavoritesQuery,
    ) -> Result<PageData<FavoriteWithPost>, FavoriteError> {
        let page = PageParams::new(query.page, query.size, DEFAULT_FAVORITE_PAGE_SIZE);
        let filter = FavoriteQueryFilter {
            category_id: query.category_id,
            tag_id: query.tag_id,
            keyword: validate::optional(query.keyword),
        };

        let total = self.favorites.count_for_user(user.id, &filter).await?;
        let data = self.favorites.list_for_user(user.id, &filter, page).await?;
        Ok(PageData::new(data, total, page))
    }
}

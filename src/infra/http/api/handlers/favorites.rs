//! Favorites: marking, checking, removing, and the caller's listing.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::favorites::FavoritesQuery;
use crate::application::tokens::AuthUser;

use super::{FavoriteListQuery, favorite_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{
    FavoriteResponse, FavoriteStatusResponse, FavoriteWithPostResponse, PageResponse,
};
use crate::infra::http::api::state::ApiState;

pub async fn favorite_post(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let favorite = state
        .favorites
        .favorite_post(&user, post_id)
        .await
        .map_err(favorite_to_api)?;

    Ok((StatusCode::CREATED, Json(FavoriteResponse::from(favorite))))
}

pub async fn check_favorite(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let favorite = state
        .favorites
        .check(&user, post_id)
        .await
        .map_err(favorite_to_api)?;

    Ok(Json(FavoriteStatusResponse {
        favorited: favorite.is_some(),
        favorite: favorite.map(FavoriteResponse::from),
    }))
}

pub async fn remove_favorite(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .favorites
        .remove(&user, id)
        .await
        .map_err(favorite_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_favorites(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<FavoriteListQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let page = state
        .favorites
        .list(
            &user,
            FavoritesQuery {
                page: query.page,
                size: query.page_size,
                category_id: query.category_id,
                tag_id: query.tag_id,
                keyword: query.keyword,
            },
        )
        .await
        .map_err(favorite_to_api)?;

    Ok(Json(PageResponse::from(
        page.map(FavoriteWithPostResponse::from),
    )))
}

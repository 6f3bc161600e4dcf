//! Tags and categories: public reads plus the admin-only writes.
//!
//! The admin gate sits in the router middleware, so the write handlers
//! here carry no identity parameter.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::taxonomy::CategoryCommand;

use super::{PageQuery, PopularTagsQuery, taxonomy_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{
    CategoryDetailResponse, CategoryResponse, CategoryUpsertRequest, CategoryWithCountResponse,
    PageResponse, PostResponse, TagDetailResponse, TagResponse, TagUpsertRequest,
    TagWithCountResponse,
};
use crate::infra::http::api::state::ApiState;

pub async fn list_tags(State(state): State<ApiState>) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let tags = state.taxonomy.list_tags().await.map_err(taxonomy_to_api)?;
    Ok(Json(
        tags.into_iter().map(TagResponse::from).collect::<Vec<_>>(),
    ))
}

pub async fn popular_tags(
    State(state): State<ApiState>,
    Query(query): Query<PopularTagsQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let tags = state
        .taxonomy
        .popular_tags(query.limit)
        .await
        .map_err(taxonomy_to_api)?;

    Ok(Json(
        tags.into_iter()
            .map(TagWithCountResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Tag detail embedding a page of its published posts.
pub async fn get_tag(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let detail = state
        .taxonomy
        .tag_detail(id, query.page, query.page_size)
        .await
        .map_err(taxonomy_to_api)?;

    Ok(Json(TagDetailResponse {
        tag: detail.tag.into(),
        posts: PageResponse::from(detail.posts.map(PostResponse::from)),
    }))
}

pub async fn create_tag(
    State(state): State<ApiState>,
    Json(payload): Json<TagUpsertRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let tag = state
        .taxonomy
        .create_tag(&payload.name)
        .await
        .map_err(taxonomy_to_api)?;

    Ok((StatusCode::CREATED, Json(TagResponse::from(tag))))
}

pub async fn update_tag(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TagUpsertRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let tag = state
        .taxonomy
        .update_tag(id, &payload.name)
        .await
        .map_err(taxonomy_to_api)?;

    Ok(Json(TagResponse::from(tag)))
}

pub async fn delete_tag(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .taxonomy
        .delete_tag(id)
        .await
        .map_err(taxonomy_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_categories(
    State(state): State<ApiState>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let categories = state
        .taxonomy
        .list_categories()
        .await
        .map_err(taxonomy_to_api)?;

    Ok(Json(
        categories
            .into_iter()
            .map(CategoryWithCountResponse::from)
            .collect::<Vec<_>>(),
    ))
}

/// Category detail embedding a page of its published posts.
pub async fn get_category(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let detail = state
        .taxonomy
        .category_detail(id, query.page, query.page_size)
        .await
        .map_err(taxonomy_to_api)?;

    Ok(Json(CategoryDetailResponse {
        category: detail.category.into(),
        posts: PageResponse::from(detail.posts.map(PostResponse::from)),
    }))
}

pub async fn create_category(
    State(state): State<ApiState>,
    Json(payload): Json<CategoryUpsertRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let category = state
        .taxonomy
        .create_category(CategoryCommand {
            name: payload.name,
            description: payload.description,
        })
        .await
        .map_err(taxonomy_to_api)?;

    Ok((StatusCode::CREATED, Json(CategoryResponse::from(category))))
}

pub async fn update_category(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CategoryUpsertRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let category = state
        .taxonomy
        .update_category(
            id,
            CategoryCommand {
                name: payload.name,
                description: payload.description,
            },
        )
        .await
        .map_err(taxonomy_to_api)?;

    Ok(Json(CategoryResponse::from(category)))
}

/// Refused while the category still has posts attached.
pub async fn delete_category(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .taxonomy
        .delete_category(id)
        .await
        .map_err(taxonomy_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

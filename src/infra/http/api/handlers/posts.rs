//! Post listings, the cache-aware single-post read, and post CRUD.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::application::posts::{
    CreatePostCommand, ListPostsQuery, PostRead, UpdatePostCommand,
};
use crate::application::tokens::AuthUser;

use super::{OwnPostsQuery, PostListQuery, parse_status, post_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{
    PageResponse, PostCreateRequest, PostDetailResponse, PostResponse, PostUpdateRequest,
};
use crate::infra::http::api::state::ApiState;

pub async fn list_posts(
    State(state): State<ApiState>,
    viewer: Option<Extension<AuthUser>>,
    Query(query): Query<PostListQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let status = parse_status(query.status)?;
    let viewer = viewer.map(|Extension(user)| user);

    let page = state
        .posts
        .list_posts(
            viewer.as_ref(),
            ListPostsQuery {
                page: query.page,
                size: query.page_size,
                status,
                tag: query.tag,
                category_id: query.category_id,
                keyword: query.keyword,
            },
        )
        .await
        .map_err(post_to_api)?;

    Ok(Json(PageResponse::from(page.map(PostResponse::from))))
}

/// Single-post read. A cache hit answers with the bare record shape;
/// a miss falls through to the database and includes relations.
pub async fn get_post(
    State(state): State<ApiState>,
    viewer: Option<Extension<AuthUser>>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let viewer = viewer.map(|Extension(user)| user);

    let read = state
        .posts
        .get_post(viewer.as_ref(), id)
        .await
        .map_err(post_to_api)?;

    let response = match read {
        PostRead::Cached(record) => Json(PostResponse::from_record(record)).into_response(),
        PostRead::Full(detail) => Json(PostDetailResponse::from(detail)).into_response(),
    };
    Ok(response)
}

pub async fn create_post(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<PostCreateRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let post = state
        .posts
        .create_post(
            &user,
            CreatePostCommand {
                title: payload.title,
                content: payload.content,
                summary: payload.summary,
                cover: payload.cover,
                status: payload.status,
                tags: payload.tags,
                category_ids: payload.category_ids,
            },
        )
        .await
        .map_err(post_to_api)?;

    Ok((StatusCode::CREATED, Json(PostResponse::from(post))))
}

pub async fn update_post(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PostUpdateRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let post = state
        .posts
        .update_post(
            &user,
            UpdatePostCommand {
                id,
                title: payload.title,
                content: payload.content,
                summary: payload.summary,
                cover: payload.cover,
                status: payload.status,
                tags: payload.tags,
                category_ids: payload.category_ids,
            },
        )
        .await
        .map_err(post_to_api)?;

    Ok(Json(PostResponse::from(post)))
}

pub async fn delete_post(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .posts
        .delete_post(&user, id)
        .await
        .map_err(post_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

/// The caller's own posts, drafts included.
pub async fn list_own_posts(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<OwnPostsQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let status = parse_status(query.status)?;

    let page = state
        .posts
        .list_authored(&user, status, query.page, query.page_size)
        .await
        .map_err(post_to_api)?;

    Ok(Json(PageResponse::from(page.map(PostResponse::from))))
}

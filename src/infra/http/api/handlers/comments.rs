//! Comment threads under posts and the caller's own comment history.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::comments::{AuthoredCommentsQuery, CreateCommentCommand};
use crate::application::tokens::AuthUser;

use super::{OwnCommentsQuery, PageQuery, comment_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{
    AuthoredCommentResponse, CommentCreateRequest, CommentResponse, CommentThreadResponse,
    CommentUpdateRequest, PageResponse,
};
use crate::infra::http::api::state::ApiState;

/// Top-level comments for a post, each with its flattened replies.
pub async fn list_comments(
    State(state): State<ApiState>,
    viewer: Option<Extension<AuthUser>>,
    Path(post_id): Path<Uuid>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let viewer = viewer.map(|Extension(user)| user);

    let page = state
        .comments
        .list_for_post(viewer.as_ref(), post_id, query.page, query.page_size)
        .await
        .map_err(comment_to_api)?;

    Ok(Json(PageResponse::from(
        page.map(CommentThreadResponse::from),
    )))
}

pub async fn create_comment(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(post_id): Path<Uuid>,
    Json(payload): Json<CommentCreateRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let comment = state
        .comments
        .create_comment(
            &user,
            post_id,
            CreateCommentCommand {
                content: payload.content,
                parent_id: payload.parent_id,
            },
        )
        .await
        .map_err(comment_to_api)?;

    Ok((StatusCode::CREATED, Json(CommentResponse::from(comment))))
}

pub async fn update_comment(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CommentUpdateRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let comment = state
        .comments
        .update_comment(&user, id, &payload.content)
        .await
        .map_err(comment_to_api)?;

    Ok(Json(CommentResponse::from(comment)))
}

pub async fn delete_comment(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .comments
        .delete_comment(&user, id)
        .await
        .map_err(comment_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

/// The caller's own comments with the post title and, for replies, a
/// preview of the parent.
pub async fn list_own_comments(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<OwnCommentsQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let page = state
        .comments
        .list_authored(
            &user,
            AuthoredCommentsQuery {
                page: query.page,
                size: query.page_size,
                post_id: query.post_id,
                keyword: query.keyword,
            },
        )
        .await
        .map_err(comment_to_api)?;

    Ok(Json(PageResponse::from(
        page.map(AuthoredCommentResponse::from),
    )))
}

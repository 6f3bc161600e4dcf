//! The caller's notification inbox.

use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use uuid::Uuid;

use crate::application::notifications::NotificationsQuery;
use crate::application::tokens::AuthUser;

use super::{NotificationListQuery, notification_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{AffectedResponse, NotificationListResponse};
use crate::infra::http::api::state::ApiState;

pub async fn list_notifications(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<NotificationListQuery>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let inbox = state
        .notifications
        .list(
            &user,
            NotificationsQuery {
                page: query.page,
                size: query.page_size,
                is_read: query.is_read,
                kind: query.kind,
            },
        )
        .await
        .map_err(notification_to_api)?;

    Ok(Json(NotificationListResponse::from(inbox)))
}

pub async fn read_notification(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .notifications
        .mark_read(&user, id)
        .await
        .map_err(notification_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn read_all_notifications(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let affected = state
        .notifications
        .mark_all_read(&user)
        .await
        .map_err(notification_to_api)?;

    Ok(Json(AffectedResponse { affected }))
}

pub async fn delete_notification(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    state
        .notifications
        .delete(&user, id)
        .await
        .map_err(notification_to_api)?;

    Ok(StatusCode::NO_CONTENT)
}

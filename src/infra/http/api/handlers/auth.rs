//! Registration and login.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::auth::{LoginCommand, RegisterCommand};

use super::auth_to_api;
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{AuthResponse, LoginRequest, RegisterRequest};
use crate::infra::http::api::state::ApiState;

pub async fn register(
    State(state): State<ApiState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let session = state
        .auth
        .register(RegisterCommand {
            username: payload.username,
            email: payload.email,
            password: payload.password,
        })
        .await
        .map_err(auth_to_api)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token: session.token,
            user: session.user.into(),
        }),
    ))
}

pub async fn login(
    State(state): State<ApiState>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let session = state
        .auth
        .login(LoginCommand {
            email: payload.email,
            password: payload.password,
        })
        .await
        .map_err(auth_to_api)?;

    Ok(Json(AuthResponse {
        token: session.token,
        user: session.user.into(),
    }))
}

//! The caller's own account: profile, avatar upload, password, theme.

use axum::Json;
use axum::extract::multipart::Field;
use axum::extract::{Extension, Multipart, State};
use axum::response::IntoResponse;

use crate::application::tokens::AuthUser;
use crate::application::users::{ChangePasswordCommand, ThemeCommand, UpdateProfileCommand};

use super::{avatar_to_api, user_to_api};
use crate::infra::http::api::error::ApiError;
use crate::infra::http::api::models::{
    PasswordChangeRequest, ProfileResponse, ProfileUpdateResponse, ThemeRequest, TokenResponse,
};
use crate::infra::http::api::state::ApiState;

pub async fn get_profile(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let profile = state.users.profile(&user).await.map_err(user_to_api)?;
    Ok(Json(ProfileResponse::from(profile)))
}

/// Multipart profile update: text fields plus an optional `avatar` file.
/// The avatar is stored before the profile row is touched, so a rejected
/// image never leaves a half-applied update.
pub async fn update_profile(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let mut cmd = UpdateProfileCommand::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "avatar" => {
                let filename = field.file_name().unwrap_or("avatar").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                // A file input left blank still submits a zero-length part.
                if data.is_empty() {
                    continue;
                }
                let stored = state
                    .avatars
                    .store(&filename, &data)
                    .map_err(avatar_to_api)?;
                cmd.avatar_url = Some(stored);
            }
            "username" => cmd.username = Some(text_field(field).await?),
            "bio" => cmd.bio = Some(text_field(field).await?),
            "website" => cmd.website = Some(text_field(field).await?),
            "github" => cmd.github = Some(text_field(field).await?),
            "twitter" => cmd.twitter = Some(text_field(field).await?),
            _ => {}
        }
    }

    let update = state
        .users
        .update_profile(&user, cmd)
        .await
        .map_err(user_to_api)?;

    Ok(Json(ProfileUpdateResponse {
        user: update.user.into(),
        token: update.token,
    }))
}

pub async fn change_password(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<PasswordChangeRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let token = state
        .users
        .change_password(
            &user,
            ChangePasswordCommand {
                current_password: payload.current_password,
                new_password: payload.new_password,
                confirm_password: payload.confirm_password,
            },
        )
        .await
        .map_err(user_to_api)?;

    Ok(Json(TokenResponse { token }))
}

/// Partial theme update; returns the merged settings blob.
pub async fn update_theme(
    State(state): State<ApiState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ThemeRequest>,
) -> Result<impl IntoResponse + std::fmt::Debug, ApiError> {
    let theme = state
        .users
        .update_theme(
            &user,
            ThemeCommand {
                dark_mode: payload.dark_mode,
                theme_color: payload.theme_color,
                font_size: payload.font_size,
            },
        )
        .await
        .map_err(user_to_api)?;

    Ok(Json(theme))
}

async fn text_field(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::bad_request("Malformed multipart body", Some(err.to_string()))
}

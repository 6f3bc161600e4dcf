//! API handlers organized by resource.
//!
//! Query-string structs shared by several routes and the mappings from
//! service errors onto [`ApiError`] live here; the submodules hold the
//! route functions themselves.

mod auth;
mod comments;
mod favorites;
mod notifications;
mod posts;
mod taxonomy;
mod users;

pub use auth::*;
pub use comments::*;
pub use favorites::*;
pub use notifications::*;
pub use posts::*;
pub use taxonomy::*;
pub use users::*;

use axum::http::StatusCode;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::auth::AuthError;
use crate::application::comments::CommentError;
use crate::application::favorites::FavoriteError;
use crate::application::notifications::NotificationError;
use crate::application::posts::{PostError, StatusFilter};
use crate::application::repos::RepoError;
use crate::application::taxonomy::TaxonomyError;
use crate::application::users::UserError;
use crate::domain::error::DomainError;
use crate::domain::types::NotificationKind;
use crate::infra::uploads::AvatarError;

use super::error::{ApiError, codes};

// ---------------------------------------------------------------------------
// Shared query parameters
// ---------------------------------------------------------------------------

/// Bare `page` / `pageSize` pair used by several listings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
    pub tag: Option<String>,
    pub category_id: Option<Uuid>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnPostsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnCommentsQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub post_id: Option<Uuid>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category_id: Option<Uuid>,
    pub tag_id: Option<Uuid>,
    pub keyword: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationListQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub is_read: Option<bool>,
    pub kind: Option<NotificationKind>,
}

#[derive(Debug, Deserialize)]
pub struct PopularTagsQuery {
    pub limit: Option<u32>,
}

/// Parses the optional `status` list parameter, rejecting unknown
/// values with a 400 instead of silently widening the listing.
pub(crate) fn parse_status(status: Option<String>) -> Result<Option<StatusFilter>, ApiError> {
    status
        .as_deref()
        .map(StatusFilter::try_from)
        .transpose()
        .map_err(domain_to_api)
}

// ---------------------------------------------------------------------------
// Service error -> ApiError
// ---------------------------------------------------------------------------

pub(crate) fn repo_to_api(err: RepoError) -> ApiError {
    match err {
        RepoError::Duplicate { constraint } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Duplicate record",
            Some(constraint),
        ),
        RepoError::NotFound => ApiError::not_found("Resource not found"),
        RepoError::Integrity { message } => ApiError::new(
            StatusCode::CONFLICT,
            codes::INTEGRITY,
            "Integrity constraint violated",
            Some(message),
        ),
        RepoError::Timeout => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timed out",
            None,
        ),
        RepoError::Persistence(message) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            Some(message),
        ),
    }
}

pub(crate) fn domain_to_api(err: DomainError) -> ApiError {
    match err {
        DomainError::NotFound { entity } => ApiError::new(
            StatusCode::NOT_FOUND,
            codes::NOT_FOUND,
            "Resource not found",
            Some(format!("{entity} not found")),
        ),
        DomainError::Validation { message } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(message),
        ),
        DomainError::Invariant { message } => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Internal error",
            Some(message),
        ),
    }
}

pub(crate) fn auth_to_api(err: AuthError) -> ApiError {
    match err {
        AuthError::Domain(domain) => domain_to_api(domain),
        AuthError::Repo(repo) => repo_to_api(repo),
        AuthError::InvalidCredentials => ApiError::unauthorized("Invalid email or password"),
        AuthError::EmailTaken => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Email already registered",
            None,
        ),
        AuthError::UsernameTaken => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Username already taken",
            None,
        ),
        AuthError::Token(source) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::TOKEN,
            "Failed to issue session token",
            Some(source.to_string()),
        ),
    }
}

pub(crate) fn post_to_api(err: PostError) -> ApiError {
    match err {
        PostError::Domain(domain) => domain_to_api(domain),
        PostError::Repo(repo) => repo_to_api(repo),
        PostError::Forbidden => {
            ApiError::forbidden("Only the author or an admin may modify this post")
        }
    }
}

pub(crate) fn comment_to_api(err: CommentError) -> ApiError {
    match err {
        CommentError::Domain(domain) => domain_to_api(domain),
        CommentError::Repo(repo) => repo_to_api(repo),
        CommentError::Forbidden => {
            ApiError::forbidden("Only the author or an admin may modify this comment")
        }
    }
}

pub(crate) fn favorite_to_api(err: FavoriteError) -> ApiError {
    match err {
        FavoriteError::Domain(domain) => domain_to_api(domain),
        FavoriteError::Repo(repo) => repo_to_api(repo),
        FavoriteError::AlreadyFavorited => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Post already favorited",
            None,
        ),
    }
}

pub(crate) fn notification_to_api(err: NotificationError) -> ApiError {
    match err {
        NotificationError::Domain(domain) => domain_to_api(domain),
        NotificationError::Repo(repo) => repo_to_api(repo),
    }
}

pub(crate) fn taxonomy_to_api(err: TaxonomyError) -> ApiError {
    match err {
        TaxonomyError::Domain(domain) => domain_to_api(domain),
        TaxonomyError::Repo(repo) => repo_to_api(repo),
        TaxonomyError::NameTaken { entity } => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Name already in use",
            Some(format!("{entity} name already in use")),
        ),
        TaxonomyError::CategoryInUse => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::CATEGORY_IN_USE,
            "Category still has posts",
            None,
        ),
    }
}

pub(crate) fn user_to_api(err: UserError) -> ApiError {
    match err {
        UserError::Domain(domain) => domain_to_api(domain),
        UserError::Repo(repo) => repo_to_api(repo),
        UserError::UsernameTaken => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::DUPLICATE,
            "Username already taken",
            None,
        ),
        UserError::WrongPassword => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Current password is incorrect",
            None,
        ),
        UserError::Token(source) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::TOKEN,
            "Failed to issue session token",
            Some(source.to_string()),
        ),
    }
}

pub(crate) fn avatar_to_api(err: AvatarError) -> ApiError {
    match err {
        AvatarError::Io(source) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::UPLOAD,
            "Failed to store avatar",
            Some(source.to_string()),
        ),
        other => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::UPLOAD,
            "Invalid avatar upload",
            Some(other.to_string()),
        ),
    }
}

//! The caller's own account: profile, password, and theme settings.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::application::auth::{hash_password, verify_password};
use crate::application::repos::{
    CommentQueryFilter, CommentsRepo, PostsRepo, RepoError, UpdateProfileParams, UsersRepo,
};
use crate::application::tokens::{AuthUser, TokenCodec, TokenError};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::validate;

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("username already taken")]
    UsernameTaken,
    #[error("current password is incorrect")]
    WrongPassword,
    #[error("failed to issue session token")]
    Token(#[source] TokenError),
}

/// Profile read model: the account row plus contribution counts.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user: UserRecord,
    pub post_count: u64,
    pub comment_count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateProfileCommand {
    pub username: Option<String>,
    pub bio: Option<String>,
    pub website: Option<String>,
    pub github: Option<String>,
    pub twitter: Option<String>,
    /// Public path of an already stored avatar, when one was uploaded.
    pub avatar_url: Option<String>,
}

/// Update result. `token` is present only when the username changed,
/// since the old token still carries the stale name.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub user: UserRecord,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChangePasswordCommand {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone, Default)]
pub struct ThemeCommand {
    pub dark_mode: Option<bool>,
    pub theme_color: Option<String>,
    pub font_size: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UsersRepo>,
    posts: Arc<dyn PostsRepo>,
    comments: Arc<dyn CommentsRepo>,
    tokens: TokenCodec,
}

impl UserService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        posts: Arc<dyn PostsRepo>,
        comments: Arc<dyn CommentsRepo>,
        tokens: TokenCodec,
    ) -> Self {
        Self {
            users,
            posts,
            comments,
            tokens,
        }
    }

    pub async fn profile(&self, user: &AuthUser) -> Result<UserProfile, UserError> {
        let record = self
            .users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| DomainError::not_found("user"))?;

        let post_count = self.posts.count_by_author(record.id).await?;
        let comment_count = self
            .comments
            .count_by_author(record.id, &CommentQueryFilter::default())
            .await?;

        Ok(UserProfile {
            user: record,
            post_count,
            comment_count,
        })
    }

    /// Applies the submitted fields, skipping blanks. A changed username
    /// reissues the session token.
    pub async fn update_profile(
        &self,
        user: &AuthUser,
        cmd: UpdateProfileCommand,
    ) -> Result<ProfileUpdate, UserError> {
        let current = self
            .users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| DomainError::not_found("user"))?;

        let username = match validate::optional(cmd.username) {
            Some(name) if name != current.username => {
                let name = validate::username(&name)?;
                if self
                    .users
                    .find_by_username(&name)
                    .await?
                    .is_some_and(|other| other.id != current.id)
                {
                    return Err(UserError::UsernameTaken);
                }
                Some(name)
            }
            _ => None,
        };
        let renamed = username.is_some();

        let params = UpdateProfileParams {
            id: current.id,
            username,
            bio: validate::optional(cmd.bio),
            website: validate::optional(cmd.website),
            github: validate::optional(cmd.github),
            twitter: validate::optional(cmd.twitter),
            avatar: cmd.avatar_url,
        };
        let updated = match self.users.update_profile(params).await {
            Ok(record) => record,
            // Lost a race with a concurrent rename to the same name.
            Err(RepoError::Duplicate { .. }) => return Err(UserError::UsernameTaken),
            Err(err) => return Err(err.into()),
        };

        let token = if renamed {
            Some(
                self.tokens
                    .issue(updated.id, &updated.username, updated.role)
                    .map_err(UserError::Token)?,
            )
        } else {
            None
        };
        Ok(ProfileUpdate {
            user: updated,
            token,
        })
    }

    /// Verifies the current password, stores the new hash, and returns
    /// a fresh session token.
    pub async fn change_password(
        &self,
        user: &AuthUser,
        cmd: ChangePasswordCommand,
    ) -> Result<String, UserError> {
        validate::password(&cmd.new_password)?;
        if cmd.new_password != cmd.confirm_password {
            return Err(DomainError::validation("password confirmation does not match").into());
        }

        let record = self
            .users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| DomainError::not_found("user"))?;
        if !verify_password(&record.password_hash, &cmd.current_password) {
            return Err(UserError::WrongPassword);
        }

        self.users
            .update_password(record.id, &hash_password(&cmd.new_password))
            .await?;
        self.tokens
            .issue(record.id, &record.username, record.role)
            .map_err(UserError::Token)
    }

    /// Merges the submitted keys into the stored settings blob, leaving
    /// keys the request does not mention untouched.
    pub async fn update_theme(
        &self,
        user: &AuthUser,
        cmd: ThemeCommand,
    ) -> Result<Value, UserError> {
        let record = self
            .users
            .find_by_id(user.id)
            .await?
            .ok_or_else(|| DomainError::not_found("user"))?;

        let mut settings = match record.theme_settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        if let Some(dark_mode) = cmd.dark_mode {
            settings.insert("darkMode".to_string(), Value::Bool(dark_mode));
        }
        if let Some(color) = validate::optional(cmd.theme_color) {
            settings.insert("themeColor".to_string(), Value::String(color));
        }
        if let Some(size) = validate::optional(cmd.font_size) {
            settings.insert("fontSize".to_string(), Value::String(size));
        }

        let updated = self
            .users
            .update_theme(record.id, Value::Object(settings))
            .await?;
        Ok(updated.theme_settings)
    }
}

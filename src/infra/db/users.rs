use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{CreateUserParams, RepoError, UpdateProfileParams, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::UserRole;

use super::PostgresRepositories;
use super::util::map_sqlx_error;

const USER_COLUMNS: &str = "id, username, email, password_hash, role, avatar, bio, \
     website, github, twitter, theme_settings, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: UserRole,
    avatar: Option<String>,
    bio: Option<String>,
    website: Option<String>,
    github: Option<String>,
    twitter: Option<String>,
    theme_settings: serde_json::Value,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.role,
            avatar: row.avatar,
            bio: row.bio,
            website: row.website,
            github: row.github,
            twitter: row.twitter,
            theme_settings: row.theme_settings,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let CreateUserParams {
            username,
            email,
            password_hash,
            role,
        } = params;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, username, email, password_hash, role, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(role)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(UserRecord::from(row))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1 AND deleted_at IS NULL"
        ))
        .bind(username)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1 AND deleted_at IS NULL"
        ))
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Ok(row.map(UserRecord::from))
    }

    async fn update_profile(&self, params: UpdateProfileParams) -> Result<UserRecord, RepoError> {
        let UpdateProfileParams {
            id,
            username,
            bio,
            website,
            github,
            twitter,
            avatar,
        } = params;

        // Absent fields stay untouched, so the SET list is assembled
        // per request.
        let mut qb = QueryBuilder::new("UPDATE users SET updated_at = now()");
        if let Some(username) = username {
            qb.push(", username = ");
            qb.push_bind(username);
        }
        if let Some(bio) = bio {
            qb.push(", bio = ");
            qb.push_bind(bio);
        }
        if let Some(website) = website {
            qb.push(", website = ");
            qb.push_bind(website);
        }
        if let Some(github) = github {
            qb.push(", github = ");
            qb.push_bind(github);
        }
        if let Some(twitter) = twitter {
            qb.push(", twitter = ");
            qb.push_bind(twitter);
        }
        if let Some(avatar) = avatar {
            qb.push(", avatar = ");
            qb.push_bind(avatar);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(" AND deleted_at IS NULL RETURNING ");
        qb.push(USER_COLUMNS);

        let row = qb
            .build_query_as::<UserRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(UserRecord::from(row))
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<(), RepoError> {
        sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .bind(password_hash)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn update_theme(
        &self,
        id: Uuid,
        theme: serde_json::Value,
    ) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET theme_settings = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(theme)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(UserRecord::from(row))
    }

    async fn count_admins(&self) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = $1 AND deleted_at IS NULL",
        )
        .bind(UserRole::Admin)
        .fetch_one(self.pool())
        .await
        .map_err(RepoError::from_persistence)?;

        Self::convert_count(count)
    }
}

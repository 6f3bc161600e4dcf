//! Account registration, login, and session tokens.

use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::info;

use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::application::tokens::{TokenCodec, TokenError};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::types::UserRole;
use crate::domain::validate;

const SALT_LEN: usize = 16;

pub const DEFAULT_ADMIN_USERNAME: &str = "admin";
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin123";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    /// Deliberately covers both an unknown email and a wrong password.
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("email already registered")]
    EmailTaken,
    #[error("username already taken")]
    UsernameTaken,
    #[error("failed to issue session token")]
    Token(#[source] TokenError),
}

#[derive(Debug, Clone)]
pub struct RegisterCommand {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct LoginCommand {
    pub email: String,
    pub password: String,
}

/// Bootstrap admin credentials, normally taken from configuration.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Default for AdminSeed {
    fn default() -> Self {
        Self {
            username: DEFAULT_ADMIN_USERNAME.to_string(),
            email: DEFAULT_ADMIN_EMAIL.to_string(),
            password: DEFAULT_ADMIN_PASSWORD.to_string(),
        }
    }
}

/// A signed-in account together with its fresh session token.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: UserRecord,
    pub token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    tokens: TokenCodec,
}

impl AuthService {
    pub fn new(users: Arc<dyn UsersRepo>, tokens: TokenCodec) -> Self {
        Self { users, tokens }
    }

    pub async fn register(&self, cmd: RegisterCommand) -> Result<AuthSession, AuthError> {
        let username = validate::username(&cmd.username)?;
        let email = validate::email(&cmd.email)?;
        validate::password(&cmd.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::UsernameTaken);
        }

        let params = CreateUserParams {
            username,
            email,
            password_hash: hash_password(&cmd.password),
            role: UserRole::User,
        };
        // The unique indexes backstop the checks above under
        // concurrent registration.
        let user = match self.users.create_user(params).await {
            Ok(user) => user,
            Err(RepoError::Duplicate { constraint }) if constraint.contains("email") => {
                return Err(AuthError::EmailTaken);
            }
            Err(RepoError::Duplicate { .. }) => return Err(AuthError::UsernameTaken),
            Err(err) => return Err(err.into()),
        };

        info!(user_id = %user.id, username = %user.username, "account registered");
        self.session_for(user)
    }

    pub async fn login(&self, cmd: LoginCommand) -> Result<AuthSession, AuthError> {
        let email = validate::email(&cmd.email)?;

        let Some(user) = self.users.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };
        if !verify_password(&user.password_hash, &cmd.password) {
            return Err(AuthError::InvalidCredentials);
        }

        self.session_for(user)
    }

    /// Creates the bootstrap admin account when no admin exists yet.
    pub async fn ensure_default_admin(&self, seed: &AdminSeed) -> Result<(), AuthError> {
        if self.users.count_admins().await? > 0 {
            return Ok(());
        }

        let params = CreateUserParams {
            username: seed.username.clone(),
            email: seed.email.clone(),
            password_hash: hash_password(&seed.password),
            role: UserRole::Admin,
        };
        match self.users.create_user(params).await {
            Ok(user) => {
                info!(user_id = %user.id, username = %user.username, "seeded default admin account");
                Ok(())
            }
            // another instance won the seeding race
            Err(RepoError::Duplicate { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    fn session_for(&self, user: UserRecord) -> Result<AuthSession, AuthError> {
        let token = self
            .tokens
            .issue(user.id, &user.username, user.role)
            .map_err(AuthError::Token)?;
        Ok(AuthSession { user, token })
    }
}

/// Salted SHA-256, stored as `salt_hex:digest_hex`.
pub(crate) fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill(&mut salt);
    format!(
        "{}:{}",
        hex::encode(salt),
        hex::encode(digest(&salt, password))
    )
}

pub(crate) fn verify_password(stored: &str, candidate: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt_hex), hex::decode(digest_hex)) else {
        return false;
    };
    digest(&salt, candidate).ct_eq(&expected).unwrap_u8() == 1
}

fn digest(salt: &[u8], password: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().to_vec()
}

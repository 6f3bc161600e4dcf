//! Postgres-backed repository implementations.

mod categories;
mod comments;
mod favorites;
mod notifications;
mod posts;
mod tags;
mod users;
mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use sqlx::{
    Postgres, QueryBuilder,
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::repos::{PostListScope, PostQueryFilter, RepoError};
use crate::config::DatabaseSettings;
use crate::domain::types::PostStatus;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, settings: &DatabaseSettings) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(settings.max_connections.get())
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Narrows a post query to the rows the scope may see. Every caller
    /// has already pushed `p.deleted_at IS NULL`.
    fn apply_scope_conditions(qb: &mut QueryBuilder<'_, Postgres>, scope: PostListScope) {
        match scope {
            PostListScope::Published => {
                qb.push(" AND p.status = ");
                qb.push_bind(PostStatus::Published);
            }
            PostListScope::VisibleTo { viewer } => {
                qb.push(" AND (p.status = ");
                qb.push_bind(PostStatus::Published);
                qb.push(" OR p.author_id = ");
                qb.push_bind(viewer);
                qb.push(")");
            }
            PostListScope::Authored { viewer, status } => {
                qb.push(" AND p.author_id = ");
                qb.push_bind(viewer);
                if let Some(status) = status {
                    qb.push(" AND p.status = ");
                    qb.push_bind(status);
                }
            }
            PostListScope::Admin { status } => {
                if let Some(status) = status {
                    qb.push(" AND p.status = ");
                    qb.push_bind(status);
                }
            }
        }
    }

    fn apply_post_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q PostQueryFilter) {
        if let Some(tag) = filter.tag.as_ref() {
            qb.push(
                " AND EXISTS (SELECT 1 FROM post_tags pt \
                 INNER JOIN tags t ON t.id = pt.tag_id AND t.deleted_at IS NULL \
                 WHERE pt.post_id = p.id AND t.name = ",
            );
            qb.push_bind(tag);
            qb.push(")");
        }

        if let Some(tag_id) = filter.tag_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM post_tags pt WHERE pt.post_id = p.id AND pt.tag_id = ",
            );
            qb.push_bind(tag_id);
            qb.push(")");
        }

        if let Some(category_id) = filter.category_id {
            qb.push(
                " AND EXISTS (SELECT 1 FROM post_categories pc \
                 WHERE pc.post_id = p.id AND pc.category_id = ",
            );
            qb.push_bind(category_id);
            qb.push(")");
        }

        if let Some(keyword) = filter.keyword.as_ref() {
            let pattern = format!("%{keyword}%");
            qb.push(" AND (p.title ILIKE ");
            qb.push_bind(pattern.clone());
            qb.push(" OR p.content ILIKE ");
            qb.push_bind(pattern);
            qb.push(")");
        }
    }

    fn convert_count(value: i64) -> Result<u64, RepoError> {
        value
            .try_into()
            .map_err(|_| RepoError::from_persistence("count exceeds supported range"))
    }
}

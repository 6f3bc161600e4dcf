//! HTTP surface: the JSON API plus the database health probe.

pub mod api;
pub mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::{RequestContext, log_responses, set_request_context};

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sqlx::Error as SqlxError;

use crate::application::error::ErrorReport;
use crate::infra::db::PostgresRepositories;

/// Health probe router. Kept separate from [`ApiState`] so the API
/// router can be exercised without a live pool.
pub fn build_health_router(db: Arc<PostgresRepositories>) -> Router {
    Router::new()
        .route("/api/v1/health", get(db_health))
        .with_state(db)
}

async fn db_health(State(db): State<Arc<PostgresRepositories>>) -> Response {
    db_health_response(db.health_check().await)
}

fn db_health_response(result: Result<(), SqlxError>) -> Response {
    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error(
                "infra::http::db_health",
                StatusCode::SERVICE_UNAVAILABLE,
                &error,
            )
            .attach(&mut response);
            response
        }
    }
}

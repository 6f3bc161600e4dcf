//! The `/api/v1` JSON surface.
//!
//! Routes are grouped by access level: public reads decode a bearer
//! token when one is present, the authenticated group requires one, and
//! the taxonomy writes additionally require the admin role. Groups are
//! built as separate routers so the middleware stack stays per-group,
//! then merged into one.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware as axum_middleware;
use axum::routing::{delete, get, post, put};

use crate::infra::http::middleware::log_responses;

pub fn build_api_router(state: ApiState) -> Router {
    let public = Router::new()
        .route("/api/v1/auth/register", post(handlers::register))
        .route("/api/v1/auth/login", post(handlers::login))
        .route("/api/v1/posts", get(handlers::list_posts))
        .route("/api/v1/posts/{id}", get(handlers::get_post))
        .route("/api/v1/posts/{id}/comments", get(handlers::list_comments))
        .route("/api/v1/tags", get(handlers::list_tags))
        .route("/api/v1/tags/popular", get(handlers::popular_tags))
        .route("/api/v1/tags/{id}", get(handlers::get_tag))
        .route("/api/v1/categories", get(handlers::list_categories))
        .route("/api/v1/categories/{id}", get(handlers::get_category))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    let authed = Router::new()
        .route("/api/v1/posts", post(handlers::create_post))
        .route(
            "/api/v1/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
        .route(
            "/api/v1/posts/{id}/comments",
            post(handlers::create_comment),
        )
        .route(
            "/api/v1/comments/{id}",
            put(handlers::update_comment).delete(handlers::delete_comment),
        )
        .route(
            "/api/v1/posts/{id}/favorite",
            get(handlers::check_favorite).post(handlers::favorite_post),
        )
        .route("/api/v1/favorites/{id}", delete(handlers::remove_favorite))
        .route(
            "/api/v1/user/profile",
            get(handlers::get_profile)
                .post(handlers::update_profile)
                .layer(DefaultBodyLimit::max(state.upload_limit)),
        )
        .route("/api/v1/user/password", put(handlers::change_password))
        .route("/api/v1/user/theme", put(handlers::update_theme))
        .route("/api/v1/user/posts", get(handlers::list_own_posts))
        .route("/api/v1/user/comments", get(handlers::list_own_comments))
        .route("/api/v1/user/favorites", get(handlers::list_favorites))
        .route(
            "/api/v1/user/notifications",
            get(handlers::list_notifications),
        )
        .route(
            "/api/v1/user/notifications/read-all",
            put(handlers::read_all_notifications),
        )
        .route(
            "/api/v1/user/notifications/{id}/read",
            put(handlers::read_notification),
        )
        .route(
            "/api/v1/user/notifications/{id}",
            delete(handlers::delete_notification),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // route_layer order: the last layer added runs first, so auth
    // decodes the identity before the admin check reads it.
    let admin = Router::new()
        .route("/api/v1/tags", post(handlers::create_tag))
        .route(
            "/api/v1/tags/{id}",
            put(handlers::update_tag).delete(handlers::delete_tag),
        )
        .route("/api/v1/categories", post(handlers::create_category))
        .route(
            "/api/v1/categories/{id}",
            put(handlers::update_category).delete(handlers::delete_category),
        )
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(authed)
        .merge(admin)
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}

//! Bearer-token authentication for the API routes.
//!
//! `require_auth` rejects requests without a valid token and stores the
//! decoded [`AuthUser`] in request extensions, so handlers read the
//! identity from an `Extension` extractor instead of re-parsing headers.
//! `optional_auth` does the same without rejecting anonymous requests.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::application::tokens::{AuthUser, TokenError};

use super::error::{ApiError, codes};
use super::state::ApiState;

pub async fn require_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers().get(header::AUTHORIZATION)) else {
        return ApiError::unauthorized("Authentication required").into_response();
    };

    let user = match state.tokens.verify(&token) {
        Ok(user) => user,
        Err(TokenError::Expired) => {
            return ApiError::new(
                StatusCode::UNAUTHORIZED,
                codes::UNAUTHORIZED,
                "Session token expired",
                None,
            )
            .into_response();
        }
        Err(_) => return ApiError::unauthorized("Invalid session token").into_response(),
    };

    request.extensions_mut().insert(user);
    next.run(request).await
}

pub async fn optional_auth(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(token) = extract_token(request.headers().get(header::AUTHORIZATION)) {
        match state.tokens.verify(&token) {
            Ok(user) => {
                request.extensions_mut().insert(user);
            }
            Err(error) => {
                // Anonymous access is fine here, so a stale token only
                // downgrades the request instead of failing it.
                debug!(%error, "ignoring unusable bearer token");
            }
        }
    }
    next.run(request).await
}

/// Admin gate. Layered inside `require_auth`, which has already placed
/// the identity in request extensions.
pub async fn require_admin(request: Request<Body>, next: Next) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(_) => ApiError::forbidden("Administrator access required").into_response(),
        None => ApiError::unauthorized("Authentication required").into_response(),
    }
}

fn extract_token(header: Option<&HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let token = raw.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token.to_string())
}

//! Request-scoped middleware shared by the whole HTTP surface.

use std::time::Instant;

use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

/// Correlation data minted once per request.
#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

/// Mints a request id and stores it in both the request and response
/// extensions, so handlers and later middleware can correlate log lines.
pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let context = RequestContext {
        request_id: Uuid::new_v4().to_string(),
    };

    request.extensions_mut().insert(context.clone());
    let mut response = next.run(request).await;
    response.extensions_mut().insert(context);
    response
}

/// Emits one structured line per failed request.
///
/// Handlers attach an [`ErrorReport`] to error responses; this layer
/// pulls it back out so the log line carries the full source chain
/// while the response body stays client-safe.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|context| context.request_id.clone())
        .unwrap_or_default();

    let start = Instant::now();
    let mut response = next.run(request).await;
    let elapsed_ms = start.elapsed().as_millis();

    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let report = response.extensions_mut().remove::<ErrorReport>();
    let (source, detail, chain) = match report {
        Some(report) => {
            let mut messages = report.messages.into_iter();
            let detail = messages.next().unwrap_or_default();
            let chain = messages.collect::<Vec<_>>().join(" <- ");
            (report.source, detail, chain)
        }
        None => ("", String::new(), String::new()),
    };

    if status.is_server_error() {
        error!(
            target: "foglio::http::response",
            status = status.as_u16(),
            method = %method,
            path = uri.path(),
            query = uri.query().unwrap_or_default(),
            elapsed_ms,
            source,
            detail,
            chain,
            request_id,
            "request failed"
        );
    } else {
        warn!(
            target: "foglio::http::response",
            status = status.as_u16(),
            method = %method,
            path = uri.path(),
            query = uri.query().unwrap_or_default(),
            elapsed_ms,
            source,
            detail,
            chain,
            request_id,
            "request rejected"
        );
    }

    response
}

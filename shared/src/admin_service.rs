use crate::http::make_error_response;
use axum::Router;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use http::StatusCode;
use std::sync::Arc;

/// Router for the admin listener: `/health` always answers, `/ready` consults `is_ready`.
pub fn admin_router<F>(is_ready: F) -> Router
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let is_ready = Arc::new(is_ready);

    Router::new()
        .route("/health", get(|| async { "ok\n" }))
        .route(
            "/ready",
            get(move || {
                let is_ready = is_ready.clone();
                async move { ready_response(is_ready()) }
            }),
        )
        .fallback(|| async { make_error_response(StatusCode::NOT_FOUND) })
}

fn ready_response(is_ready: bool) -> Response {
    match is_ready {
        true => "ok\n".into_response(),
        false => make_error_response(StatusCode::SERVICE_UNAVAILABLE),
    }
}

// Browsers may not call the panel directly with custom headers, so every response from
// this service, errors included, carries an allow-all policy naming the target headers.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
};
use http::{HeaderMap, HeaderValue, Method, StatusCode};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOW_HEADERS: &str = "Content-Type, X-API-URL, X-API-Key, X-Server-ID, X-Proxy-URL";

/// Answers preflight requests itself and stamps the policy on everything else.
pub async fn cors(request: Request, next: Next) -> Response {
    let mut response = match request.method() == Method::OPTIONS {
        true => StatusCode::OK.into_response(),
        false => next.run(request).await,
    };

    apply_policy(response.headers_mut());
    response
}

fn apply_policy(headers: &mut HeaderMap) {
    headers.insert(
        ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(ALLOW_ORIGIN),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}

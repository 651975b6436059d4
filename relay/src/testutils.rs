// In-process stand-in for the panel API. It records every request it receives and picks
// its behaviour from the server identifier in the path:
//
// - `challenge`: every endpoint answers with an anti-bot interstitial
// - `denied`: every endpoint answers 403 with a panel error body
// - `buffer` / `quoted`: `contents` answers in the encoded forms some panels use
// - `nourl`: `upload` answers without a signed URL
// - `rejecting-node`: the signed upload URL points at a node that refuses the upload
//
// Any other server id behaves like a healthy panel backed by an in-memory file map.

use axum::body::Body;
use axum::extract::{Multipart, Path, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, HOST};
use http::{HeaderMap, Method, StatusCode};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::net::TcpListener;

pub const CHALLENGE_PAGE: &str =
    "<!DOCTYPE html><html><head><title>Just a moment...</title></head><body>Checking your browser. Cloudflare Ray ID: 8a1b2c3d</body></html>";

#[derive(Clone, Debug)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub host: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
}

#[derive(Clone, Debug)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub contents: Bytes,
}

#[derive(Clone, Debug)]
pub struct Upload {
    pub directory: Option<String>,
    pub files: Vec<UploadedFile>,
}

#[derive(Default)]
struct MockState {
    base_url: OnceLock<String>,
    calls: Mutex<Vec<Call>>,
    files: Mutex<HashMap<String, Bytes>>,
    uploads: Mutex<Vec<Upload>>,
}

pub struct MockPanel {
    pub url: String,
    state: Arc<MockState>,
}

impl MockPanel {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to address");
        let url = format!("http://{}", listener.local_addr().unwrap());

        let state = Arc::new(MockState::default());
        state.base_url.set(url.clone()).unwrap();

        let app = Router::new()
            .route("/{server}/files/list", get(list))
            .route("/{server}/files/contents", get(contents))
            .route("/{server}/files/write", post(write))
            .route("/{server}/files/delete", post(no_content))
            .route("/{server}/files/rename", put(no_content))
            .route("/{server}/files/create-folder", post(no_content))
            .route("/{server}/files/decompress", post(no_content))
            .route("/{server}/files/compress", post(compress))
            .route("/{server}/files/download", get(download))
            .route("/{server}/files/upload", get(upload_target))
            .route("/{server}/power", post(no_content))
            .route("/{server}/command", post(no_content))
            .route("/{server}/resources", get(resources))
            .route("/upload-sink", post(upload_sink))
            .layer(middleware::from_fn_with_state(state.clone(), record))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        MockPanel { url, state }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn store(&self, file: &str, contents: impl Into<Bytes>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(file.to_owned(), contents.into());
    }
}

fn header(headers: &HeaderMap, name: http::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

async fn record(State(state): State<Arc<MockState>>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .unwrap_or_default();

    state.calls.lock().unwrap().push(Call {
        method: parts.method.clone(),
        path: parts.uri.path().to_owned(),
        query: parts.uri.query().map(str::to_owned),
        host: header(&parts.headers, HOST),
        authorization: header(&parts.headers, AUTHORIZATION),
        content_type: header(&parts.headers, CONTENT_TYPE),
        body: body.clone(),
    });

    let scenario = parts
        .uri
        .path()
        .trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or("")
        .to_owned();

    match scenario.as_str() {
        "challenge" => (StatusCode::FORBIDDEN, Html(CHALLENGE_PAGE)).into_response(),
        "denied" => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "errors": [{
                    "code": "AuthorizationException",
                    "status": "403",
                    "detail": "This action is unauthorized."
                }]
            })),
        )
            .into_response(),
        _ => next.run(Request::from_parts(parts, Body::from(body))).await,
    }
}

async fn list(Query(query): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    Json(json!({
        "object": "list",
        "directory": query.get("directory"),
        "data": [{
            "object": "file_object",
            "attributes": {"name": "server.properties", "is_file": true}
        }]
    }))
}

async fn contents(
    State(state): State<Arc<MockState>>,
    Path(server): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    match server.as_str() {
        "buffer" => return r#"{"type":"Buffer","data":[104,105]}"#.into_response(),
        "quoted" => return r#""hello\nworld""#.into_response(),
        _ => {}
    }

    let file = query.get("file").cloned().unwrap_or_default();
    match state.files.lock().unwrap().get(&file) {
        Some(contents) => contents.clone().into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "errors": [{
                    "code": "NotFoundHttpException",
                    "status": "404",
                    "detail": "The requested resource could not be found on the server."
                }]
            })),
        )
            .into_response(),
    }
}

async fn write(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    body: Bytes,
) -> StatusCode {
    let file = query.get("file").cloned().unwrap_or_default();
    state.files.lock().unwrap().insert(file, body);
    StatusCode::NO_CONTENT
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn compress() -> Json<serde_json::Value> {
    Json(json!({
        "object": "file_object",
        "attributes": {"name": "archive-2024-05-01.tar.gz", "mode": "-rw-r--r--", "size": 2048}
    }))
}

async fn download() -> Json<serde_json::Value> {
    Json(json!({
        "object": "signed_url",
        "attributes": {"url": "https://node.example.com/download/file?token=signed"}
    }))
}

async fn upload_target(
    State(state): State<Arc<MockState>>,
    Path(server): Path<String>,
) -> Json<serde_json::Value> {
    let base = state.base_url.get().cloned().unwrap_or_default();
    let attributes = match server.as_str() {
        "nourl" => json!({}),
        "rejecting-node" => json!({"url": format!("{base}/upload-sink?token=reject")}),
        _ => json!({"url": format!("{base}/upload-sink?token=signed")}),
    };
    Json(json!({"object": "signed_url", "attributes": attributes}))
}

async fn resources() -> Json<serde_json::Value> {
    Json(json!({
        "object": "stats",
        "attributes": {
            "current_state": "running",
            "resources": {"memory_bytes": 588701696, "cpu_absolute": 12.5}
        }
    }))
}

async fn upload_sink(
    State(state): State<Arc<MockState>>,
    Query(query): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Response {
    let mut files = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let field_name = field.name().unwrap_or_default().to_owned();
        let filename = field.file_name().unwrap_or_default().to_owned();
        let contents = field.bytes().await.unwrap_or_default();
        files.push(UploadedFile {
            field: field_name,
            filename,
            contents,
        });
    }

    state.uploads.lock().unwrap().push(Upload {
        directory: query.get("directory").cloned(),
        files,
    });

    match query.get("token").map(String::as_str) {
        Some("reject") => (
            StatusCode::INSUFFICIENT_STORAGE,
            Json(json!({"errors": [{"detail": "Not enough disk space."}]})),
        )
            .into_response(),
        _ => StatusCode::OK.into_response(),
    }
}

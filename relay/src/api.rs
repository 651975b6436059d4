use crate::backend::{Backend, Expect, Reply, Session};
use crate::contents::decode_contents;
use crate::errors::RelayError;
use crate::metrics_defs::{RELAY_REQUEST, RELAY_REQUEST_DURATION, RELAY_UPLOAD_FILES};
use crate::target::{Namespace, Target};
use crate::upload::{MultipartEncoder, body_from_channel};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{MatchedPath, Multipart, Query, Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use shared::{counter, histogram};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    backend: Arc<Backend>,
}

impl AppState {
    pub fn new(backend: Backend) -> Self {
        AppState {
            backend: Arc::new(backend),
        }
    }

    fn open(&self, headers: &HeaderMap) -> Result<Session, RelayError> {
        self.backend.open(Target::from_headers(headers)?)
    }
}

/// The `/api` surface. Every handler resolves the target from the request headers,
/// issues its backend call(s) and normalizes the reply.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/files/list", get(list_directory))
        .route("/api/files/contents", get(read_contents))
        .route("/api/files/write", post(write_file))
        .route("/api/files/delete", post(delete_files))
        .route("/api/files/rename", post(rename_file).put(rename_file))
        .route("/api/files/create-folder", post(create_folder))
        .route("/api/files/download", get(download_file))
        .route("/api/files/upload", get(upload_target).post(proxy_upload))
        .route("/api/files/proxy-upload", post(proxy_upload))
        .route("/api/files/compress", post(compress_files))
        .route("/api/files/decompress", post(decompress_file))
        .route("/api/power", post(power_action))
        .route("/api/resources", get(server_resources))
        .route("/api/command", post(send_command))
        .route_layer(middleware::from_fn(track_metrics))
}

/// Power signals the panel accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerSignal {
    Start,
    Stop,
    Restart,
    Kill,
}

impl FromStr for PowerSignal {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start" => Ok(PowerSignal::Start),
            "stop" => Ok(PowerSignal::Stop),
            "restart" => Ok(PowerSignal::Restart),
            "kill" => Ok(PowerSignal::Kill),
            _ => Err(RelayError::InvalidPowerSignal),
        }
    }
}

#[derive(Deserialize)]
struct DirectoryQuery {
    #[serde(default = "root_directory")]
    directory: String,
}

#[derive(Deserialize)]
struct FileQuery {
    #[serde(default)]
    file: String,
}

fn root_directory() -> String {
    "/".into()
}

fn ok() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

fn parse_json(body: &[u8]) -> Result<Value, RelayError> {
    serde_json::from_slice(body).map_err(|e| RelayError::InvalidBody(e.to_string()))
}

fn string_field<'a>(body: &'a Value, name: &str) -> &'a str {
    body.get(name).and_then(Value::as_str).unwrap_or("")
}

async fn list_directory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DirectoryQuery>,
) -> Result<Json<Value>, RelayError> {
    let session = state.open(&headers)?;
    let request = session
        .get(&session.target().files_url("list"))
        .query(&[("directory", &query.directory)]);

    let reply = session
        .fetch(request)
        .await?
        .reject_challenge()?
        .success(Expect::Ok)?;
    Ok(Json(reply.json()?))
}

async fn read_contents(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
) -> Result<Response, RelayError> {
    let session = state.open(&headers)?;
    let request = session
        .get(&session.target().files_url("contents"))
        .query(&[("file", &query.file)]);

    let reply = session.fetch(request).await?.success(Expect::Ok)?;
    let contents = decode_contents(reply.body);
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], contents).into_response())
}

async fn write_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let session = state.open(&headers)?;
    // The panel stores the body verbatim; a JSON content type would make it parse it.
    let request = session
        .request_as(Method::POST, &session.target().files_url("write"), "text/plain")
        .query(&[("file", &query.file)])
        .body(body);

    session
        .fetch(request)
        .await?
        .success(Expect::OkOrNoContent)?;
    Ok(ok())
}

/// Forwards the caller's JSON body unchanged to a files endpoint.
async fn forward_json(
    state: &AppState,
    headers: &HeaderMap,
    method: Method,
    endpoint: &str,
    body: &[u8],
) -> Result<Reply, RelayError> {
    let session = state.open(headers)?;
    let payload = parse_json(body)?;
    let url = session.target().files_url(endpoint);

    session
        .fetch(session.send_json(method, &url, &payload))
        .await?
        .success(Expect::OkOrNoContent)
}

async fn delete_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    forward_json(&state, &headers, Method::POST, "delete", &body).await?;
    Ok(ok())
}

async fn rename_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    forward_json(&state, &headers, Method::PUT, "rename", &body).await?;
    Ok(ok())
}

async fn create_folder(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    forward_json(&state, &headers, Method::POST, "create-folder", &body).await?;
    Ok(ok())
}

async fn compress_files(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let reply = forward_json(&state, &headers, Method::POST, "compress", &body).await?;
    match reply.is_empty() {
        true => Ok(ok()),
        false => Ok(Json(reply.json()?)),
    }
}

async fn decompress_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    forward_json(&state, &headers, Method::POST, "decompress", &body).await?;
    Ok(ok())
}

// Returns the panel's signed download URL; the browser fetches the bytes itself.
async fn download_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<FileQuery>,
) -> Result<Json<Value>, RelayError> {
    let session = state.open(&headers)?;
    let request = session
        .get(&session.target().files_url("download"))
        .query(&[("file", &query.file)]);

    let reply = session.fetch(request).await?.success(Expect::Ok)?;
    Ok(Json(reply.json()?))
}

async fn upload_target(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, RelayError> {
    let session = state.open(&headers)?;
    let request = session.get(&session.target().files_url("upload"));

    let reply = session.fetch(request).await?.success(Expect::Ok)?;
    Ok(Json(reply.json()?))
}

/// Signed node URL from an upload-target reply, with the destination directory appended.
fn upload_url(reply: &Reply, directory: &str) -> Result<url::Url, RelayError> {
    let value = reply.json()?;
    let raw = value
        .pointer("/attributes/url")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .ok_or(RelayError::MissingUploadUrl)?;

    let mut url = url::Url::parse(raw)?;
    url.query_pairs_mut().append_pair("directory", directory);
    Ok(url)
}

async fn proxy_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DirectoryQuery>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, RelayError> {
    let session = state.open(&headers)?;
    let multipart = multipart.map_err(|e| RelayError::InvalidBody(e.to_string()))?;

    let request = session.get(&session.target().files_url("upload"));
    let reply = session
        .fetch(request)
        .await
        .and_then(|reply| reply.success(Expect::Ok))
        .map_err(RelayError::into_upload_target)?;
    let url = upload_url(&reply, &query.directory)?;

    let encoder = MultipartEncoder::new();
    let (tx, rx) = MultipartEncoder::channel();
    let request = session.upload(url, &encoder.content_type(), body_from_channel(rx));

    let (pumped, sent) = tokio::join!(encoder.pump(multipart, tx), session.fetch(request));
    let files = pumped?;
    sent?
        .success(Expect::OkOrNoContent)
        .map_err(RelayError::into_upload_rejected)?;

    histogram!(RELAY_UPLOAD_FILES).record(files as f64);
    tracing::info!(files, directory = %query.directory, "relayed upload");
    Ok(ok())
}

async fn power_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let body = parse_json(&body)?;
    let signal = PowerSignal::from_str(string_field(&body, "signal"))?;

    let session = state.open(&headers)?;
    let url = session.target().namespace_url(Namespace::Power);
    session
        .fetch(session.send_json(Method::POST, &url, &json!({ "signal": signal })))
        .await?
        .success(Expect::OkOrNoContent)?;

    tracing::info!(signal = ?signal, "sent power signal");
    Ok(Json(json!({ "status": "ok", "action": signal })))
}

async fn server_resources(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, RelayError> {
    let session = state.open(&headers)?;
    let request = session.get(&session.target().namespace_url(Namespace::Resources));

    let reply = session.fetch(request).await?.success(Expect::Ok)?;
    Ok(Json(reply.json()?))
}

async fn send_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, RelayError> {
    let body = parse_json(&body)?;
    let command = string_field(&body, "command");
    if command.trim().is_empty() {
        return Err(RelayError::EmptyCommand);
    }

    let session = state.open(&headers)?;
    let url = session.target().namespace_url(Namespace::Command);
    session
        .fetch(session.send_json(Method::POST, &url, &json!({ "command": command })))
        .await?
        .success(Expect::OkOrNoContent)?;
    Ok(ok())
}

async fn track_metrics(matched_path: MatchedPath, request: Request, next: Next) -> Response {
    let started = Instant::now();
    let route = matched_path.as_str().to_owned();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    counter!(RELAY_REQUEST, "route" => route.clone(), "status" => status.clone()).increment(1);
    histogram!(RELAY_REQUEST_DURATION, "route" => route, "status" => status)
        .record(started.elapsed().as_secs_f64());

    response
}

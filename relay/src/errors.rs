use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;

/// Result type alias for relay operations
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Longest slice of a backend body quoted back to the caller when no detail is available.
pub const DETAIL_PREVIEW_CHARS: usize = 200;

/// Errors that can occur while relaying an operation to the panel backend
#[derive(thiserror::Error, Debug)]
pub enum RelayError {
    #[error("configure the API URL, server ID and API key first")]
    MissingConfiguration,

    #[error("invalid power action, supported: start, stop, restart, kill")]
    InvalidPowerSignal,

    #[error("command must not be empty")]
    EmptyCommand,

    #[error("invalid request body: {0}")]
    InvalidBody(String),

    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Cloudflare protection detected, configure a relay address")]
    ProtectionDetected,

    #[error("API error ({status}): {detail}")]
    Backend { status: StatusCode, detail: String },

    #[error("failed to obtain upload URL: {detail}")]
    UploadTarget { status: StatusCode, detail: String },

    #[error("upload failed: {detail}")]
    UploadRejected { status: StatusCode, detail: String },

    #[error("unable to obtain upload URL")]
    MissingUploadUrl,

    #[error("malformed backend response: {0}")]
    MalformedResponse(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),
}

impl RelayError {
    /// Builds a backend error from a non-success reply, extracting the panel's
    /// `errors[0].detail` message when the body carries one.
    pub fn backend(status: StatusCode, body: &[u8]) -> Self {
        RelayError::Backend {
            status,
            detail: error_detail(body),
        }
    }

    /// Re-labels a backend rejection of the upload-target request.
    pub fn into_upload_target(self) -> Self {
        match self {
            RelayError::Backend { status, detail } => RelayError::UploadTarget { status, detail },
            other => other,
        }
    }

    /// Re-labels a backend rejection of the multipart upload itself.
    pub fn into_upload_rejected(self) -> Self {
        match self {
            RelayError::Backend { status, detail } => RelayError::UploadRejected { status, detail },
            other => other,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingConfiguration
            | RelayError::InvalidPowerSignal
            | RelayError::EmptyCommand
            | RelayError::InvalidBody(_)
            | RelayError::Multipart(_) => StatusCode::BAD_REQUEST,
            RelayError::ProtectionDetected => StatusCode::FORBIDDEN,
            RelayError::Backend { status, .. }
            | RelayError::UploadTarget { status, .. }
            | RelayError::UploadRejected { status, .. } => *status,
            RelayError::MissingUploadUrl
            | RelayError::MalformedResponse(_)
            | RelayError::InvalidUrl(_)
            | RelayError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Human-readable message for a failed backend reply.
///
/// Panel errors look like `{"errors":[{"code":"...","detail":"..."}]}`. Anything
/// else (HTML error pages, proxies, plain text) is quoted as a bounded preview.
pub fn error_detail(body: &[u8]) -> String {
    let detail = serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/errors/0/detail")
                .and_then(|detail| detail.as_str())
                .map(str::to_owned)
        });

    detail.unwrap_or_else(|| {
        String::from_utf8_lossy(body)
            .chars()
            .take(DETAIL_PREVIEW_CHARS)
            .collect()
    })
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();

        match &self {
            RelayError::Transport(e) => {
                tracing::error!(
                    error = %self,
                    url = ?e.url(),
                    timeout = e.is_timeout(),
                    "relay request failed"
                );
            }
            RelayError::MissingUploadUrl
            | RelayError::MalformedResponse(_)
            | RelayError::InvalidUrl(_) => {
                tracing::error!(error = %self, "relay request failed");
            }
            RelayError::Backend { .. }
            | RelayError::UploadTarget { .. }
            | RelayError::UploadRejected { .. }
            | RelayError::ProtectionDetected => {
                tracing::warn!(status = %status, error = %self, "backend rejected request");
            }
            _ => {
                tracing::debug!(error = %self, "rejected request");
            }
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_detail_from_panel_json() {
        let body = br#"{"errors":[{"code":"NotFoundHttpException","status":"404","detail":"The requested resource could not be found on the server."}]}"#;
        assert_eq!(
            error_detail(body),
            "The requested resource could not be found on the server."
        );
    }

    #[test]
    fn test_error_detail_falls_back_to_preview() {
        let html = "<html>".repeat(100);
        let detail = error_detail(html.as_bytes());
        assert_eq!(detail.chars().count(), DETAIL_PREVIEW_CHARS);
        assert!(html.starts_with(&detail));

        // JSON without the expected shape is quoted too
        assert_eq!(error_detail(br#"{"message":"nope"}"#), r#"{"message":"nope"}"#);

        // Multi-byte characters are never split
        let text = "é".repeat(300);
        assert_eq!(error_detail(text.as_bytes()).chars().count(), DETAIL_PREVIEW_CHARS);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            RelayError::MissingConfiguration.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(RelayError::ProtectionDetected.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            RelayError::backend(StatusCode::CONFLICT, b"busy").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            RelayError::MissingUploadUrl.status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );

        let relabeled = RelayError::backend(StatusCode::FORBIDDEN, b"denied").into_upload_target();
        assert!(matches!(
            relabeled,
            RelayError::UploadTarget { status: StatusCode::FORBIDDEN, .. }
        ));
        assert_eq!(relabeled.to_string(), "failed to obtain upload URL: denied");
    }
}

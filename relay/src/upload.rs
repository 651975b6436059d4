// Re-encodes the file parts of an inbound multipart body as a fresh multipart body for
// the node's upload endpoint. Parts are forwarded chunk by chunk through a bounded
// channel, so at most a few chunks of a file are held in memory at any time.

use crate::errors::RelayError;
use axum::extract::Multipart;
use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Form field name the node expects for uploaded files.
pub const FILES_FIELD: &str = "files";

/// Chunks in flight between the inbound reader and the outbound request.
const CHANNEL_CAPACITY: usize = 8;

pub type Chunk = Result<Bytes, std::io::Error>;

pub struct MultipartEncoder {
    boundary: String,
}

impl Default for MultipartEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartEncoder {
    pub fn new() -> Self {
        MultipartEncoder {
            boundary: random_boundary(),
        }
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Channel pair feeding the outbound body; the receiver side becomes a
    /// [`reqwest::Body`] through [`body_from_channel`].
    pub fn channel() -> (mpsc::Sender<Chunk>, mpsc::Receiver<Chunk>) {
        mpsc::channel(CHANNEL_CAPACITY)
    }

    /// Copies every inbound part that has a filename into `tx`. Plain form fields and
    /// parts with an empty filename (an empty file input) are skipped.
    ///
    /// Returns the number of files written. A malformed inbound body is pushed into the
    /// channel as an error, so the outbound request is aborted instead of completing
    /// with a truncated upload. If the receiver goes away the outbound side has failed
    /// and will report why, so copying just stops.
    pub async fn pump(
        &self,
        mut multipart: Multipart,
        tx: mpsc::Sender<Chunk>,
    ) -> Result<usize, RelayError> {
        match self.copy_parts(&mut multipart, &tx).await {
            Ok(files) => Ok(files),
            Err(PumpError::Closed) => Ok(0),
            Err(PumpError::Multipart(e)) => {
                let _ = tx.send(Err(std::io::Error::other(e.to_string()))).await;
                Err(RelayError::Multipart(e))
            }
        }
    }

    async fn copy_parts(
        &self,
        multipart: &mut Multipart,
        tx: &mpsc::Sender<Chunk>,
    ) -> Result<usize, PumpError> {
        let mut files = 0;

        while let Some(mut field) = multipart.next_field().await? {
            let Some(filename) = field
                .file_name()
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
            else {
                continue;
            };
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_owned();

            send(tx, self.part_header(&filename, &content_type)).await?;
            while let Some(chunk) = field.chunk().await? {
                send(tx, chunk).await?;
            }
            send(tx, Bytes::from_static(b"\r\n")).await?;

            tracing::debug!(filename = %filename, "relayed upload part");
            files += 1;
        }

        send(tx, Bytes::from(format!("--{}--\r\n", self.boundary))).await?;
        Ok(files)
    }

    fn part_header(&self, filename: &str, content_type: &str) -> Bytes {
        Bytes::from(format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
            self.boundary,
            FILES_FIELD,
            escape_quoted(filename),
            content_type,
        ))
    }
}

/// Outbound request body that yields whatever the pump pushes into the channel.
pub fn body_from_channel(rx: mpsc::Receiver<Chunk>) -> reqwest::Body {
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (chunk, rx))
    });
    reqwest::Body::wrap_stream(stream)
}

enum PumpError {
    Multipart(axum::extract::multipart::MultipartError),
    Closed,
}

impl From<axum::extract::multipart::MultipartError> for PumpError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        PumpError::Multipart(e)
    }
}

async fn send(tx: &mpsc::Sender<Chunk>, bytes: Bytes) -> Result<(), PumpError> {
    tx.send(Ok(bytes)).await.map_err(|_| PumpError::Closed)
}

// Quoted-string in Content-Disposition: quotes are percent-encoded and line breaks
// dropped, the same way browsers build form data.
fn escape_quoted(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '\r' && *c != '\n')
        .map(|c| match c {
            '"' => "%22".to_owned(),
            c => c.to_string(),
        })
        .collect()
}

fn random_boundary() -> String {
    format!("----panelgate{}", Uuid::new_v4().simple())
}

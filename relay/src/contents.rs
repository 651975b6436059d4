use bytes::Bytes;
use serde::Deserialize;

/// A serialized Node.js `Buffer`, which some panel versions return in place of raw file contents.
#[derive(Deserialize)]
#[serde(tag = "type")]
enum Encoded {
    Buffer { data: Vec<u8> },
}

/// Recovers the literal file bytes from a `contents` reply.
///
/// Decode attempts, first match wins:
/// 1. `{"type":"Buffer","data":[...]}` yields the listed bytes.
/// 2. A JSON string yields its unescaped text.
/// 3. Anything else is already the file content.
pub fn decode_contents(body: Bytes) -> Bytes {
    if let Ok(Encoded::Buffer { data }) = serde_json::from_slice::<Encoded>(&body) {
        return Bytes::from(data);
    }

    if let Ok(text) = serde_json::from_slice::<String>(&body) {
        return Bytes::from(text);
    }

    body
}

// Resolves the per-request target: which panel server the caller wants to reach, with
// which credential, and through which egress relay. Everything comes from request
// headers; nothing is remembered between requests.

use crate::errors::RelayError;
use http::HeaderMap;
use http::header::HeaderName;

pub const API_URL_HEADER: HeaderName = HeaderName::from_static("x-api-url");
pub const SERVER_ID_HEADER: HeaderName = HeaderName::from_static("x-server-id");
pub const API_KEY_HEADER: HeaderName = HeaderName::from_static("x-api-key");
pub const RELAY_ADDRESS_HEADER: HeaderName = HeaderName::from_static("x-proxy-url");

/// Backend namespaces that live next to each other under the server root.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Namespace {
    Files,
    Power,
    Resources,
    Command,
}

impl Namespace {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Namespace::Files => "files",
            Namespace::Power => "power",
            Namespace::Resources => "resources",
            Namespace::Command => "command",
        }
    }
}

/// Resolved base URL, credential and optional relay address for one request.
#[derive(Clone, Debug, PartialEq)]
pub struct Target {
    server_root: String,
    credential: String,
    relay_address: Option<String>,
}

impl Target {
    /// Builds a target from the API origin, server identifier and API key.
    ///
    /// All three must be non-empty; the relay address is dropped when blank.
    pub fn new(
        api_url: &str,
        server_id: &str,
        api_key: &str,
        relay_address: Option<&str>,
    ) -> Result<Self, RelayError> {
        if api_url.is_empty() || server_id.is_empty() || api_key.is_empty() {
            return Err(RelayError::MissingConfiguration);
        }

        let relay_address = relay_address
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_owned);

        Ok(Target {
            server_root: format!("{}/{}", api_url.trim_end_matches('/'), server_id),
            credential: api_key.to_owned(),
            relay_address,
        })
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, RelayError> {
        Target::new(
            header_str(headers, &API_URL_HEADER),
            header_str(headers, &SERVER_ID_HEADER),
            header_str(headers, &API_KEY_HEADER),
            headers
                .get(&RELAY_ADDRESS_HEADER)
                .and_then(|value| value.to_str().ok()),
        )
    }

    /// Root of a namespace, e.g. `https://panel/api/client/servers/abc/power`.
    pub fn namespace_url(&self, namespace: Namespace) -> String {
        format!("{}/{}", self.server_root, namespace.as_str())
    }

    /// Endpoint inside the files namespace, e.g. `.../files/list`.
    pub fn files_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.namespace_url(Namespace::Files), endpoint)
    }

    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.credential)
    }

    pub fn relay_address(&self) -> Option<&str> {
        self.relay_address.as_deref()
    }
}

// Values that are not valid visible ASCII count as missing.
fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("")
}

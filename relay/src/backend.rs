use crate::config::UpstreamConfig;
use crate::errors::RelayError;
use crate::target::Target;
use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{Method, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// Body fragments served by anti-bot interstitials in front of the panel.
const CHALLENGE_MARKERS: &[&str] = &["Cloudflare", "Just a moment"];

/// Which statuses count as success for an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Expect {
    /// Reads: only 200 carries the payload.
    Ok,
    /// Mutations: 200 or an empty 204.
    OkOrNoContent,
}

impl Expect {
    pub fn accepts(&self, status: StatusCode) -> bool {
        match self {
            Expect::Ok => status == StatusCode::OK,
            Expect::OkOrNoContent => {
                status == StatusCode::OK || status == StatusCode::NO_CONTENT
            }
        }
    }
}

/// Outbound settings shared by every request; sessions are opened from it per request.
#[derive(Clone, Debug)]
pub struct Backend {
    request_timeout: Duration,
    upload_timeout: Duration,
    connect_timeout: Duration,
    user_agent: String,
}

impl Backend {
    pub fn new(config: &UpstreamConfig) -> Self {
        Backend {
            request_timeout: config.request_timeout(),
            upload_timeout: config.upload_timeout(),
            connect_timeout: config.connect_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }

    /// Opens a session for one inbound request.
    ///
    /// The client, its connection pool and its relay proxy are owned by the session and
    /// released when it is dropped, whichever way the handler exits. Egress goes through
    /// the target's relay address when one is set and direct otherwise; proxy settings
    /// from the environment are ignored.
    pub fn open(&self, target: Target) -> Result<Session, RelayError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout)
            .no_proxy();

        if let Some(address) = target.relay_address() {
            builder = builder.proxy(reqwest::Proxy::all(address)?);
        }

        Ok(Session {
            client: builder.build()?,
            target,
            request_timeout: self.request_timeout,
            upload_timeout: self.upload_timeout,
        })
    }
}

pub struct Session {
    client: reqwest::Client,
    target: Target,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl Session {
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Credentialed request against the panel API, declaring a JSON body.
    pub fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        self.request_as(method, url, "application/json")
    }

    /// Credentialed request whose body is sent as `content_type`.
    pub fn request_as(
        &self,
        method: Method,
        url: &str,
        content_type: &'static str,
    ) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTHORIZATION, self.target.authorization())
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, content_type)
            .timeout(self.request_timeout)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Credentialed request carrying a JSON body.
    pub fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: &T,
    ) -> reqwest::RequestBuilder {
        self.request(method, url).json(body)
    }

    /// Multipart POST to a node-issued upload URL.
    ///
    /// The URL is already signed by the panel, so no credential is attached.
    pub fn upload(
        &self,
        url: url::Url,
        content_type: &str,
        body: reqwest::Body,
    ) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .timeout(self.upload_timeout)
            .body(body)
    }

    /// Sends the request and collects the whole reply.
    pub async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Reply, RelayError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        tracing::debug!(status = %status, bytes = body.len(), "backend replied");
        Ok(Reply { status, body })
    }
}

/// A complete backend reply.
#[derive(Debug)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Bytes,
}

impl Reply {
    /// Passes the reply through when its status is a success for `expect`, otherwise
    /// turns it into a backend error.
    pub fn success(self, expect: Expect) -> Result<Self, RelayError> {
        match expect.accepts(self.status) {
            true => Ok(self),
            false => Err(RelayError::backend(self.status, &self.body)),
        }
    }

    /// Fails with [`RelayError::ProtectionDetected`] when a failed reply is an
    /// anti-bot interstitial rather than a panel answer.
    pub fn reject_challenge(self) -> Result<Self, RelayError> {
        if self.status.is_success() {
            return Ok(self);
        }

        let text = String::from_utf8_lossy(&self.body);
        match CHALLENGE_MARKERS.iter().any(|marker| text.contains(marker)) {
            true => Err(RelayError::ProtectionDetected),
            false => Ok(self),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.status == StatusCode::NO_CONTENT || self.body.is_empty()
    }

    pub fn json(&self) -> Result<Value, RelayError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

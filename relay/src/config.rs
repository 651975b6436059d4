use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Browser user agent presented to the panel; its edge rejects non-browser clients.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Uploads may approach this size, so it is also the default inbound body limit.
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Timeout `{0}` must be greater than 0")]
    InvalidTimeout(&'static str),

    #[error("max_body_bytes must be greater than 0")]
    InvalidBodyLimit,

    #[error("Admin listener cannot share the main listener address {0}")]
    ListenerConflict(String),
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for browser-facing requests
    #[serde(default)]
    pub listener: Listener,
    /// Optional listener for `/health` and `/ready`
    #[serde(default)]
    pub admin_listener: Option<Listener>,
    /// Outbound client settings used for every backend call
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Upper bound for inbound request bodies, uploads included
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Directory holding the single-page UI
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: None,
            upstream: UpstreamConfig::default(),
            max_body_bytes: default_max_body_bytes(),
            static_dir: default_static_dir(),
        }
    }
}

impl Config {
    /// Validates the gateway configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;

        if let Some(admin) = &self.admin_listener {
            admin.validate()?;
            if admin == &self.listener {
                return Err(ValidationError::ListenerConflict(format!(
                    "{}:{}",
                    admin.host, admin.port
                )));
            }
        }

        self.upstream.validate()?;

        if self.max_body_bytes == 0 {
            return Err(ValidationError::InvalidBodyLimit);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

impl Listener {
    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Outbound client configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Budget for a whole backend call, body included
    pub request_timeout_secs: u64,
    /// Budget for relaying a multipart upload
    pub upload_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            request_timeout_secs: 30,
            upload_timeout_secs: 3600,
            connect_timeout_secs: 10,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let timeouts = [
            ("request_timeout_secs", self.request_timeout_secs),
            ("upload_timeout_secs", self.upload_timeout_secs),
            ("connect_timeout_secs", self.connect_timeout_secs),
        ];
        for (name, value) in timeouts {
            if value == 0 {
                return Err(ValidationError::InvalidTimeout(name));
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("./static")
}

//! Client configuration
//!
//! A [`ClientConfig`] can be built in code, read from `AGENTDESK_*`
//! environment variables, or loaded from a file (any format the `config`
//! crate detects from the extension) with the environment layered on top.
//!
//! ```rust
//! use agentdesk_client_core::ClientConfig;
//!
//! let config = ClientConfig::new("https://api.example.com", "api-key")
//!     .with_client_credentials("desktop", "s3cret")
//!     .with_user("agent1", "password")
//!     .with_initialization_timeout_secs(30);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.workspace_url(), "https://api.example.com/workspace/v3");
//! ```

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use url::Url;

use agentdesk_auth_core::Credentials;

use crate::error::{ClientError, ClientResult};

/// Prefix of environment variables read by [`ClientConfig::from_env`]
pub const ENV_PREFIX: &str = "AGENTDESK";

/// Path of the workspace API below the base URL
pub const WORKSPACE_PATH: &str = "/workspace/v3";

#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the API gateway, e.g. `https://api.example.com`
    pub base_url: String,
    /// Base URL of the authorization server; defaults to `base_url`
    #[serde(default)]
    pub auth_base_url: Option<String>,
    pub api_key: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Timeout of ordinary requests. Long polls get the server's hold time on top.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long to wait for the backend to finish initialization.
    /// Unset means wait as long as it takes.
    #[serde(default)]
    pub initialization_timeout_secs: Option<u64>,
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_event_channel_capacity() -> usize {
    256
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            auth_base_url: None,
            api_key: api_key.into(),
            client_id: String::new(),
            client_secret: String::new(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout_secs(),
            initialization_timeout_secs: None,
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    pub fn with_auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.auth_base_url = Some(url.into());
        self
    }

    pub fn with_client_credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_initialization_timeout_secs(mut self, secs: u64) -> Self {
        self.initialization_timeout_secs = Some(secs);
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn workspace_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), WORKSPACE_PATH)
    }

    pub fn auth_url(&self) -> &str {
        self.auth_base_url.as_deref().unwrap_or(&self.base_url)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn initialization_timeout(&self) -> Option<Duration> {
        self.initialization_timeout_secs.map(Duration::from_secs)
    }

    pub fn credentials(&self) -> Credentials {
        Credentials::new(
            self.api_key.clone(),
            self.client_id.clone(),
            self.client_secret.clone(),
            self.username.clone(),
            self.password.clone(),
        )
    }

    /// Check the settings needed to build a client.
    ///
    /// Login credentials are not required here; they are only needed by
    /// `initialize()`, not by `initialize_with_token()`.
    pub fn validate(&self) -> ClientResult<()> {
        validate_url("base_url", &self.base_url)?;
        if let Some(auth) = &self.auth_base_url {
            validate_url("auth_base_url", auth)?;
        }
        if self.api_key.trim().is_empty() {
            return Err(ClientError::invalid_configuration("api_key", "must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(ClientError::invalid_configuration("request_timeout_secs", "must be positive"));
        }
        if self.initialization_timeout_secs == Some(0) {
            return Err(ClientError::invalid_configuration(
                "initialization_timeout_secs",
                "must be positive when set",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ClientError::invalid_configuration("event_channel_capacity", "must be positive"));
        }
        Ok(())
    }

    /// Check that the password grant has everything it needs
    pub fn validate_credentials(&self) -> ClientResult<()> {
        for (field, value) in [
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("username", &self.username),
            ("password", &self.password),
        ] {
            if value.is_empty() {
                return Err(ClientError::invalid_configuration(field, "required for login"));
            }
        }
        Ok(())
    }

    /// Read `AGENTDESK_BASE_URL`, `AGENTDESK_API_KEY` and friends.
    pub fn from_env() -> ClientResult<Self> {
        let settings = Config::builder()
            .add_source(env_source())
            .build()
            .map_err(config_error)?;
        let config: Self = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file, with `AGENTDESK_*` variables overriding it.
    pub fn from_file(path: impl AsRef<Path>) -> ClientResult<Self> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(env_source())
            .build()
            .map_err(config_error)?;
        let config: Self = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX).try_parsing(true)
}

fn config_error(err: config::ConfigError) -> ClientError {
    ClientError::invalid_configuration("config", err.to_string())
}

fn validate_url(field: &str, value: &str) -> ClientResult<()> {
    let url = Url::parse(value).map_err(|e| ClientError::invalid_configuration(field, e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::invalid_configuration(
            field,
            format!("unsupported scheme {}", url.scheme()),
        ));
    }
    Ok(())
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("auth_base_url", &self.auth_base_url)
            .field("api_key", &"<redacted>")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("initialization_timeout_secs", &self.initialization_timeout_secs)
            .field("event_channel_capacity", &self.event_channel_capacity)
            .finish()
    }
}

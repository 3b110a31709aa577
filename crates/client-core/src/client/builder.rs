//! Builder for [`Client`]
//!
//! ```rust
//! use agentdesk_client_core::ClientBuilder;
//!
//! let client = ClientBuilder::new("https://api.example.com", "api-key")
//!     .client_credentials("desktop", "secret")
//!     .user("agent1", "password")
//!     .initialization_timeout_secs(60)
//!     .build()
//!     .unwrap();
//!
//! assert!(!client.is_initialized());
//! ```

use std::sync::Arc;

use agentdesk_auth_core::{PasswordGrantClient, TokenProvider};

use super::config::ClientConfig;
use super::Client;
use crate::error::ClientResult;

/// Assembles a [`Client`] from configuration and an optional token source.
///
/// Without an explicit [`TokenProvider`] the client performs a password grant
/// against the configured auth URL.
pub struct ClientBuilder {
    config: ClientConfig,
    token_provider: Option<Arc<dyn TokenProvider>>,
}

impl ClientBuilder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::from_config(ClientConfig::new(base_url, api_key))
    }

    /// Start from a loaded configuration, e.g. [`ClientConfig::from_file`]
    pub fn from_config(config: ClientConfig) -> Self {
        Self {
            config,
            token_provider: None,
        }
    }

    pub fn auth_base_url(mut self, url: impl Into<String>) -> Self {
        self.config = self.config.with_auth_base_url(url);
        self
    }

    pub fn client_credentials(mut self, client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        self.config = self.config.with_client_credentials(client_id, client_secret);
        self
    }

    pub fn user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config = self.config.with_user(username, password);
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config = self.config.with_request_timeout_secs(secs);
        self
    }

    pub fn initialization_timeout_secs(mut self, secs: u64) -> Self {
        self.config = self.config.with_initialization_timeout_secs(secs);
        self
    }

    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.config = self.config.with_event_channel_capacity(capacity);
        self
    }

    /// Use a custom token source instead of the password grant
    pub fn token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    pub fn build(self) -> ClientResult<Arc<Client>> {
        self.config.validate()?;

        let provider: Arc<dyn TokenProvider> = match self.token_provider {
            Some(provider) => provider,
            None => Arc::new(PasswordGrantClient::with_timeout(
                self.config.auth_url(),
                self.config.request_timeout(),
            )?),
        };

        Client::new(self.config, provider)
    }
}

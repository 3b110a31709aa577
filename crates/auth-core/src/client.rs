//! Password-grant token client

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AuthError, Result};
use crate::types::{AccessToken, Credentials};

/// Path of the token endpoint relative to the auth base URL
pub const TOKEN_PATH: &str = "/auth/v3/oauth/token";

/// Header carrying the API key on every request
pub const API_KEY_HEADER: &str = "x-api-key";

/// Source of access tokens.
///
/// The lifecycle controller only depends on this trait, so callers can plug
/// in a cached or externally obtained token.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange the credentials for an access token. Exactly one attempt.
    async fn acquire_token(&self, credentials: &Credentials) -> Result<AccessToken>;
}

/// `TokenProvider` that performs an OAuth2 password grant.
#[derive(Debug, Clone)]
pub struct PasswordGrantClient {
    http: reqwest::Client,
    token_url: String,
}

impl PasswordGrantClient {
    pub fn new(auth_base_url: &str) -> Result<Self> {
        Self::with_timeout(auth_base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(auth_base_url: &str, timeout: Duration) -> Result<Self> {
        let parsed = Url::parse(auth_base_url)
            .map_err(|e| AuthError::ConfigError(format!("invalid auth base url {}: {}", auth_base_url, e)))?;
        if parsed.cannot_be_a_base() {
            return Err(AuthError::ConfigError(format!("auth base url {} cannot be a base", auth_base_url)));
        }

        // Redirects from the token endpoint are reported as failures.
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            http,
            token_url: format!("{}{}", auth_base_url.trim_end_matches('/'), TOKEN_PATH),
        })
    }

    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    fn basic_authorization(credentials: &Credentials) -> String {
        let pair = format!("{}:{}", credentials.client_id, credentials.client_secret);
        format!("Basic {}", STANDARD.encode(pair.as_bytes()))
    }
}

#[async_trait]
impl TokenProvider for PasswordGrantClient {
    async fn acquire_token(&self, credentials: &Credentials) -> Result<AccessToken> {
        debug!(url = %self.token_url, username = %credentials.username, "Requesting access token");

        let form = [
            ("grant_type", "password"),
            ("scope", "*"),
            ("client_id", credentials.client_id.as_str()),
            ("username", credentials.username.as_str()),
            ("password", credentials.password.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .header(AUTHORIZATION, Self::basic_authorization(credentials))
            .header(API_KEY_HEADER, &credentials.api_key)
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            warn!(status = status.as_u16(), "Token request rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        match value.get("access_token").and_then(|v| v.as_str()) {
            Some(token) if !token.is_empty() => {}
            _ => return Err(AuthError::MissingToken),
        }

        let token: AccessToken = serde_json::from_value(value)
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        info!(token = %token.redacted(), expires_in = ?token.expires_in, "Access token acquired");
        Ok(token)
    }
}

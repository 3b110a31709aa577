//! HTTP plumbing shared by every workspace request
//!
//! Holds the API key and, once the session is open, the sticky session
//! cookie. Every request built here carries both.

use parking_lot::RwLock;
use reqwest::header::COOKIE;
use reqwest::Method;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use agentdesk_auth_core::client::API_KEY_HEADER;

use crate::error::{ClientError, ClientResult};

/// Status codes carried in `{"status":{"code":N}}` bodies
pub struct StatusCode;

impl StatusCode {
    /// Request completed synchronously
    pub const OK: i64 = 0;
    /// Request accepted; the outcome arrives as a notification
    pub const ASYNC_OK: i64 = 1;
}

/// Envelope returned by workspace operations
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub status: ApiStatus,
    #[serde(default)]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiStatus {
    /// Missing codes read as -1 so they never match a success sentinel
    #[serde(default = "missing_code")]
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
}

fn missing_code() -> i64 {
    -1
}

impl Default for ApiStatus {
    fn default() -> Self {
        Self {
            code: missing_code(),
            message: None,
        }
    }
}

pub struct WorkspaceTransport {
    http: reqwest::Client,
    workspace_url: String,
    api_key: String,
    request_timeout: Duration,
    session_cookie: RwLock<Option<String>>,
}

impl WorkspaceTransport {
    pub fn new(workspace_url: &str, api_key: &str, request_timeout: Duration) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ClientError::internal_error(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            workspace_url: workspace_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            request_timeout,
            session_cookie: RwLock::new(None),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.workspace_url, path.trim_start_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn set_session_cookie(&self, cookie: Option<String>) {
        *self.session_cookie.write() = cookie;
    }

    pub fn session_cookie(&self) -> Option<String> {
        self.session_cookie.read().clone()
    }

    /// Request with the API key and session cookie attached.
    ///
    /// Uses the configured request timeout; callers that long-poll override it.
    pub fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self
            .http
            .request(method, self.url(path))
            .timeout(self.request_timeout)
            .header(API_KEY_HEADER, &self.api_key);

        if let Some(cookie) = self.session_cookie.read().as_ref() {
            builder = builder.header(COOKIE, cookie);
        }
        builder
    }

    /// POST a workspace operation and check the returned status code.
    pub async fn post_operation(
        &self,
        operation: &str,
        path: &str,
        body: &Value,
        success_code: i64,
    ) -> ClientResult<ApiResponse> {
        debug!(operation, path, "Sending workspace request");

        let response = self.request(Method::POST, path).json(body).send().await?;
        let http_status = response.status();
        let text = response.text().await?;

        let parsed: ApiResponse = match serde_json::from_str(&text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(operation, http_status = http_status.as_u16(), error = %e, "Unparseable workspace response");
                return Err(ClientError::OperationError {
                    operation: operation.to_string(),
                    code: -1,
                    message: Some(format!("HTTP {}: unparseable response", http_status.as_u16())),
                });
            }
        };

        if parsed.status.code != success_code {
            warn!(operation, code = parsed.status.code, "Workspace request refused");
            return Err(ClientError::OperationError {
                operation: operation.to_string(),
                code: parsed.status.code,
                message: parsed.status.message.clone(),
            });
        }

        Ok(parsed)
    }
}

impl std::fmt::Debug for WorkspaceTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceTransport")
            .field("workspace_url", &self.workspace_url)
            .field("has_session_cookie", &self.session_cookie.read().is_some())
            .finish()
    }
}

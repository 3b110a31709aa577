//! Application session against the workspace backend
//!
//! Opening the session yields the sticky `WORKSPACE_SESSIONID` cookie that the
//! backend uses to route every later request of this agent to the same node.

use reqwest::header::{HeaderMap, AUTHORIZATION, SET_COOKIE};
use reqwest::Method;
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use agentdesk_auth_core::AccessToken;

use crate::error::{ClientError, ClientResult};
use crate::transport::{StatusCode, WorkspaceTransport};

/// Name of the sticky session cookie
pub const SESSION_COOKIE_NAME: &str = "WORKSPACE_SESSIONID";

/// Initialization status of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    Uninitialized,
    /// From the start of `initialize()` until the channel handshake succeeds
    Handshaking,
    Active,
    Failed,
    /// Entered by `destroy()`
    Closed,
}

impl SessionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionStatus::Active)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionStatus::Uninitialized => "uninitialized",
            SessionStatus::Handshaking => "handshaking",
            SessionStatus::Active => "active",
            SessionStatus::Failed => "failed",
            SessionStatus::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Result of opening a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// `name=value` part of the cookie, ready for a `Cookie:` header
    pub cookie: String,
    pub session_id: String,
}

/// Find the session cookie among the `set-cookie` headers
pub fn extract_session_cookie(headers: &HeaderMap) -> Option<SessionHandle> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter(|value| value.trim_start().starts_with(SESSION_COOKIE_NAME))
        .find_map(|value| {
            let pair = value.split(';').next()?.trim();
            let (_, session_id) = pair.split_once('=')?;
            Some(SessionHandle {
                cookie: pair.to_string(),
                session_id: session_id.to_string(),
            })
        })
}

/// Opens and closes the application session
#[derive(Debug, Clone)]
pub struct SessionEstablisher {
    transport: Arc<WorkspaceTransport>,
}

impl SessionEstablisher {
    pub fn new(transport: Arc<WorkspaceTransport>) -> Self {
        Self { transport }
    }

    /// Open the session and install its cookie on the shared transport.
    pub async fn open_session(&self, token: &AccessToken) -> ClientResult<SessionHandle> {
        debug!(token = %token.redacted(), "Opening workspace session");

        let response = self
            .transport
            .request(Method::GET, "initialize-workspace")
            .header(AUTHORIZATION, token.authorization_header())
            .send()
            .await
            .map_err(|e| ClientError::session_error(format!("initialize-workspace request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "initialize-workspace rejected");
            return Err(ClientError::session_error(format!(
                "initialize-workspace returned HTTP {}",
                status.as_u16()
            )));
        }

        let handle = extract_session_cookie(response.headers())
            .ok_or_else(|| ClientError::session_error("missing session identifier"))?;

        self.transport.set_session_cookie(Some(handle.cookie.clone()));
        info!(session_id = %handle.session_id, "Workspace session opened");
        Ok(handle)
    }

    /// Close the session on the server. The local cookie is cleared either way.
    pub async fn logout(&self) -> ClientResult<()> {
        let result = self
            .transport
            .request(Method::POST, "logout")
            .send()
            .await
            .map_err(ClientError::from)
            .and_then(|response| {
                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(ClientError::session_error(format!(
                        "logout returned HTTP {}",
                        response.status().as_u16()
                    )))
                }
            });

        self.transport.set_session_cookie(None);
        match &result {
            Ok(()) => info!("Workspace session closed"),
            Err(e) => warn!(error = %e, "Logout failed"),
        }
        result
    }

    /// Attach the agent's DN to this session.
    pub async fn activate_channels(&self, agent_id: &str, dn: &str) -> ClientResult<()> {
        let body = json!({ "data": { "agentId": agent_id, "dn": dn } });
        self.transport
            .post_operation("activateChannels", "activate-channels", &body, StatusCode::OK)
            .await?;
        info!(agent_id, dn, "Channels activated");
        Ok(())
    }

    pub fn has_session(&self) -> bool {
        self.transport.session_cookie().is_some()
    }
}

//! Error types and handling for the client-core library
//!
//! Errors are grouped so callers can pick a recovery strategy:
//!
//! - **Bring-up errors** - `Auth`, `SessionError`, `HandshakeError`. Raised
//!   synchronously by `Client::initialize()`; nothing is left subscribed.
//! - **Initialization outcome** - `InitializationFailed`,
//!   `InitializationTimeout`, `SessionClosed`. Only delivered through the
//!   pending initialization handle.
//! - **Operation errors** - `OperationError` (non-success status code) and
//!   `NotInitialized` (session not active yet).
//!
//! Problems while handling pushed messages never show up here: they are
//! logged and the stream keeps flowing.
//!
//! ```rust,no_run
//! # use agentdesk_client_core::{Client, ClientError};
//! # async fn example(client: std::sync::Arc<Client>) {
//! match client.voice().answer("call-1").await {
//!     Ok(()) => {}
//!     Err(ClientError::OperationError { operation, code, .. }) => {
//!         eprintln!("{} refused by server with code {}", operation, code);
//!     }
//!     Err(e) => tracing::error!(error = %e, category = e.category(), "answer failed"),
//! }
//! # }
//! ```

use std::time::Duration;
use thiserror::Error;

use agentdesk_auth_core::AuthError;

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// Credential exchange failed
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// Application session could not be opened
    #[error("Session could not be established: {reason}")]
    SessionError { reason: String },

    /// Notification channel handshake was rejected or could not be sent
    #[error("Notification channel handshake failed: {reason}")]
    HandshakeError { reason: String },

    /// The backend reported that initialization failed
    #[error("Initialization failed: {reason}")]
    InitializationFailed { reason: String },

    #[error("Initialization did not complete within {timeout:?}")]
    InitializationTimeout { timeout: Duration },

    #[error("Session closed before initialization completed")]
    SessionClosed,

    /// A call-control request returned something other than the success code
    #[error("{operation} failed with code: {code}")]
    OperationError {
        operation: String,
        code: i64,
        message: Option<String>,
    },

    #[error("Cannot {operation}: session is not active")]
    NotInitialized { operation: String },

    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ClientError {
    pub fn session_error(reason: impl Into<String>) -> Self {
        Self::SessionError { reason: reason.into() }
    }

    pub fn handshake_error(reason: impl Into<String>) -> Self {
        Self::HandshakeError { reason: reason.into() }
    }

    pub fn network_error(reason: impl Into<String>) -> Self {
        Self::NetworkError { reason: reason.into() }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    pub fn not_initialized(operation: impl Into<String>) -> Self {
        Self::NotInitialized { operation: operation.into() }
    }

    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Check if retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::NetworkError { .. } | ClientError::InitializationTimeout { .. } => true,
            ClientError::Auth(AuthError::NetworkError(_)) => true,
            _ => false,
        }
    }

    /// Check if error indicates an authentication issue
    pub fn is_auth_error(&self) -> bool {
        matches!(self, ClientError::Auth(_))
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::Auth(_) => "auth",

            ClientError::SessionError { .. }
            | ClientError::SessionClosed
            | ClientError::NotInitialized { .. }
            | ClientError::InvalidState { .. } => "session",

            ClientError::HandshakeError { .. } | ClientError::NetworkError { .. } => "transport",

            ClientError::InitializationFailed { .. } | ClientError::InitializationTimeout { .. } => {
                "initialization"
            }

            ClientError::OperationError { .. } | ClientError::InvalidArgument { .. } => "operation",

            ClientError::InvalidConfiguration { .. } => "configuration",

            ClientError::InternalError { .. } => "system",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::NetworkError {
            reason: err.to_string(),
        }
    }
}

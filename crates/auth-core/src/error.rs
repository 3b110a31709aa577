//! Error types for credential exchange

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Token request rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Token response did not contain an access token")]
    MissingToken,

    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl AuthError {
    /// Whether the server looked at the credentials and refused them
    pub fn is_credentials_rejected(&self) -> bool {
        matches!(self, AuthError::Rejected { status, .. } if *status == 400 || *status == 401)
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(err: reqwest::Error) -> Self {
        AuthError::NetworkError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;

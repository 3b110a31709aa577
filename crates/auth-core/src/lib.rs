//! # Auth-Core - Credential exchange for the agent desktop API
//!
//! This crate turns an API key, OAuth2 client credentials and an agent's
//! username/password into a bearer access token using the password grant.
//!
//! A single request is made per call; retrying the whole sign-in sequence is
//! left to the caller.
//!
//! ```rust,no_run
//! use agentdesk_auth_core::{Credentials, PasswordGrantClient, TokenProvider};
//!
//! # async fn example() -> agentdesk_auth_core::Result<()> {
//! let provider = PasswordGrantClient::new("https://api.example.com")?;
//! let credentials = Credentials::new("api-key", "client-id", "secret", "agent1", "pass");
//! let token = provider.acquire_token(&credentials).await?;
//! println!("token type: {:?}", token.token_type);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod types;

pub use client::{PasswordGrantClient, TokenProvider, TOKEN_PATH};
pub use error::{AuthError, Result};
pub use types::{AccessToken, Credentials};

//! # Client-Core - Agent desktop session engine
//!
//! Keeps a local view of an agent's phone line (DN) and calls in sync with a
//! contact-center backend. State is never guessed locally: it is derived from
//! notifications the server pushes over a Bayeux long-polling channel.
//!
//! ## Overview
//!
//! - **Credential exchange** - password grant via [`agentdesk_auth_core`]
//! - **Session** - opens the workspace session and keeps its sticky cookie
//! - **Notification channel** - handshake, subscribe, long-poll
//! - **State synchronizer** - applies `DnStateChanged` / `CallStateChanged`
//!   and initialization messages, publishes [`ClientEvent`]s
//! - **Lifecycle** - [`Client::initialize`] and [`Client::destroy`]
//! - **Call control** - [`VoiceApi`], one request per operation
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use agentdesk_client_core::{ClientBuilder, ClientEvent, EventFilter};
//!
//! # async fn example() -> agentdesk_client_core::ClientResult<()> {
//! let client = ClientBuilder::from_config(agentdesk_client_core::ClientConfig::from_env()?)
//!     .build()?;
//!
//! let mut events = client.subscribe_events(EventFilter::new());
//! let user = client.initialize().await?.await?;
//! tracing::info!(agent_id = ?user.agent_id, "ready");
//!
//! while let Some(event) = events.recv().await {
//!     if let ClientEvent::CallStateChanged { info } = event {
//!         println!("{} -> {}", info.call_id, info.new_state);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod call;
pub mod client;
pub mod dn;
pub mod error;
pub mod events;
pub mod logging;
pub mod messages;
pub mod notifications;
pub mod session;
pub mod sync;
pub mod transport;
pub mod voice;

pub use call::{Call, CallId, CallState};
pub use client::{Client, ClientBuilder, ClientConfig, ClientStats, PendingInitialization, User};
pub use dn::Dn;
pub use error::{ClientError, ClientResult};
pub use events::{CallStatusInfo, ClientEvent, EventErrorInfo, EventFilter, EventKind, EventSubscription};
pub use notifications::{MessageDispatcher, NotificationChannel, PushMessage};
pub use session::{SessionHandle, SessionStatus};
pub use voice::VoiceApi;

pub use agentdesk_auth_core::{AccessToken, AuthError, Credentials, TokenProvider};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

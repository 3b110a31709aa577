//! Lifecycle controller
//!
//! [`Client`] sequences the bring-up of a session and its teardown, and is the
//! only handle applications hold.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────┐
//! │   Client Application    │
//! └───────────┬─────────────┘
//!             │ initialize() / destroy() / get_*()
//! ┌───────────▼─────────────┐
//! │         Client          │ ◄── This Module
//! └─┬─────────┬─────────┬───┘
//!   │         │         │
//!   ▼         ▼         ▼
//! token    session   notification ──► StateSynchronizer ──► events
//! provider  (cookie)   channel          (DN, calls, user)
//! ```
//!
//! # Bring-up
//!
//! `initialize()` acquires a token, opens the session, performs the
//! notification handshake, subscribes and starts polling. Any failure up to
//! and including the handshake is returned right away and leaves nothing
//! behind. Success returns a [`PendingInitialization`] which resolves once
//! the backend reports that the workspace is ready.
//!
//! ```rust,no_run
//! use agentdesk_client_core::{ClientBuilder, ClientResult};
//!
//! # async fn example() -> ClientResult<()> {
//! let client = ClientBuilder::new("https://api.example.com", "api-key")
//!     .client_credentials("desktop", "secret")
//!     .user("agent1", "password")
//!     .build()?;
//!
//! let user = client.initialize().await?.await?;
//! println!("Logged in as {:?}", user.employee_id);
//!
//! for call in client.get_calls() {
//!     println!("{} is {}", call.id, call.state);
//! }
//!
//! client.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod types;

use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use agentdesk_auth_core::{AccessToken, TokenProvider};

use crate::call::Call;
use crate::dn::Dn;
use crate::error::{ClientError, ClientResult};
use crate::events::{EventFilter, EventPublisher, EventSubscription};
use crate::notifications::{MessageDispatcher, NotificationChannel, DEFAULT_SUBSCRIPTIONS};
use crate::session::{SessionEstablisher, SessionStatus};
use crate::sync::{InitializationReceiver, StateSynchronizer};
use crate::transport::WorkspaceTransport;
use crate::voice::VoiceApi;

pub use builder::ClientBuilder;
pub use config::ClientConfig;
pub use types::{ClientStats, User};

pub struct Client {
    config: ClientConfig,
    token_provider: Arc<dyn TokenProvider>,
    transport: Arc<WorkspaceTransport>,
    session: SessionEstablisher,
    synchronizer: Arc<StateSynchronizer>,
    channel: Mutex<Option<Arc<NotificationChannel>>>,
    token: RwLock<Option<AccessToken>>,
    session_id: RwLock<Option<String>>,
    voice: VoiceApi,
}

impl Client {
    pub fn new(config: ClientConfig, token_provider: Arc<dyn TokenProvider>) -> ClientResult<Arc<Self>> {
        config.validate()?;

        let transport = Arc::new(WorkspaceTransport::new(
            &config.workspace_url(),
            &config.api_key,
            config.request_timeout(),
        )?);
        let synchronizer = Arc::new(StateSynchronizer::new(EventPublisher::new(
            config.event_channel_capacity,
        )));

        debug!(workspace_url = %config.workspace_url(), "Client created");

        Ok(Arc::new(Self {
            session: SessionEstablisher::new(transport.clone()),
            voice: VoiceApi::new(transport.clone(), synchronizer.clone()),
            config,
            token_provider,
            transport,
            synchronizer,
            channel: Mutex::new(None),
            token: RwLock::new(None),
            session_id: RwLock::new(None),
        }))
    }

    // ===== LIFECYCLE =====

    /// Log in with the configured credentials and bring the session up.
    ///
    /// Returns once the notification channel is polling. The returned handle
    /// resolves to the [`User`] when the backend finishes initialization.
    pub async fn initialize(&self) -> ClientResult<PendingInitialization> {
        self.config.validate_credentials()?;
        self.release_failed_session().await;
        let receiver = self.synchronizer.begin_session()?;
        info!(username = %self.config.username, "Initializing session");

        let token = match self.token_provider.acquire_token(&self.config.credentials()).await {
            Ok(token) => token,
            Err(e) => return Err(self.abort_bringup(e.into()).await),
        };
        self.establish(token, receiver).await
    }

    /// Same as [`initialize`](Self::initialize) with a token obtained elsewhere.
    pub async fn initialize_with_token(&self, token: AccessToken) -> ClientResult<PendingInitialization> {
        self.release_failed_session().await;
        let receiver = self.synchronizer.begin_session()?;
        info!(token = %token.redacted(), "Initializing session with existing token");
        self.establish(token, receiver).await
    }

    async fn establish(
        &self,
        token: AccessToken,
        receiver: InitializationReceiver,
    ) -> ClientResult<PendingInitialization> {
        match self.bring_up(token).await {
            Ok(()) => Ok(PendingInitialization::new(
                receiver,
                self.config.initialization_timeout(),
            )),
            Err(e) => Err(self.abort_bringup(e).await),
        }
    }

    async fn bring_up(&self, token: AccessToken) -> ClientResult<()> {
        *self.token.write() = Some(token.clone());

        let handle = self.session.open_session(&token).await?;
        *self.session_id.write() = Some(handle.session_id);

        // destroy() may have run while the session request was in flight
        if self.synchronizer.status() != SessionStatus::Handshaking {
            return Err(ClientError::SessionClosed);
        }

        let dispatcher: Arc<dyn MessageDispatcher> = self.synchronizer.clone();
        let channel = Arc::new(NotificationChannel::new(self.transport.clone(), dispatcher));
        *self.channel.lock() = Some(channel.clone());

        channel.handshake().await?;
        if !self
            .synchronizer
            .transition(SessionStatus::Handshaking, SessionStatus::Active)
        {
            return Err(ClientError::SessionClosed);
        }

        if let Err(e) = channel.subscribe(&DEFAULT_SUBSCRIPTIONS).await {
            warn!(error = %e, "Subscribing to notifications failed");
        }
        channel.start();

        info!(session_id = ?self.session_id(), "Session active, waiting for initialization");
        Ok(())
    }

    /// Stop the channel and log out a session the backend reported as failed.
    ///
    /// The poll task of such a session is still running; it must be gone
    /// before a new session shares the synchronizer.
    async fn release_failed_session(&self) {
        if self.synchronizer.status() != SessionStatus::Failed {
            return;
        }

        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            if let Err(e) = channel.disconnect().await {
                warn!(error = %e, "Disconnecting the failed session's channel failed");
            }
        }
        if self.session.has_session() {
            if let Err(e) = self.session.logout().await {
                warn!(error = %e, "Logging out the failed session failed");
            }
        }

        *self.token.write() = None;
        *self.session_id.write() = None;
        debug!("Failed session released");
    }

    /// Undo a partial bring-up and hand the error back.
    async fn abort_bringup(&self, err: ClientError) -> ClientError {
        error!(error = %err, category = err.category(), "Initialization failed");
        self.synchronizer.fail_bringup();

        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            let _ = channel.disconnect().await;
        }
        if self.session.has_session() {
            let _ = self.session.logout().await;
        }

        *self.token.write() = None;
        *self.session_id.write() = None;
        err
    }

    /// Tear the session down.
    ///
    /// Stops the notification channel and logs out. Every step is attempted
    /// even if an earlier one fails, and the first failure is returned. The
    /// client is `Closed` afterwards in any case. Calling it again, or before
    /// `initialize()`, is harmless.
    pub async fn destroy(&self) -> ClientResult<()> {
        let previous = self.synchronizer.status();
        self.synchronizer.close();

        let mut first_error: Option<ClientError> = None;

        let channel = self.channel.lock().take();
        if let Some(channel) = channel {
            if let Err(e) = channel.disconnect().await {
                first_error.get_or_insert(e);
            }
            channel.shutdown().await;
        }

        if self.session.has_session() {
            if let Err(e) = self.session.logout().await {
                first_error.get_or_insert(e);
            }
        }

        *self.token.write() = None;
        *self.session_id.write() = None;

        match first_error {
            Some(e) => {
                warn!(error = %e, previous = %previous, "Client destroyed with errors");
                Err(e)
            }
            None => {
                info!(previous = %previous, "Client destroyed");
                Ok(())
            }
        }
    }

    // ===== ACCESSORS =====

    pub fn status(&self) -> SessionStatus {
        self.synchronizer.status()
    }

    /// True once the session is active and the backend has reported the user
    pub fn is_initialized(&self) -> bool {
        self.status().is_active() && self.synchronizer.user().is_some()
    }

    pub fn get_dn(&self) -> Option<Dn> {
        self.synchronizer.dn()
    }

    pub fn get_calls(&self) -> Vec<Call> {
        self.synchronizer.calls()
    }

    pub fn get_call(&self, call_id: &str) -> Option<Call> {
        self.synchronizer.call(call_id)
    }

    pub fn get_user(&self) -> Option<User> {
        self.synchronizer.user()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.token.read().clone()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call-control operations
    pub fn voice(&self) -> &VoiceApi {
        &self.voice
    }

    pub fn subscribe_events(&self, filter: EventFilter) -> EventSubscription {
        self.synchronizer.subscribe(filter)
    }

    /// Bind the agent's DN to this session
    pub async fn activate_channels(&self, agent_id: &str, dn: &str) -> ClientResult<()> {
        if !self.status().is_active() {
            return Err(ClientError::not_initialized("activateChannels"));
        }
        self.session.activate_channels(agent_id, dn).await
    }

    pub fn get_client_stats(&self) -> ClientStats {
        ClientStats {
            status: self.status(),
            live_calls: self.synchronizer.call_count(),
            dn_known: self.synchronizer.dn().is_some(),
            user_known: self.synchronizer.user().is_some(),
            messages_dispatched: self.synchronizer.messages_dispatched(),
            event_subscribers: self.synchronizer.events().subscriber_count(),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("config", &self.config)
            .field("synchronizer", &self.synchronizer)
            .field("session_id", &self.session_id())
            .finish()
    }
}

/// Outcome of a bring-up that is still waiting for the backend.
///
/// Resolves to the [`User`] on completion, `InitializationFailed` if the
/// backend gives up, `SessionClosed` if the client is destroyed first and,
/// when a timeout is configured, `InitializationTimeout`.
#[derive(Debug)]
pub struct PendingInitialization {
    receiver: InitializationReceiver,
    timeout: Option<Duration>,
}

impl PendingInitialization {
    fn new(receiver: InitializationReceiver, timeout: Option<Duration>) -> Self {
        Self { receiver, timeout }
    }

    pub async fn wait(self) -> ClientResult<User> {
        let outcome = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, self.receiver).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(?timeout, "Initialization did not complete in time");
                    return Err(ClientError::InitializationTimeout { timeout });
                }
            },
            None => self.receiver.await,
        };

        outcome.map_err(|_| ClientError::SessionClosed)?
    }
}

impl IntoFuture for PendingInitialization {
    type Output = ClientResult<User>;
    type IntoFuture = BoxFuture<'static, ClientResult<User>>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait().boxed()
    }
}

//! Server-pushed notification channel
//!
//! A Bayeux long-polling client rooted at `{workspace}/notifications`. The
//! channel goes through three phases:
//!
//! 1. **Handshake** - obtain a `clientId`; failure leaves the channel inert.
//! 2. **Subscribe** - the initialization and voice channels, in one batch.
//! 3. **Poll** - a background task keeps a `/meta/connect` open and hands
//!    every data message to the registered [`MessageDispatcher`] in arrival
//!    order.
//!
//! The poll task is bound to a [`CancellationToken`]; [`NotificationChannel::disconnect`]
//! cancels it, joins it and says goodbye to the server. There is no reconnect:
//! a failed poll ends the channel and reports the connection as lost.

pub mod bayeux;

use parking_lot::{Mutex, RwLock};
use reqwest::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::transport::WorkspaceTransport;

pub use bayeux::{Advice, BayeuxMessage, PushMessage, INITIALIZATION_CHANNEL, VOICE_CHANNEL};
use bayeux::{META_CONNECT, META_HANDSHAKE, META_SUBSCRIBE};

/// Channels every session subscribes to
pub const DEFAULT_SUBSCRIPTIONS: [&str; 2] = [INITIALIZATION_CHANNEL, VOICE_CHANNEL];

/// Receives the data messages of the notification channel.
///
/// Called from the poll task; implementations must not block.
pub trait MessageDispatcher: Send + Sync {
    fn dispatch(&self, message: &PushMessage);

    /// Notified when polling starts and when it stops for good
    fn connection_state_changed(&self, _connected: bool, _reason: Option<String>) {}
}

pub struct NotificationChannel {
    transport: Arc<WorkspaceTransport>,
    dispatcher: Arc<dyn MessageDispatcher>,
    client_id: RwLock<Option<String>>,
    advice: RwLock<Advice>,
    next_id: AtomicU64,
    cancel: CancellationToken,
    poll_task: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationChannel {
    pub fn new(transport: Arc<WorkspaceTransport>, dispatcher: Arc<dyn MessageDispatcher>) -> Self {
        Self {
            transport,
            dispatcher,
            client_id: RwLock::new(None),
            advice: RwLock::new(Advice::default()),
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
            poll_task: Mutex::new(None),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn client_id(&self) -> Option<String> {
        self.client_id.read().clone()
    }

    pub fn is_handshaken(&self) -> bool {
        self.client_id.read().is_some()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Perform the handshake. Cancelled by [`disconnect`](Self::disconnect).
    pub async fn handshake(&self) -> ClientResult<String> {
        let message = BayeuxMessage::handshake(self.next_id());
        debug!("Starting notification handshake");

        let messages = [message];
        let replies = tokio::select! {
            _ = self.cancel.cancelled() => {
                return Err(ClientError::handshake_error("cancelled"));
            }
            replies = self.post(&messages, self.transport.request_timeout()) => replies,
        };
        let replies = replies.map_err(|e| ClientError::handshake_error(e.to_string()))?;

        let ack = replies
            .into_iter()
            .find(|m| m.channel == META_HANDSHAKE)
            .ok_or_else(|| ClientError::handshake_error("no handshake reply"))?;

        if !ack.is_successful() {
            let reason = ack.error.unwrap_or_else(|| "handshake refused".to_string());
            warn!(reason = %reason, "Notification handshake failed");
            return Err(ClientError::handshake_error(reason));
        }

        let client_id = ack
            .client_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::handshake_error("handshake reply without clientId"))?;

        if let Some(advice) = ack.advice {
            self.merge_advice(advice);
        }
        *self.client_id.write() = Some(client_id.clone());
        info!(client_id = %client_id, "Notification handshake successful");
        Ok(client_id)
    }

    /// Subscribe to the given channels in one batch.
    ///
    /// Refused subscriptions are logged only; the server decides what we get.
    pub async fn subscribe(&self, channels: &[&str]) -> ClientResult<()> {
        let client_id = self
            .client_id()
            .ok_or_else(|| ClientError::InvalidState {
                reason: "subscribe before handshake".to_string(),
            })?;

        let batch: Vec<BayeuxMessage> = channels
            .iter()
            .map(|channel| BayeuxMessage::subscribe(self.next_id(), &client_id, channel))
            .collect();

        let replies = self.post(&batch, self.transport.request_timeout()).await?;
        for reply in replies.iter().filter(|m| m.channel == META_SUBSCRIBE) {
            if reply.is_successful() {
                debug!(subscription = ?reply.subscriptions(), "Subscribed");
            } else {
                warn!(
                    subscription = ?reply.subscriptions(),
                    error = ?reply.error,
                    "Subscription refused"
                );
            }
        }
        Ok(())
    }

    /// Spawn the poll task. Does nothing before a successful handshake or
    /// when a task is already running.
    pub fn start(self: &Arc<Self>) {
        if !self.is_handshaken() || self.cancel.is_cancelled() {
            warn!("Not starting poll loop: channel not handshaken or already disconnected");
            return;
        }

        let mut slot = self.poll_task.lock();
        if slot.is_some() {
            return;
        }
        let channel = Arc::clone(self);
        *slot = Some(tokio::spawn(async move { channel.poll_loop().await }));
    }

    async fn poll_loop(self: Arc<Self>) {
        let Some(client_id) = self.client_id() else {
            return;
        };

        info!("Notification poll loop started");
        self.dispatcher.connection_state_changed(true, None);

        let mut first = true;
        loop {
            let advice = self.advice.read().clone();

            let interval = Duration::from_millis(advice.interval.unwrap_or(0));
            if !first && !interval.is_zero() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }
            first = false;

            // The server holds the poll for up to advice.timeout
            let hold = Duration::from_millis(advice.timeout.unwrap_or(0));
            let timeout = hold + self.transport.request_timeout();
            let connect = BayeuxMessage::connect(self.next_id(), &client_id, None);

            let messages = [connect];
            let replies = tokio::select! {
                _ = self.cancel.cancelled() => break,
                replies = self.post(&messages, timeout) => replies,
            };

            let replies = match replies {
                Ok(replies) => replies,
                Err(e) => {
                    self.connection_lost(format!("poll failed: {}", e));
                    return;
                }
            };

            let mut ack = None;
            for message in replies {
                if message.channel == META_CONNECT {
                    ack = Some(message);
                } else if let Some(push) = PushMessage::from_bayeux(message) {
                    self.dispatcher.dispatch(&push);
                }
            }

            match ack {
                Some(ack) if ack.is_successful() => {
                    if let Some(advice) = ack.advice {
                        if advice.forbids_reconnect() {
                            self.connection_lost("server advised not to reconnect".to_string());
                            return;
                        }
                        self.merge_advice(advice);
                    }
                }
                Some(ack) => {
                    let reason = ack.error.unwrap_or_else(|| "connect refused".to_string());
                    self.connection_lost(reason);
                    return;
                }
                None => {
                    self.connection_lost("connect reply without acknowledgement".to_string());
                    return;
                }
            }
        }

        debug!("Notification poll loop cancelled");
    }

    fn connection_lost(&self, reason: String) {
        warn!(reason = %reason, "Notification channel lost");
        self.dispatcher.connection_state_changed(false, Some(reason));
    }

    fn merge_advice(&self, update: Advice) {
        let mut advice = self.advice.write();
        if update.reconnect.is_some() {
            advice.reconnect = update.reconnect;
        }
        if update.interval.is_some() {
            advice.interval = update.interval;
        }
        if update.timeout.is_some() {
            advice.timeout = update.timeout;
        }
    }

    /// Hand one message to the dispatcher as if it had been polled.
    pub fn send_message(&self, message: &PushMessage) {
        self.dispatcher.dispatch(message);
    }

    /// Stop polling and leave the server.
    ///
    /// Safe before, during and after the handshake, and when called again.
    /// The `/meta/disconnect` is only sent once, and only if a handshake
    /// completed; its failure is returned but the channel is closed anyway.
    pub async fn disconnect(&self) -> ClientResult<()> {
        self.cancel.cancel();
        self.shutdown().await;

        let Some(client_id) = self.client_id.write().take() else {
            return Ok(());
        };

        let message = BayeuxMessage::disconnect(self.next_id(), &client_id);
        match self.post(&[message], self.transport.request_timeout()).await {
            Ok(_) => {
                info!(client_id = %client_id, "Notification channel disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Notification disconnect failed");
                Err(e)
            }
        }
    }

    /// Wait for the poll task to finish.
    pub async fn shutdown(&self) {
        let task = self.poll_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Poll task ended abnormally");
            }
        }
    }

    async fn post(&self, messages: &[BayeuxMessage], timeout: Duration) -> ClientResult<Vec<BayeuxMessage>> {
        let segment = messages
            .first()
            .and_then(BayeuxMessage::meta_segment)
            .unwrap_or("connect");

        let response = self
            .transport
            .request(Method::POST, &format!("notifications/{}", segment))
            .timeout(timeout)
            .json(messages)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::network_error(format!(
                "{} returned HTTP {}",
                segment,
                status.as_u16()
            )));
        }

        Ok(response.json::<Vec<BayeuxMessage>>().await?)
    }
}

impl std::fmt::Debug for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationChannel")
            .field("client_id", &self.client_id())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

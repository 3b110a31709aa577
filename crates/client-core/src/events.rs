//! Event types published by the state synchronizer
//!
//! Every change applied from a pushed notification is re-published as a typed
//! [`ClientEvent`] on a broadcast channel. Consumers obtain an
//! [`EventSubscription`] from [`crate::Client::subscribe_events`]; dropping the
//! subscription (or calling [`EventSubscription::cancel`]) detaches it.
//!
//! # Filtering
//!
//! ```rust
//! use agentdesk_client_core::events::{EventFilter, EventKind};
//!
//! // Only call events for one connection
//! let filter = EventFilter::new()
//!     .with_kinds([EventKind::CallStateChanged])
//!     .with_call_ids(["conn-1"]);
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tokio::sync::broadcast;

use crate::call::{Call, CallId, CallState};
use crate::client::types::User;
use crate::dn::Dn;

/// Call state change information
#[derive(Debug, Clone)]
pub struct CallStatusInfo {
    pub call_id: CallId,
    pub new_state: CallState,
    /// `None` when the call was not tracked before this event
    pub previous_state: Option<CallState>,
    /// Set when the server re-keyed the call from another connection id
    pub previous_call_id: Option<CallId>,
    /// Server-side reason for the notification, e.g. `StatusChange`
    pub notification_type: Option<String>,
    /// Call as it looks after the change (for `Released`, the last known shape)
    pub call: Call,
    pub timestamp: DateTime<Utc>,
}

/// Error reported by the backend on the voice channel
#[derive(Debug, Clone)]
pub struct EventErrorInfo {
    pub message: String,
    pub code: Option<String>,
}

/// Events emitted by the client
#[derive(Debug, Clone)]
pub enum ClientEvent {
    CallStateChanged { info: CallStatusInfo },

    DnStateChanged { dn: Dn, timestamp: DateTime<Utc> },

    /// The backend finished initializing the workspace
    InitializationCompleted { user: User },

    InitializationFailed { reason: String },

    /// The backend rejected something asynchronously
    EventError { info: EventErrorInfo },

    /// Notification channel went up or down
    ConnectionStateChanged {
        connected: bool,
        reason: Option<String>,
    },
}

/// Discriminant of [`ClientEvent`], used for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CallStateChanged,
    DnStateChanged,
    InitializationCompleted,
    InitializationFailed,
    EventError,
    ConnectionStateChanged,
}

impl ClientEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::CallStateChanged { .. } => EventKind::CallStateChanged,
            ClientEvent::DnStateChanged { .. } => EventKind::DnStateChanged,
            ClientEvent::InitializationCompleted { .. } => EventKind::InitializationCompleted,
            ClientEvent::InitializationFailed { .. } => EventKind::InitializationFailed,
            ClientEvent::EventError { .. } => EventKind::EventError,
            ClientEvent::ConnectionStateChanged { .. } => EventKind::ConnectionStateChanged,
        }
    }

    /// Call id the event is about, if any
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            ClientEvent::CallStateChanged { info } => Some(&info.call_id),
            _ => None,
        }
    }

    /// Check if this event passes the given filter
    pub fn passes_filter(&self, filter: &EventFilter) -> bool {
        if let Some(kinds) = &filter.kinds {
            if !kinds.contains(&self.kind()) {
                return false;
            }
        }

        if let Some(call_ids) = &filter.call_ids {
            match self.call_id() {
                Some(id) if call_ids.contains(id) => {}
                _ => return false,
            }
        }

        true
    }
}

/// Event filter for selective subscription.
///
/// An empty filter lets everything through. A call id filter drops every
/// event that is not about one of those calls.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub kinds: Option<HashSet<EventKind>>,
    pub call_ids: Option<HashSet<CallId>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kinds(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn with_call_ids<I, S>(mut self, call_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CallId>,
    {
        self.call_ids = Some(call_ids.into_iter().map(Into::into).collect());
        self
    }
}

/// Sending half of the event bus
#[derive(Debug, Clone)]
pub struct EventPublisher {
    tx: broadcast::Sender<ClientEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: ClientEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            filter,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Receiving handle for client events
#[derive(Debug)]
pub struct EventSubscription {
    rx: broadcast::Receiver<ClientEvent>,
    filter: EventFilter,
}

impl EventSubscription {
    /// Next event matching the filter, or `None` once the client is gone.
    ///
    /// A subscriber that falls behind skips the events it missed.
    pub async fn recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.passes_filter(&self.filter) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv)
    pub fn try_recv(&mut self) -> Option<ClientEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.passes_filter(&self.filter) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Detach from the event bus
    pub fn cancel(self) {}
}

//! State synchronizer
//!
//! Derives the DN, the call map and the User purely from pushed
//! notifications. All of it, plus the session status and the one-shot
//! initialization signal, lives behind a single mutex: the poll task is the
//! only writer and accessors clone snapshots under the same lock.
//!
//! Nothing here returns an error to the poll task. A message that cannot be
//! applied is logged and dropped, and the stream keeps flowing.

use chrono::Utc;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, info, trace, warn};

use crate::call::{Call, CallId, CallState};
use crate::client::types::User;
use crate::dn::Dn;
use crate::error::{ClientError, ClientResult};
use crate::events::{CallStatusInfo, ClientEvent, EventErrorInfo, EventFilter, EventPublisher, EventSubscription};
use crate::messages::{
    self, CallPayload, CallStateChangedPayload, DnStateChangedPayload, EventErrorPayload,
    InitializationPayload,
};
use crate::notifications::{MessageDispatcher, PushMessage, INITIALIZATION_CHANNEL, VOICE_CHANNEL};
use crate::session::SessionStatus;

/// Receiving half of the initialization signal
pub type InitializationReceiver = oneshot::Receiver<ClientResult<User>>;

struct SyncState {
    status: SessionStatus,
    dn: Option<Dn>,
    calls: HashMap<CallId, Call>,
    user: Option<User>,
    init_signal: Option<oneshot::Sender<ClientResult<User>>>,
    /// Set by the first completion or failure; later ones are ignored
    initialization_settled: bool,
}

impl SyncState {
    fn new() -> Self {
        Self {
            status: SessionStatus::Uninitialized,
            dn: None,
            calls: HashMap::new(),
            user: None,
            init_signal: None,
            initialization_settled: false,
        }
    }
}

pub struct StateSynchronizer {
    state: Mutex<SyncState>,
    events: EventPublisher,
    messages_dispatched: AtomicU64,
}

impl StateSynchronizer {
    pub fn new(events: EventPublisher) -> Self {
        Self {
            state: Mutex::new(SyncState::new()),
            events,
            messages_dispatched: AtomicU64::new(0),
        }
    }

    // ===== SESSION CONTROL =====

    /// Reset everything for a new session and arm the initialization signal.
    ///
    /// Refused while another session is handshaking or active.
    pub fn begin_session(&self) -> ClientResult<InitializationReceiver> {
        let mut state = self.state.lock();
        if matches!(state.status, SessionStatus::Handshaking | SessionStatus::Active) {
            return Err(ClientError::InvalidState {
                reason: format!("session already {}", state.status),
            });
        }

        let (tx, rx) = oneshot::channel();
        *state = SyncState::new();
        state.status = SessionStatus::Handshaking;
        state.init_signal = Some(tx);
        Ok(rx)
    }

    /// Move from `from` to `to`; returns false if the status was something else.
    pub fn transition(&self, from: SessionStatus, to: SessionStatus) -> bool {
        let mut state = self.state.lock();
        if state.status != from {
            return false;
        }
        debug!(from = %from, to = %to, "Session status changed");
        state.status = to;
        true
    }

    /// Record a failed bring-up step. A closed session stays closed.
    pub fn fail_bringup(&self) {
        let mut state = self.state.lock();
        if state.status != SessionStatus::Closed {
            state.status = SessionStatus::Failed;
        }
        state.init_signal = None;
    }

    /// Mark the session closed. A pending initialization resolves with
    /// `SessionClosed` because its sender is dropped here.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.status = SessionStatus::Closed;
        state.init_signal = None;
    }

    // ===== SNAPSHOTS =====

    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    pub fn dn(&self) -> Option<Dn> {
        self.state.lock().dn.clone()
    }

    /// Live calls, oldest first
    pub fn calls(&self) -> Vec<Call> {
        let state = self.state.lock();
        let mut calls: Vec<Call> = state.calls.values().cloned().collect();
        calls.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        calls
    }

    pub fn call(&self, call_id: &str) -> Option<Call> {
        self.state.lock().calls.get(call_id).cloned()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }

    pub fn user(&self) -> Option<User> {
        self.state.lock().user.clone()
    }

    pub fn messages_dispatched(&self) -> u64 {
        self.messages_dispatched.load(Ordering::Relaxed)
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn subscribe(&self, filter: EventFilter) -> EventSubscription {
        self.events.subscribe(filter)
    }

    // ===== INITIALIZATION CHANNEL =====

    fn handle_initialization(&self, data: &Value) {
        match messages::message_type(data) {
            Some(t) if messages::INITIALIZATION_COMPLETE_TYPES.contains(&t) => {}
            other => {
                debug!(message_type = ?other, "Ignoring initialization message");
                return;
            }
        }

        let Some(payload) = parse::<InitializationPayload>(data, "initialization") else {
            return;
        };

        match payload.state.as_deref() {
            Some("Complete") => {
                let user = match payload.user() {
                    Some(user) => User::from_payload(user),
                    None => {
                        warn!("Initialization completed without a user object");
                        User::default()
                    }
                };
                self.complete_initialization(user);
            }
            Some("Failed") => {
                let reason = payload
                    .error_message
                    .unwrap_or_else(|| "workspace initialization failed".to_string());
                self.fail_initialization(reason);
            }
            other => debug!(state = ?other, "Ignoring initialization progress"),
        }
    }

    fn complete_initialization(&self, user: User) {
        {
            let mut state = self.state.lock();
            if state.initialization_settled {
                debug!("Duplicate initialization completion ignored");
                return;
            }
            state.initialization_settled = true;
            state.user = Some(user.clone());
            if let Some(signal) = state.init_signal.take() {
                let _ = signal.send(Ok(user.clone()));
            }
        }

        info!(
            employee_id = ?user.employee_id,
            agent_id = ?user.agent_id,
            "Workspace initialization complete"
        );
        self.events.publish(ClientEvent::InitializationCompleted { user });
    }

    fn fail_initialization(&self, reason: String) {
        {
            let mut state = self.state.lock();
            if state.initialization_settled {
                debug!("Initialization failure after settlement ignored");
                return;
            }
            state.initialization_settled = true;
            if state.status != SessionStatus::Closed {
                state.status = SessionStatus::Failed;
            }
            if let Some(signal) = state.init_signal.take() {
                let _ = signal.send(Err(ClientError::InitializationFailed {
                    reason: reason.clone(),
                }));
            }
        }

        warn!(reason = %reason, "Workspace initialization failed");
        self.events.publish(ClientEvent::InitializationFailed { reason });
    }

    // ===== VOICE CHANNEL =====

    fn handle_voice(&self, data: &Value) {
        match messages::message_type(data) {
            Some(messages::DN_STATE_CHANGED) => self.handle_dn_state_changed(data),
            Some(messages::CALL_STATE_CHANGED) => self.handle_call_state_changed(data),
            Some(messages::EVENT_ERROR) => self.handle_event_error(data),
            other => debug!(message_type = ?other, "Ignoring voice message"),
        }
    }

    fn handle_dn_state_changed(&self, data: &Value) {
        let Some(payload) = parse::<DnStateChangedPayload>(data, "DnStateChanged") else {
            return;
        };
        let Some(dn_payload) = payload.dn else {
            warn!("DnStateChanged without a dn object");
            return;
        };

        let snapshot = {
            let mut state = self.state.lock();
            match state.dn.as_mut() {
                Some(dn) => dn.apply(&dn_payload),
                None => state.dn = Some(Dn::from_payload(&dn_payload)),
            }
            state.dn.clone()
        };

        if let Some(dn) = snapshot {
            debug!(
                number = ?dn.number,
                agent_state = ?dn.agent_state,
                work_mode = ?dn.work_mode,
                "DN updated"
            );
            self.events.publish(ClientEvent::DnStateChanged {
                dn,
                timestamp: Utc::now(),
            });
        }
    }

    fn handle_call_state_changed(&self, data: &Value) {
        let Some(payload) = parse::<CallStateChangedPayload>(data, "CallStateChanged") else {
            return;
        };
        let Some(call_payload) = payload.call else {
            warn!("CallStateChanged without a call object");
            return;
        };
        let Some(call_id) = call_payload.id.clone().filter(|id| !id.is_empty()) else {
            warn!("CallStateChanged without a call id");
            return;
        };
        let Some(label) = call_payload.state.as_deref() else {
            warn!(call_id = %call_id, "CallStateChanged without a state");
            return;
        };
        let new_state = CallState::parse(label);

        let info = {
            let mut state = self.state.lock();

            let previous_call_id = call_payload
                .previous_conn_id
                .clone()
                .filter(|prev| !prev.is_empty() && *prev != call_id);
            if let Some(prev) = &previous_call_id {
                if let Some(mut call) = state.calls.remove(prev) {
                    match state.calls.get_mut(&call_id) {
                        Some(existing) => {
                            warn!(from = %prev, to = %call_id, "Re-keyed call already tracked, merging");
                            existing.absorb(call);
                        }
                        None => {
                            debug!(from = %prev, to = %call_id, "Call re-keyed");
                            call.id = call_id.clone();
                            state.calls.insert(call_id.clone(), call);
                        }
                    }
                }
            }

            let previous_state = state.calls.get(&call_id).map(|c| c.state.clone());

            let call = if new_state.is_terminated() {
                match state.calls.remove(&call_id) {
                    Some(mut call) => {
                        apply_call_payload(&mut call, &call_payload, new_state.clone());
                        call
                    }
                    None => {
                        debug!(call_id = %call_id, "Released for unknown call ignored");
                        return;
                    }
                }
            } else if new_state.creates_call() {
                let call = state
                    .calls
                    .entry(call_id.clone())
                    .or_insert_with(|| Call::new(call_id.clone(), new_state.clone()));
                apply_call_payload(call, &call_payload, new_state.clone());
                call.clone()
            } else {
                match state.calls.get_mut(&call_id) {
                    Some(call) => {
                        apply_call_payload(call, &call_payload, new_state.clone());
                        call.clone()
                    }
                    None => {
                        warn!(call_id = %call_id, state = %new_state, "State change for unknown call ignored");
                        return;
                    }
                }
            };

            CallStatusInfo {
                call_id: call_id.clone(),
                new_state,
                previous_state,
                previous_call_id,
                notification_type: payload.notification_type,
                call,
                timestamp: Utc::now(),
            }
        };

        info!(
            call_id = %info.call_id,
            state = %info.new_state,
            previous = ?info.previous_state,
            "Call state changed"
        );
        self.events.publish(ClientEvent::CallStateChanged { info });
    }

    fn handle_event_error(&self, data: &Value) {
        let Some(payload) = parse::<EventErrorPayload>(data, "EventError") else {
            return;
        };
        let error = payload.error.unwrap_or_default();
        let info = EventErrorInfo {
            message: error
                .error_message
                .unwrap_or_else(|| "unspecified error".to_string()),
            code: error.error_code.map(|code| match code {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        };

        warn!(message = %info.message, code = ?info.code, "Backend reported an error");
        self.events.publish(ClientEvent::EventError { info });
    }
}

impl MessageDispatcher for StateSynchronizer {
    fn dispatch(&self, message: &PushMessage) {
        self.messages_dispatched.fetch_add(1, Ordering::Relaxed);
        trace!(channel = %message.channel, data = %message.data, "Dispatching message");

        if self.status() == SessionStatus::Closed {
            debug!(channel = %message.channel, "Session closed, message dropped");
            return;
        }

        match message.channel.as_str() {
            INITIALIZATION_CHANNEL => self.handle_initialization(&message.data),
            VOICE_CHANNEL => self.handle_voice(&message.data),
            other => debug!(channel = %other, "Message on unexpected channel ignored"),
        }
    }

    fn connection_state_changed(&self, connected: bool, reason: Option<String>) {
        self.events
            .publish(ClientEvent::ConnectionStateChanged { connected, reason });
    }
}

impl std::fmt::Debug for StateSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("StateSynchronizer")
            .field("status", &state.status)
            .field("calls", &state.calls.len())
            .field("dn_known", &state.dn.is_some())
            .field("user_known", &state.user.is_some())
            .finish()
    }
}

fn parse<T: DeserializeOwned>(data: &Value, what: &str) -> Option<T> {
    match serde_json::from_value(data.clone()) {
        Ok(payload) => Some(payload),
        Err(e) => {
            warn!(message = what, error = %e, "Malformed payload ignored");
            None
        }
    }
}

fn apply_call_payload(call: &mut Call, payload: &CallPayload, state: CallState) {
    call.state = state;
    if let Some(call_type) = &payload.call_type {
        call.call_type = Some(call_type.clone());
    }
    if let Some(parent) = &payload.parent_conn_id {
        call.parent_conn_id = Some(parent.clone());
    }
    if let Some(participants) = payload.participant_numbers() {
        call.participants = participants;
    }
    if let Some(user_data) = &payload.user_data {
        call.user_data = Some(messages::key_value_pairs(user_data));
    }
    call.updated_at = Utc::now();
}

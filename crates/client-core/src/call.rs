//! Call tracking for the agent desktop
//!
//! Calls are never created locally: every [`Call`] is derived from a
//! `CallStateChanged` notification. The state synchronizer owns the map; this
//! module only defines the types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Connection id assigned by the voice backend
pub type CallId = String;

/// Connection state reported by the voice backend
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallState {
    /// Inbound call alerting on the agent's DN
    Ringing,
    /// Outbound call being placed
    Dialing,
    /// Call is connected
    Established,
    /// Call is on hold. The legacy `OnHold` label parses to this too and
    /// is reported back as `Held`.
    Held,
    /// Call has ended; never kept in the call map
    Released,
    /// Any other label the server sends, kept verbatim
    Other(String),
}

impl CallState {
    pub fn parse(label: &str) -> Self {
        match label {
            "Ringing" => CallState::Ringing,
            "Dialing" => CallState::Dialing,
            "Established" => CallState::Established,
            "Held" | "OnHold" => CallState::Held,
            "Released" => CallState::Released,
            other => CallState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CallState::Ringing => "Ringing",
            CallState::Dialing => "Dialing",
            CallState::Established => "Established",
            CallState::Held => "Held",
            CallState::Released => "Released",
            CallState::Other(label) => label,
        }
    }

    /// States that start tracking a call
    pub fn creates_call(&self) -> bool {
        matches!(self, CallState::Ringing | CallState::Dialing)
    }

    /// Check if the call is in a terminated state
    pub fn is_terminated(&self) -> bool {
        matches!(self, CallState::Released)
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live call on the agent's DN
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub id: CallId,
    pub state: CallState,
    /// Inbound, Outbound, Internal, Consult...
    pub call_type: Option<String>,
    /// Parent connection for consult calls (transfer/conference)
    pub parent_conn_id: Option<CallId>,
    pub participants: Vec<String>,
    /// Attached user data, if any was sent
    pub user_data: Option<HashMap<String, Value>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Call {
    pub fn new(id: impl Into<CallId>, state: CallState) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            state,
            call_type: None,
            parent_conn_id: None,
            participants: Vec::new(),
            user_data: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_consult(&self) -> bool {
        self.parent_conn_id.is_some()
    }

    /// Fold an older record of the same connection into this one. Fields
    /// this call already knows win.
    pub(crate) fn absorb(&mut self, older: Call) {
        if self.call_type.is_none() {
            self.call_type = older.call_type;
        }
        if self.parent_conn_id.is_none() {
            self.parent_conn_id = older.parent_conn_id;
        }
        if self.participants.is_empty() {
            self.participants = older.participants;
        }
        if self.user_data.is_none() {
            self.user_data = older.user_data;
        }
        self.created_at = self.created_at.min(older.created_at);
    }
}

//! The agent's DN (phone line) as last reported by the server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::messages::DnPayload;

/// Snapshot of the agent's DN.
///
/// Only exists once a `DnStateChanged` event has been seen; before that the
/// accessors report `None` instead of guessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dn {
    /// Unknown until a payload carries it
    pub number: Option<String>,
    pub agent_id: Option<String>,
    /// Server-defined label, e.g. `Ready`, `NotReady`
    pub agent_state: Option<String>,
    pub work_mode: Option<String>,
    pub forward_to: Option<String>,
    pub dnd: bool,
    pub reasons: Option<HashMap<String, Value>>,
    pub updated_at: DateTime<Utc>,
}

impl Dn {
    pub(crate) fn from_payload(payload: &DnPayload) -> Self {
        let mut dn = Self {
            number: None,
            agent_id: None,
            agent_state: None,
            work_mode: None,
            forward_to: None,
            dnd: false,
            reasons: None,
            updated_at: Utc::now(),
        };
        dn.apply(payload);
        dn
    }

    /// Merge a payload into this DN. Absent fields keep their value.
    pub(crate) fn apply(&mut self, payload: &DnPayload) {
        if let Some(number) = payload.number.as_ref().filter(|n| !n.is_empty()) {
            self.number = Some(number.clone());
        }
        if let Some(agent_id) = &payload.agent_id {
            self.agent_id = Some(agent_id.clone());
        }
        if let Some(agent_state) = &payload.agent_state {
            self.agent_state = Some(agent_state.clone());
        }
        if let Some(work_mode) = payload.work_mode() {
            self.work_mode = Some(work_mode.to_string());
        }
        if let Some(forward_to) = &payload.forward_to {
            // An empty destination means forwarding was cancelled
            self.forward_to = if forward_to.is_empty() {
                None
            } else {
                Some(forward_to.clone())
            };
        }
        if let Some(dnd) = payload.dnd {
            self.dnd = dnd;
        }
        if let Some(reasons) = &payload.reasons {
            self.reasons = Some(crate::messages::key_value_pairs(reasons));
        }
        self.updated_at = Utc::now();
    }

    pub fn is_forwarded(&self) -> bool {
        self.forward_to.is_some()
    }
}

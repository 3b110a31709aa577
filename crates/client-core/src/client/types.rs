//! Type definitions for the client-core library
//!
//! ```rust,no_run
//! # use agentdesk_client_core::{Client, ClientStats};
//! # use std::sync::Arc;
//! # fn example(client: Arc<Client>) {
//! let stats: ClientStats = client.get_client_stats();
//! println!("Status: {:?}, live calls: {}", stats.status, stats.live_calls);
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::messages::UserPayload;
use crate::session::SessionStatus;

/// The agent, as described by the backend when initialization completes.
///
/// Created once per session and never changed afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub employee_id: Option<String>,
    pub agent_id: Option<String>,
    /// Place (desk) the agent logs in to by default
    pub default_place: Option<String>,
    pub user_properties: HashMap<String, Value>,
}

impl User {
    pub(crate) fn from_payload(payload: &UserPayload) -> Self {
        Self {
            employee_id: payload.employee_id.clone(),
            agent_id: payload.agent_id.clone(),
            default_place: payload.default_place.clone(),
            user_properties: payload
                .user_properties
                .as_ref()
                .map(crate::messages::key_value_pairs)
                .unwrap_or_default(),
        }
    }
}

/// Statistics about the client's current state
#[derive(Debug, Clone)]
pub struct ClientStats {
    pub status: SessionStatus,
    /// Calls currently in the call map
    pub live_calls: usize,
    pub dn_known: bool,
    pub user_known: bool,
    /// Pushed messages handed to the state synchronizer so far
    pub messages_dispatched: u64,
    pub event_subscribers: usize,
}

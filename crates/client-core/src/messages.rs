//! Payloads carried in the `data` field of pushed notifications
//!
//! The server is lenient about which fields it sends, so every field is
//! optional here and the state synchronizer decides what is required.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// `messageType` values understood on the initialization channel
pub const INITIALIZATION_COMPLETE_TYPES: [&str; 2] =
    ["WorkspaceInitializationComplete", "InitializationComplete"];

pub const DN_STATE_CHANGED: &str = "DnStateChanged";
pub const CALL_STATE_CHANGED: &str = "CallStateChanged";
pub const EVENT_ERROR: &str = "EventError";

pub fn message_type(data: &Value) -> Option<&str> {
    data.get("messageType").and_then(Value::as_str)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializationPayload {
    pub state: Option<String>,
    pub data: Option<InitializationData>,
    /// Some deployments put the user next to `state` instead of under `data`
    pub user: Option<UserPayload>,
    pub error_message: Option<String>,
}

impl InitializationPayload {
    pub fn user(&self) -> Option<&UserPayload> {
        self.data
            .as_ref()
            .and_then(|d| d.user.as_ref())
            .or(self.user.as_ref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InitializationData {
    pub user: Option<UserPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPayload {
    pub employee_id: Option<String>,
    pub agent_id: Option<String>,
    pub default_place: Option<String>,
    pub user_properties: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DnStateChangedPayload {
    pub dn: Option<DnPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnPayload {
    pub number: Option<String>,
    pub agent_id: Option<String>,
    pub agent_state: Option<String>,
    pub agent_work_mode: Option<String>,
    pub work_mode: Option<String>,
    pub forward_to: Option<String>,
    pub dnd: Option<bool>,
    pub reasons: Option<Value>,
}

impl DnPayload {
    pub fn work_mode(&self) -> Option<&str> {
        self.agent_work_mode
            .as_deref()
            .or(self.work_mode.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStateChangedPayload {
    pub call: Option<CallPayload>,
    pub notification_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallPayload {
    pub id: Option<String>,
    pub state: Option<String>,
    pub call_type: Option<String>,
    pub parent_conn_id: Option<String>,
    /// Set when the server renumbered the connection
    pub previous_conn_id: Option<String>,
    pub participants: Option<Vec<Value>>,
    pub user_data: Option<Value>,
}

impl CallPayload {
    /// Participant numbers; entries are either plain strings or objects
    /// with a `number` field.
    pub fn participant_numbers(&self) -> Option<Vec<String>> {
        self.participants.as_ref().map(|list| {
            list.iter()
                .filter_map(|p| match p {
                    Value::String(s) => Some(s.clone()),
                    Value::Object(obj) => obj
                        .get("number")
                        .or_else(|| obj.get("phoneNumber"))
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventErrorPayload {
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_message: Option<String>,
    pub error_code: Option<Value>,
}

/// Flatten user data into a map.
///
/// Accepts either a plain JSON object or the key/value list form
/// `[{"key": "k", "type": "str", "value": ...}]`.
pub fn key_value_pairs(value: &Value) -> HashMap<String, Value> {
    match value {
        Value::Object(obj) => obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let key = item.get("key")?.as_str()?;
                Some((key.to_string(), item.get("value").cloned().unwrap_or(Value::Null)))
            })
            .collect(),
        _ => HashMap::new(),
    }
}

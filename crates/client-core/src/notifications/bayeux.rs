//! Bayeux message envelope
//!
//! Only the subset of the protocol the workspace backend speaks: long-polling
//! transport, no extensions, no message acknowledgement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BAYEUX_VERSION: &str = "1.0";
pub const LONG_POLLING: &str = "long-polling";

pub const META_HANDSHAKE: &str = "/meta/handshake";
pub const META_SUBSCRIBE: &str = "/meta/subscribe";
pub const META_CONNECT: &str = "/meta/connect";
pub const META_DISCONNECT: &str = "/meta/disconnect";

/// Initialization progress of the workspace
pub const INITIALIZATION_CHANNEL: &str = "/workspace/v3/initialization";
/// DN and call events
pub const VOICE_CHANNEL: &str = "/workspace/v3/voice";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BayeuxMessage {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_connection_types: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_type: Option<String>,
    /// A channel name on requests; servers may echo a string or a list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advice: Option<Advice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl BayeuxMessage {
    pub fn handshake(id: u64) -> Self {
        Self {
            channel: META_HANDSHAKE.to_string(),
            id: Some(id.to_string()),
            version: Some(BAYEUX_VERSION.to_string()),
            minimum_version: Some(BAYEUX_VERSION.to_string()),
            supported_connection_types: Some(vec![LONG_POLLING.to_string()]),
            ..Default::default()
        }
    }

    pub fn subscribe(id: u64, client_id: &str, subscription: &str) -> Self {
        Self {
            channel: META_SUBSCRIBE.to_string(),
            id: Some(id.to_string()),
            client_id: Some(client_id.to_string()),
            subscription: Some(Value::String(subscription.to_string())),
            ..Default::default()
        }
    }

    pub fn connect(id: u64, client_id: &str, advice: Option<Advice>) -> Self {
        Self {
            channel: META_CONNECT.to_string(),
            id: Some(id.to_string()),
            client_id: Some(client_id.to_string()),
            connection_type: Some(LONG_POLLING.to_string()),
            advice,
            ..Default::default()
        }
    }

    pub fn disconnect(id: u64, client_id: &str) -> Self {
        Self {
            channel: META_DISCONNECT.to_string(),
            id: Some(id.to_string()),
            client_id: Some(client_id.to_string()),
            ..Default::default()
        }
    }

    pub fn is_meta(&self) -> bool {
        self.channel.starts_with("/meta/")
    }

    pub fn is_successful(&self) -> bool {
        self.successful == Some(true)
    }

    /// Last segment of a meta channel, used as the URL suffix
    pub fn meta_segment(&self) -> Option<&str> {
        self.channel.strip_prefix("/meta/")
    }

    /// Subscription names carried by a subscribe reply
    pub fn subscriptions(&self) -> Vec<String> {
        match &self.subscription {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Server advice on how to continue polling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advice {
    /// `retry`, `handshake` or `none`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconnect: Option<String>,
    /// Milliseconds to wait between polls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
    /// Milliseconds the server may hold a poll open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Advice {
    /// Advice that tells the client to stop
    pub fn forbids_reconnect(&self) -> bool {
        self.reconnect.as_deref() == Some("none")
    }
}

/// Data message delivered on a subscribed channel
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage {
    pub channel: String,
    pub data: Value,
    pub id: Option<String>,
}

impl PushMessage {
    pub fn new(channel: impl Into<String>, data: Value) -> Self {
        Self {
            channel: channel.into(),
            data,
            id: None,
        }
    }

    /// Data messages of a reply; meta messages and messages without data are skipped.
    pub(crate) fn from_bayeux(message: BayeuxMessage) -> Option<Self> {
        if message.is_meta() {
            return None;
        }
        Some(Self {
            channel: message.channel,
            data: message.data?,
            id: message.id,
        })
    }
}

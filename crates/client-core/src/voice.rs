//! Call-control operations
//!
//! Thin, stateless wrappers over the workspace voice endpoints. Each one sends
//! a single request and checks the status code against `ASYNC_OK`; the actual
//! effect shows up later as a `DnStateChanged` or `CallStateChanged`
//! notification, which is the only way local state changes.
//!
//! ```rust,no_run
//! # use agentdesk_client_core::Client;
//! # use std::sync::Arc;
//! # async fn example(client: Arc<Client>) -> agentdesk_client_core::ClientResult<()> {
//! client.voice().ready().await?;
//! client.voice().make_call("5001").await?;
//! # Ok(())
//! # }
//! ```

use url::Url;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::sync::StateSynchronizer;
use crate::transport::{StatusCode, WorkspaceTransport};

#[derive(Debug, Clone)]
pub struct VoiceApi {
    transport: Arc<WorkspaceTransport>,
    synchronizer: Arc<StateSynchronizer>,
}

impl VoiceApi {
    pub fn new(transport: Arc<WorkspaceTransport>, synchronizer: Arc<StateSynchronizer>) -> Self {
        Self { transport, synchronizer }
    }

    fn ensure_active(&self, operation: &str) -> ClientResult<()> {
        if self.synchronizer.status().is_active() {
            Ok(())
        } else {
            Err(ClientError::not_initialized(operation))
        }
    }

    async fn send(&self, operation: &str, path: &str, data: Map<String, Value>) -> ClientResult<()> {
        self.ensure_active(operation)?;
        debug!(operation, path, "Voice request");
        let body = json!({ "data": Value::Object(data) });
        self.transport
            .post_operation(operation, path, &body, StatusCode::ASYNC_OK)
            .await?;
        Ok(())
    }

    async fn send_for_call(
        &self,
        operation: &str,
        call_id: &str,
        action: &str,
        data: Map<String, Value>,
    ) -> ClientResult<()> {
        require("call_id", call_id)?;
        let path = call_path(call_id, action)?;
        self.send(operation, &path, data).await
    }

    // ===== AGENT STATE =====

    pub async fn ready(&self) -> ClientResult<()> {
        self.send("setAgentReady", "voice/ready", Map::new()).await
    }

    /// Set the agent not ready, optionally with a work mode such as
    /// `AfterCallWork` and a reason code.
    pub async fn not_ready(&self, work_mode: Option<&str>, reason_code: Option<&str>) -> ClientResult<()> {
        let mut data = Map::new();
        if let Some(work_mode) = work_mode {
            require("work_mode", work_mode)?;
            data.insert("agentWorkMode".into(), json!(work_mode));
        }
        if let Some(reason_code) = reason_code {
            data.insert("reasonCode".into(), json!(reason_code));
        }
        self.send("setAgentNotReady", "voice/not-ready", data).await
    }

    pub async fn dnd_on(&self) -> ClientResult<()> {
        self.send("setDndOn", "voice/set-dnd-on", Map::new()).await
    }

    pub async fn dnd_off(&self) -> ClientResult<()> {
        self.send("setDndOff", "voice/set-dnd-off", Map::new()).await
    }

    pub async fn set_forward(&self, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send("setForward", "voice/set-forward", fields([("forwardTo", destination)]))
            .await
    }

    pub async fn cancel_forward(&self) -> ClientResult<()> {
        self.send("cancelForward", "voice/cancel-forward", Map::new()).await
    }

    /// Log the agent in to the voice channel
    pub async fn login(&self) -> ClientResult<()> {
        self.send("loginVoice", "voice/login", Map::new()).await
    }

    pub async fn logout(&self) -> ClientResult<()> {
        self.send("logoutVoice", "voice/logout", Map::new()).await
    }

    // ===== CALLS =====

    pub async fn make_call(&self, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send("makeCall", "voice/make-call", fields([("destination", destination)]))
            .await
    }

    pub async fn answer(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("answerCall", call_id, "answer", Map::new()).await
    }

    pub async fn hold(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("holdCall", call_id, "hold", Map::new()).await
    }

    pub async fn retrieve(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("retrieveCall", call_id, "retrieve", Map::new()).await
    }

    pub async fn release(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("releaseCall", call_id, "release", Map::new()).await
    }

    /// End the call for every party, not just this agent
    pub async fn clear(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("clearCall", call_id, "clear", Map::new()).await
    }

    pub async fn redirect(&self, call_id: &str, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send_for_call("redirectCall", call_id, "redirect", fields([("destination", destination)]))
            .await
    }

    // ===== CONFERENCE AND TRANSFER =====

    /// Start a consult call towards `destination`; completes with
    /// [`complete_conference`](Self::complete_conference).
    pub async fn initiate_conference(&self, call_id: &str, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send_for_call(
            "initiateConference",
            call_id,
            "initiate-conference",
            fields([("destination", destination)]),
        )
        .await
    }

    /// `call_id` is the consult call, `parent_call_id` the original one.
    pub async fn complete_conference(&self, call_id: &str, parent_call_id: &str) -> ClientResult<()> {
        require("parent_call_id", parent_call_id)?;
        self.send_for_call(
            "completeConference",
            call_id,
            "complete-conference",
            fields([("parentConnId", parent_call_id)]),
        )
        .await
    }

    pub async fn delete_from_conference(&self, call_id: &str, dn_to_drop: &str) -> ClientResult<()> {
        require("dn_to_drop", dn_to_drop)?;
        self.send_for_call(
            "deleteFromConference",
            call_id,
            "delete-from-conference",
            fields([("dnToDrop", dn_to_drop)]),
        )
        .await
    }

    pub async fn initiate_transfer(&self, call_id: &str, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send_for_call(
            "initiateTransfer",
            call_id,
            "initiate-transfer",
            fields([("destination", destination)]),
        )
        .await
    }

    pub async fn complete_transfer(&self, call_id: &str, parent_call_id: &str) -> ClientResult<()> {
        require("parent_call_id", parent_call_id)?;
        self.send_for_call(
            "completeTransfer",
            call_id,
            "complete-transfer",
            fields([("parentConnId", parent_call_id)]),
        )
        .await
    }

    pub async fn single_step_transfer(&self, call_id: &str, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send_for_call(
            "singleStepTransfer",
            call_id,
            "single-step-transfer",
            fields([("destination", destination)]),
        )
        .await
    }

    pub async fn single_step_conference(&self, call_id: &str, destination: &str) -> ClientResult<()> {
        require("destination", destination)?;
        self.send_for_call(
            "singleStepConference",
            call_id,
            "single-step-conference",
            fields([("destination", destination)]),
        )
        .await
    }

    /// Switch between an established call and a held one
    pub async fn alternate(&self, call_id: &str, held_call_id: &str) -> ClientResult<()> {
        require("held_call_id", held_call_id)?;
        self.send_for_call("alternateCalls", call_id, "alternate", fields([("heldConnId", held_call_id)]))
            .await
    }

    pub async fn merge(&self, call_id: &str, other_call_id: &str) -> ClientResult<()> {
        require("other_call_id", other_call_id)?;
        self.send_for_call("mergeCalls", call_id, "merge", fields([("otherConnId", other_call_id)]))
            .await
    }

    /// Release `call_id` and retrieve `held_call_id`
    pub async fn reconnect(&self, call_id: &str, held_call_id: &str) -> ClientResult<()> {
        require("held_call_id", held_call_id)?;
        self.send_for_call("reconnectCall", call_id, "reconnect", fields([("heldConnId", held_call_id)]))
            .await
    }

    // ===== USER DATA =====

    pub async fn attach_user_data(&self, call_id: &str, user_data: &HashMap<String, Value>) -> ClientResult<()> {
        let mut data = Map::new();
        data.insert("userData".into(), key_value_list(user_data));
        self.send_for_call("attachUserData", call_id, "attach-user-data", data).await
    }

    pub async fn update_user_data(&self, call_id: &str, user_data: &HashMap<String, Value>) -> ClientResult<()> {
        let mut data = Map::new();
        data.insert("userData".into(), key_value_list(user_data));
        self.send_for_call("updateUserData", call_id, "update-user-data", data).await
    }

    pub async fn delete_user_data_pair(&self, call_id: &str, key: &str) -> ClientResult<()> {
        require("key", key)?;
        self.send_for_call("deleteUserDataPair", call_id, "delete-user-data-pair", fields([("key", key)]))
            .await
    }

    // ===== MISC =====

    pub async fn send_dtmf(&self, call_id: &str, digits: &str) -> ClientResult<()> {
        require("digits", digits)?;
        if !digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '*' | '#' | 'A'..='D'))
        {
            return Err(ClientError::InvalidArgument {
                name: "digits".to_string(),
                reason: format!("'{}' contains characters that are not DTMF tones", digits),
            });
        }
        self.send_for_call("sendDTMF", call_id, "send-dtmf", fields([("dtmfDigits", digits)]))
            .await
    }

    pub async fn start_recording(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("startRecording", call_id, "start-recording", Map::new()).await
    }

    pub async fn pause_recording(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("pauseRecording", call_id, "pause-recording", Map::new()).await
    }

    pub async fn resume_recording(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("resumeRecording", call_id, "resume-recording", Map::new()).await
    }

    pub async fn stop_recording(&self, call_id: &str) -> ClientResult<()> {
        self.send_for_call("stopRecording", call_id, "stop-recording", Map::new()).await
    }
}

fn require(name: &str, value: &str) -> ClientResult<()> {
    if value.trim().is_empty() {
        return Err(ClientError::InvalidArgument {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn fields<const N: usize>(pairs: [(&str, &str); N]) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect()
}

/// Encode user data in the key/value list form the backend expects
pub fn key_value_list(user_data: &HashMap<String, Value>) -> Value {
    let mut keys: Vec<&String> = user_data.keys().collect();
    keys.sort();

    Value::Array(
        keys.into_iter()
            .map(|key| {
                let value = &user_data[key];
                let kind = match value {
                    Value::Number(n) if n.is_i64() || n.is_u64() => "int",
                    Value::Object(_) | Value::Array(_) => "kvlist",
                    _ => "str",
                };
                json!({ "key": key, "type": kind, "value": value })
            })
            .collect(),
    )
}

/// `voice/calls/{id}/{action}` with the id escaped as a single path segment
fn call_path(call_id: &str, action: &str) -> ClientResult<String> {
    let mut url =
        Url::parse("http://workspace/").map_err(|e| ClientError::internal_error(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ClientError::internal_error("base URL cannot carry a path"))?
        .pop_if_empty()
        .extend(["voice", "calls", call_id, action]);
    Ok(url.path().trim_start_matches('/').to_string())
}

//! Call-control requests against the fake backend

mod common;

use agentdesk_client_core::{ClientError, ClientResult};
use common::{resolve, start_backend, FakeBackend, API_KEY, SESSION_COOKIE};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

async fn initialized(backend: &FakeBackend) -> ClientResult<Arc<agentdesk_client_core::Client>> {
    let client = backend.client_builder().build()?;
    let pending = client.initialize().await?;
    backend.push_init_complete("E100");
    resolve(pending).await?;
    Ok(client)
}

#[tokio::test]
async fn test_operations_refused_before_initialize() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;

    assert!(matches!(
        client.voice().answer("C1").await,
        Err(ClientError::NotInitialized { .. })
    ));
    assert!(matches!(
        client.voice().not_ready(Some("AfterCallWork"), None).await,
        Err(ClientError::NotInitialized { .. })
    ));
    assert!(backend.state.requests.lock().is_empty());

    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_requests_carry_session_and_body() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = initialized(&backend).await?;

    client.voice().answer("C1").await?;
    let answered = backend.state.requests_to("calls/C1/answer");
    assert_eq!(answered.len(), 1);
    assert_eq!(answered[0].body, json!({ "data": {} }));
    assert_eq!(answered[0].cookie.as_deref(), Some(SESSION_COOKIE));
    assert_eq!(answered[0].api_key.as_deref(), Some(API_KEY));

    client.voice().make_call("5001").await?;
    assert_eq!(
        backend.state.requests_to("make-call")[0].body,
        json!({ "data": { "destination": "5001" } })
    );

    client.voice().not_ready(Some("AfterCallWork"), Some("12")).await?;
    assert_eq!(
        backend.state.requests_to("not-ready")[0].body,
        json!({ "data": { "agentWorkMode": "AfterCallWork", "reasonCode": "12" } })
    );

    client.voice().complete_transfer("C2", "C1").await?;
    assert_eq!(
        backend.state.requests_to("calls/C2/complete-transfer")[0].body,
        json!({ "data": { "parentConnId": "C1" } })
    );

    client.voice().delete_from_conference("C1", "5002").await?;
    assert_eq!(
        backend.state.requests_to("calls/C1/delete-from-conference")[0].body,
        json!({ "data": { "dnToDrop": "5002" } })
    );

    client.voice().send_dtmf("C1", "12#").await?;
    assert_eq!(
        backend.state.requests_to("calls/C1/send-dtmf")[0].body,
        json!({ "data": { "dtmfDigits": "12#" } })
    );

    let mut user_data = HashMap::new();
    user_data.insert("Segment".to_string(), json!("Gold"));
    client.voice().attach_user_data("C1", &user_data).await?;
    assert_eq!(
        backend.state.requests_to("calls/C1/attach-user-data")[0].body,
        json!({ "data": { "userData": [{ "key": "Segment", "type": "str", "value": "Gold" }] } })
    );

    client.voice().set_forward("2000").await?;
    client.voice().cancel_forward().await?;
    client.voice().dnd_on().await?;
    client.voice().hold("C1").await?;
    client.voice().retrieve("C1").await?;
    client.voice().start_recording("C1").await?;
    client.voice().release("C1").await?;
    for path in [
        "set-forward",
        "cancel-forward",
        "set-dnd-on",
        "calls/C1/hold",
        "calls/C1/retrieve",
        "calls/C1/start-recording",
        "calls/C1/release",
    ] {
        assert_eq!(backend.state.requests_to(path).len(), 1, "missing request to {}", path);
    }

    // Call control never changes local state by itself
    assert!(client.get_calls().is_empty());

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_non_success_code_is_an_operation_error() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = initialized(&backend).await?;

    backend.state.voice_status_code.store(2, Ordering::SeqCst);
    match client.voice().hold("C1").await {
        Err(ClientError::OperationError { operation, code, .. }) => {
            assert_eq!(operation, "holdCall");
            assert_eq!(code, 2);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // Synchronous success is not good enough for voice requests
    backend.state.voice_status_code.store(0, Ordering::SeqCst);
    assert!(matches!(
        client.voice().ready().await,
        Err(ClientError::OperationError { code: 0, .. })
    ));

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_activate_channels() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = initialized(&backend).await?;

    client.activate_channels("A1", "1000").await?;
    let requests = backend.state.requests_to("activate-channels");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, json!({ "data": { "agentId": "A1", "dn": "1000" } }));
    assert_eq!(requests[0].cookie.as_deref(), Some(SESSION_COOKIE));

    client.destroy().await?;
    assert!(matches!(
        client.activate_channels("A1", "1000").await,
        Err(ClientError::NotInitialized { .. })
    ));

    backend.shutdown().await;
    Ok(())
}

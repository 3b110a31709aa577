//! End-to-end bring-up and teardown against the fake backend

mod common;

use agentdesk_client_core::{
    AccessToken, AuthError, CallState, ClientError, ClientEvent, EventFilter, EventKind, SessionStatus,
};
use common::{next_event, resolve, start_backend, BackendState, SESSION_COOKIE};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_initialize_resolves_with_user() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;

    let pending = client.initialize().await?;
    assert_eq!(client.status(), SessionStatus::Active);
    assert_eq!(client.session_id().as_deref(), Some("sess-42"));
    assert!(!client.is_initialized());

    backend.push_init_complete("E100");
    let user = resolve(pending).await?;

    assert_eq!(user.employee_id.as_deref(), Some("E100"));
    assert_eq!(user.default_place.as_deref(), Some("Place_1000"));
    assert_eq!(user.user_properties["team"], json!("billing"));
    assert_eq!(client.get_user(), Some(user));
    assert!(client.is_initialized());

    // One handshake, one subscribe batch with both channels
    let state = &backend.state;
    assert_eq!(BackendState::count(&state.handshake_requests), 1);
    assert_eq!(BackendState::count(&state.subscribe_requests), 1);
    assert_eq!(
        *state.subscriptions.lock(),
        vec!["/workspace/v3/initialization", "/workspace/v3/voice"]
    );

    // The token request was a password grant
    let form = state.token_form.lock().clone().unwrap();
    assert_eq!(form["grant_type"], "password");
    assert_eq!(form["scope"], "*");
    assert_eq!(form["client_id"], "desktop");
    assert_eq!(form["username"], "agent1");

    // Polls carry the session cookie
    assert!(state
        .connect_cookies
        .lock()
        .iter()
        .all(|cookie| cookie.as_deref() == Some(SESSION_COOKIE)));

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_call_lifecycle_is_tracked_from_notifications() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;
    let mut events = client.subscribe_events(EventFilter::new().with_kinds([EventKind::CallStateChanged]));

    let pending = client.initialize().await?;
    backend.push_init_complete("E100");
    resolve(pending).await?;

    backend.push_call("C1", "Ringing");
    match next_event(&mut events).await {
        ClientEvent::CallStateChanged { info } => {
            assert_eq!(info.call_id, "C1");
            assert_eq!(info.new_state, CallState::Ringing);
            assert_eq!(info.previous_state, None);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    let call = client.get_call("C1").unwrap();
    assert_eq!(call.participants, vec!["5001"]);

    backend.push_call("C1", "Established");
    next_event(&mut events).await;
    assert_eq!(client.get_calls().len(), 1);
    assert_eq!(client.get_call("C1").unwrap().state, CallState::Established);

    backend.push_call("C1", "Released");
    match next_event(&mut events).await {
        ClientEvent::CallStateChanged { info } => {
            assert_eq!(info.new_state, CallState::Released);
            assert_eq!(info.previous_state, Some(CallState::Established));
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert!(client.get_calls().is_empty());

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_dn_tracked_from_notifications() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;
    let mut events = client.subscribe_events(EventFilter::new().with_kinds([EventKind::DnStateChanged]));

    let pending = client.initialize().await?;
    assert!(client.get_dn().is_none());

    backend.push_dn(json!({ "number": "1000", "agentId": "A1", "agentState": "NotReady", "agentWorkMode": "AuxWork" }));
    next_event(&mut events).await;
    assert_eq!(client.get_dn().unwrap().agent_state.as_deref(), Some("NotReady"));

    backend.push_dn(json!({ "agentState": "Ready", "forwardTo": "2000", "dnd": true }));
    match next_event(&mut events).await {
        ClientEvent::DnStateChanged { dn, .. } => {
            assert_eq!(dn.number.as_deref(), Some("1000"));
            assert_eq!(dn.agent_state.as_deref(), Some("Ready"));
            assert_eq!(dn.work_mode.as_deref(), Some("AuxWork"));
            assert_eq!(dn.forward_to.as_deref(), Some("2000"));
            assert!(dn.dnd);
        }
        other => panic!("unexpected event: {:?}", other),
    }

    client.destroy().await?;
    assert!(matches!(resolve(pending).await, Err(ClientError::SessionClosed)));
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_backend_reported_failure_rejects_initialization() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;

    let pending = client.initialize().await?;
    backend.push(
        "/workspace/v3/initialization",
        json!({ "messageType": "WorkspaceInitializationComplete", "state": "Failed", "errorMessage": "place busy" }),
    );

    match resolve(pending).await {
        Err(ClientError::InitializationFailed { reason }) => assert_eq!(reason, "place busy"),
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.status(), SessionStatus::Failed);
    assert!(client.get_user().is_none());

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_reinitialize_after_failure_leaves_old_session() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;

    let pending = client.initialize().await?;
    backend.push(
        "/workspace/v3/initialization",
        json!({ "messageType": "WorkspaceInitializationComplete", "state": "Failed", "errorMessage": "place busy" }),
    );
    assert!(matches!(
        resolve(pending).await,
        Err(ClientError::InitializationFailed { .. })
    ));

    let pending = client.initialize().await?;
    let state = &backend.state;
    // The failed session was left before the new one was opened
    assert_eq!(BackendState::count(&state.handshake_requests), 2);
    assert_eq!(BackendState::count(&state.disconnect_requests), 1);
    assert_eq!(BackendState::count(&state.logout_requests), 1);

    backend.push_init_complete("E100");
    let user = resolve(pending).await?;
    assert_eq!(user.employee_id.as_deref(), Some("E100"));
    assert_eq!(client.status(), SessionStatus::Active);

    client.destroy().await?;
    assert_eq!(BackendState::count(&state.disconnect_requests), 2);
    assert_eq!(BackendState::count(&state.logout_requests), 2);

    // No poll loop survives teardown
    let polls = BackendState::count(&state.connect_requests);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(BackendState::count(&state.connect_requests), polls);

    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_missing_session_cookie_fails_before_handshake() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    backend
        .state
        .issue_session_cookie
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let client = backend.client_builder().build()?;

    match client.initialize().await {
        Err(ClientError::SessionError { reason }) => assert!(reason.contains("missing session identifier")),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }

    let state = &backend.state;
    assert_eq!(BackendState::count(&state.session_requests), 1);
    assert_eq!(BackendState::count(&state.handshake_requests), 0);
    assert_eq!(BackendState::count(&state.subscribe_requests), 0);
    assert_eq!(client.status(), SessionStatus::Failed);

    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_rejected_handshake_leaves_nothing_subscribed() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    backend
        .state
        .accept_handshake
        .store(false, std::sync::atomic::Ordering::SeqCst);
    let client = backend.client_builder().build()?;

    assert!(matches!(
        client.initialize().await,
        Err(ClientError::HandshakeError { .. })
    ));

    let state = &backend.state;
    assert_eq!(BackendState::count(&state.handshake_requests), 1);
    assert_eq!(BackendState::count(&state.subscribe_requests), 0);
    assert_eq!(BackendState::count(&state.connect_requests), 0);
    // The half-open session is closed again
    assert_eq!(BackendState::count(&state.logout_requests), 1);
    assert_eq!(client.status(), SessionStatus::Failed);

    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_rejected_credentials() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().user("agent1", "wrong").build()?;

    match client.initialize().await {
        Err(ClientError::Auth(AuthError::Rejected { status, .. })) => assert_eq!(status, 401),
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert_eq!(BackendState::count(&backend.state.session_requests), 0);

    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_initialization_timeout() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().initialization_timeout_secs(1).build()?;

    let pending = client.initialize().await?;
    assert!(matches!(
        resolve(pending).await,
        Err(ClientError::InitializationTimeout { timeout }) if timeout == Duration::from_secs(1)
    ));

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_destroy_is_idempotent_and_stops_polling() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;
    let mut events = client.subscribe_events(EventFilter::new());

    let pending = client.initialize().await?;
    backend.push_init_complete("E100");
    resolve(pending).await?;

    client.destroy().await?;
    client.destroy().await?;
    assert_eq!(client.status(), SessionStatus::Closed);
    assert!(client.session_id().is_none());

    let state = &backend.state;
    assert_eq!(BackendState::count(&state.logout_requests), 1);
    assert_eq!(BackendState::count(&state.disconnect_requests), 1);

    let polls = BackendState::count(&state.connect_requests);
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(BackendState::count(&state.connect_requests), polls);

    // The channel reported itself up once
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ConnectionStateChanged { connected: true, .. }
    ));

    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_duplicate_completion_keeps_first_user() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;

    let pending = client.initialize().await?;
    backend.push_init_complete("E100");
    backend.push_init_complete("E200");
    let user = resolve(pending).await?;
    assert_eq!(user.employee_id.as_deref(), Some("E100"));

    // Let the second message be dispatched too
    backend.push_call("C9", "Ringing");
    let mut events = client.subscribe_events(EventFilter::new().with_call_ids(["C9"]));
    backend.push_call("C9", "Established");
    next_event(&mut events).await;

    assert_eq!(client.get_user().unwrap().employee_id.as_deref(), Some("E100"));

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_initialize_with_existing_token() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;

    let pending = client.initialize_with_token(AccessToken::bearer(common::TOKEN)).await?;
    backend.push_init_complete("E100");
    resolve(pending).await?;

    assert_eq!(BackendState::count(&backend.state.token_requests), 0);
    assert!(client.is_initialized());

    // A second initialize while active is refused
    assert!(matches!(
        client.initialize().await,
        Err(ClientError::InvalidState { .. })
    ));

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn test_lost_connection_is_reported() -> anyhow::Result<()> {
    let backend = start_backend().await?;
    let client = backend.client_builder().build()?;
    let mut events = client.subscribe_events(EventFilter::new().with_kinds([EventKind::ConnectionStateChanged]));

    backend
        .state
        .reject_connect
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let _pending = client.initialize().await?;

    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ConnectionStateChanged { connected: true, .. }
    ));
    match next_event(&mut events).await {
        ClientEvent::ConnectionStateChanged { connected, reason } => {
            assert!(!connected);
            assert!(reason.unwrap().contains("500"));
        }
        other => panic!("unexpected event: {:?}", other),
    }

    // No retry
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(BackendState::count(&backend.state.connect_requests), 1);

    client.destroy().await?;
    backend.shutdown().await;
    Ok(())
}

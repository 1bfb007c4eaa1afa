//! HTTP backend adapter tests against a mocked backend.
//!
//! Run: cargo test -p voxlink-core --test backend_client

use secrecy::ExposeSecret;
use serde_json::json;
use std::time::Duration;
use voxlink_core::{
    SessionError,
    backend::{SessionBackend, SignedUrlProvider},
    backend_client::HttpBackend,
    model::{ConversationTurn, Role},
};
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_signed_url_passes_user_and_session() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/signed-url"))
        .and(query_param("userId", "user_1"))
        .and(query_param("sessionId", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "signedUrl": "wss://agent.example/convai?token=abc",
            "sessionId": "s1"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(format!("{}/", server.uri())).unwrap();
    let signed = backend
        .get_signed_url("user_1", Some("s1".to_string()))
        .await
        .unwrap();

    assert_eq!(
        signed.url.expose_secret(),
        "wss://agent.example/convai?token=abc"
    );
    assert_eq!(signed.session_id.as_deref(), Some("s1"));
}

#[tokio::test]
async fn test_signed_url_without_session_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/signed-url"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "signedUrl": "wss://x" })),
        )
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    let signed = backend.get_signed_url("user_1", None).await.unwrap();

    assert_eq!(signed.url.expose_secret(), "wss://x");
    assert!(signed.session_id.is_none());
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].url.query(), Some("userId=user_1"));
}

#[tokio::test]
async fn test_non_success_status_is_backend_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/signed-url"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    let err = backend.get_signed_url("user_1", None).await.unwrap_err();

    match err {
        SessionError::BackendUnavailable { endpoint, reason } => {
            assert_eq!(endpoint, "/api/signed-url");
            assert!(reason.contains("503"));
        }
        other => panic!("Expected BackendUnavailable, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_backend_unavailable() {
    let backend = HttpBackend::new("http://127.0.0.1:1").unwrap();
    let err = backend.get_agent_id().await.unwrap_err();
    assert!(matches!(err, SessionError::BackendUnavailable { .. }));
}

#[tokio::test]
async fn test_agent_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/getAgentId"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "agentId": "agent-42" })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    assert_eq!(backend.get_agent_id().await.unwrap(), "agent-42");
}

#[tokio::test]
async fn test_keep_alive_and_end_session_post_session_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/keep-alive"))
        .and(body_json(json!({ "sessionId": "s1" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/end-session"))
        .and(body_json(json!({ "sessionId": "s1" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    backend.keep_alive("s1").await.unwrap();
    backend.end_session("s1").await.unwrap();
}

#[tokio::test]
async fn test_keep_alive_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/keep-alive"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    assert!(backend.keep_alive("s1").await.is_err());
}

#[tokio::test]
async fn test_store_conversation_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/store-conversation"))
        .and(body_json(json!({
            "userId": "user_1",
            "sessionId": "s1",
            "messages": [
                { "role": "user", "content": "Hello" },
                { "role": "assistant", "content": "Hi! How can I help?" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    let turns = vec![
        ConversationTurn::new(Role::User, "Hello"),
        ConversationTurn::new(Role::Assistant, "Hi! How can I help?"),
    ];
    backend
        .store_conversation("user_1", "s1", &turns)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_check_reminders_and_delay() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/check-reminders"))
        .and(query_param("sessionId", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "pendingReminders": [{ "task": "Stretch", "id": 3 }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/check-delay"))
        .and(query_param("sessionId", "s1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "hasActiveDelay": true,
            "remainingSeconds": 9
        })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    let reminders = backend.check_reminders("s1").await.unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].task, "Stretch");

    let delay = backend.check_delay("s1").await.unwrap();
    assert!(delay.has_active_delay);
    assert_eq!(delay.remaining_seconds, 9);
}

#[tokio::test]
async fn test_process_message_reports_delay() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/process-message"))
        .and(body_json(json!({ "sessionId": "s1", "message": "wait a bit" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "hasDelay": true })))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    assert!(backend.process_message("s1", "wait a bit").await.unwrap());
}

#[tokio::test]
async fn test_end_beacon_is_delivered_without_awaiting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/end-session"))
        .and(body_json(json!({ "sessionId": "s9" })))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    backend.send_end_beacon("s9");

    let mut delivered = false;
    for _ in 0..50 {
        if !server.received_requests().await.unwrap().is_empty() {
            delivered = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(delivered, "beacon never reached the backend");
}

#[tokio::test]
async fn test_slow_backend_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/check-reminders"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "pendingReminders": [] }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let backend = HttpBackend::with_timeout(server.uri(), Duration::from_millis(200)).unwrap();
    let started = std::time::Instant::now();
    let err = backend.check_reminders("s1").await.unwrap_err();

    assert!(matches!(err, SessionError::BackendUnavailable { .. }));
    assert!(started.elapsed() < Duration::from_secs(5));
}

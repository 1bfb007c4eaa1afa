//! Drives `WsVoiceConnector` against a local WebSocket server.

use convai_realtime::WsVoiceConnector;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::{net::TcpListener, sync::mpsc};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use voxlink_core::{
    ControllerInput, SessionError,
    model::{HandleId, Role},
    voice::{VoiceConnector, VoiceEvent, VoiceEventSink},
};

async fn bind() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

async fn next_event(rx: &mut mpsc::Receiver<ControllerInput>) -> (HandleId, VoiceEvent) {
    let input = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a voice event")
        .expect("inbox closed");
    match input {
        ControllerInput::Voice { handle, event } => (handle, event),
        other => panic!("Expected a voice event, got {:?}", other),
    }
}

fn text_json(message: Message) -> Value {
    match message {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("Expected a text frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_full_conversation_exchange() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();

        let init = text_json(ws.next().await.unwrap().unwrap());
        assert_eq!(init, json!({ "type": "conversation_initiation_client_data" }));

        let frames = [
            json!({
                "type": "conversation_initiation_metadata",
                "conversation_initiation_metadata_event": { "conversation_id": "c-1" }
            }),
            json!({ "type": "ping", "ping_event": { "event_id": 5 } }),
        ];
        for frame in frames {
            ws.send(Message::Text(frame.to_string().into())).await.unwrap();
        }

        let pong = text_json(ws.next().await.unwrap().unwrap());
        assert_eq!(pong, json!({ "type": "pong", "event_id": 5 }));

        ws.send(Message::Text(
            json!({
                "type": "agent_response",
                "agent_response_event": { "agent_response": "Hello!" }
            })
            .to_string()
            .into(),
        ))
        .await
        .unwrap();
        ws.close(None).await.unwrap();
    });

    let (tx, mut rx) = mpsc::channel(16);
    let connector = WsVoiceConnector::default();
    let _session = connector
        .open(&url, VoiceEventSink::new(HandleId(3), tx))
        .await
        .unwrap();

    let (handle, event) = next_event(&mut rx).await;
    assert_eq!(handle, HandleId(3));
    assert_eq!(event, VoiceEvent::Connected);

    let (_, event) = next_event(&mut rx).await;
    assert_eq!(
        event,
        VoiceEvent::Message {
            role: Role::Assistant,
            text: "Hello!".to_string()
        }
    );

    let (_, event) = next_event(&mut rx).await;
    assert_eq!(event, VoiceEvent::Disconnected);

    server.await.unwrap();
}

#[tokio::test]
async fn test_end_session_sends_close_and_stops_events() {
    let (listener, url) = bind().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(stream).await.unwrap();
        let _init = ws.next().await.unwrap().unwrap();

        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
                _ => return false,
            }
        }
    });

    let (tx, mut rx) = mpsc::channel(16);
    let connector = WsVoiceConnector::default();
    let mut session = connector
        .open(&url, VoiceEventSink::new(HandleId(1), tx))
        .await
        .unwrap();

    session.end_session().await.unwrap();
    session.end_session().await.unwrap();

    assert!(server.await.unwrap(), "server never saw a close frame");
    let quiet = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(
        !matches!(quiet, Ok(Some(_))),
        "no events expected after end_session"
    );
}

#[tokio::test]
async fn test_unreachable_service_is_transport_error() {
    let (listener, url) = bind().await;
    drop(listener);

    let (tx, _rx) = mpsc::channel(16);
    let result = WsVoiceConnector::with_connect_timeout(Duration::from_secs(2))
        .open(&url, VoiceEventSink::new(HandleId(1), tx))
        .await;

    match result {
        Err(SessionError::Transport(_)) => {}
        Err(other) => panic!("Expected transport error, got {:?}", other),
        Ok(_) => panic!("Expected transport error, got a session"),
    }
}

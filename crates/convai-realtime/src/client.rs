//! Opens and drives the agent WebSocket.
//!
//! Each session owns a reader task that interprets server frames and forwards
//! the resulting [`VoiceEvent`]s into the controller's inbox. Replies such as
//! `pong` go back through the shared write half.

use crate::protocol::{ClientMessage, Interpreter};
use async_trait::async_trait;
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message as WsMessage,
};
use tracing::{debug, info, warn};
use voxlink_core::{
    SessionError, SessionResult,
    voice::{VoiceConnector, VoiceEvent, VoiceEventSink, VoiceSession},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SharedWriter = Arc<Mutex<SplitSink<WsStream, WsMessage>>>;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the agent service using the signed URL handed out by the backend.
#[derive(Debug, Clone)]
pub struct WsVoiceConnector {
    connect_timeout: Duration,
}

impl Default for WsVoiceConnector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl WsVoiceConnector {
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl VoiceConnector for WsVoiceConnector {
    async fn open(
        &self,
        signed_url: &str,
        events: VoiceEventSink,
    ) -> SessionResult<Box<dyn VoiceSession>> {
        let handle = events.handle();
        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(signed_url))
            .await
            .map_err(|_| SessionError::Transport("timed out opening voice channel".to_string()))?
            .map_err(|e| SessionError::Transport(e.to_string()))?;
        info!(%handle, "Voice WebSocket opened.");

        let (mut ws_tx, ws_rx) = ws_stream.split();
        send_frame(&mut ws_tx, &ClientMessage::ConversationInitiationClientData).await?;

        let writer = Arc::new(Mutex::new(ws_tx));
        let reader = tokio::spawn(read_loop(ws_rx, Arc::clone(&writer), events));
        Ok(Box::new(WsVoiceSession {
            writer,
            reader: Some(reader),
        }))
    }
}

/// A live agent conversation.
pub struct WsVoiceSession {
    writer: SharedWriter,
    reader: Option<JoinHandle<()>>,
}

#[async_trait]
impl VoiceSession for WsVoiceSession {
    async fn end_session(&mut self) -> SessionResult<()> {
        let Some(reader) = self.reader.take() else {
            return Ok(());
        };
        reader.abort();

        let mut sink = self.writer.lock().await;
        // The peer may already be gone; closing is best-effort.
        if let Err(e) = sink.send(WsMessage::Close(None)).await {
            debug!(error = %e, "Close frame not delivered.");
        }
        Ok(())
    }
}

impl Drop for WsVoiceSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

async fn send_frame(
    sink: &mut SplitSink<WsStream, WsMessage>,
    message: &ClientMessage,
) -> SessionResult<()> {
    let payload =
        serde_json::to_string(message).map_err(|e| SessionError::Operational(e.to_string()))?;
    sink.send(WsMessage::Text(payload.into()))
        .await
        .map_err(|e| SessionError::Transport(e.to_string()))
}

async fn read_loop(mut ws_rx: SplitStream<WsStream>, writer: SharedWriter, events: VoiceEventSink) {
    let handle = events.handle();
    let mut interpreter = Interpreter::default();

    while let Some(frame) = ws_rx.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                let reaction = interpreter.on_text(&text);
                if let Some(reply) = reaction.reply {
                    let mut sink = writer.lock().await;
                    if let Err(e) = send_frame(&mut sink, &reply).await {
                        warn!(%handle, error = %e, "Failed to answer agent frame.");
                        events.emit(VoiceEvent::Error(e)).await;
                        return;
                    }
                }
                for event in reaction.events {
                    if !events.emit(event).await {
                        return;
                    }
                }
            }
            Ok(WsMessage::Close(frame)) => {
                info!(%handle, ?frame, "Agent closed the voice channel.");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(%handle, error = %e, "Voice channel read failed.");
                events
                    .emit(VoiceEvent::Error(SessionError::Transport(e.to_string())))
                    .await;
                return;
            }
        }
    }

    events.emit(VoiceEvent::Disconnected).await;
}

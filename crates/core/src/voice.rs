//! Capability interfaces for the external real-time voice service.

use crate::{
    controller::ControllerInput,
    error::{SessionError, SessionResult},
    model::{HandleId, Role},
};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

/// Whether the agent is currently talking or listening to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Speaking,
    Listening,
}

/// Callbacks a voice session delivers to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    /// The channel is established and audio can flow.
    Connected,
    /// The channel closed.
    Disconnected,
    /// The service reported an error; see [`SessionError::is_connection_level`].
    Error(SessionError),
    ModeChange(Mode),
    /// A transcript line from either side of the conversation.
    Message { role: Role, text: String },
}

/// Delivers events from one voice-session handle into the controller's inbox.
///
/// Every event is tagged with the handle id, so events from a superseded
/// handle are recognisable after a reconnection.
#[derive(Clone, Debug)]
pub struct VoiceEventSink {
    handle: HandleId,
    tx: mpsc::Sender<ControllerInput>,
}

impl VoiceEventSink {
    pub fn new(handle: HandleId, tx: mpsc::Sender<ControllerInput>) -> Self {
        Self { handle, tx }
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    /// Returns `false` once the controller is gone.
    pub async fn emit(&self, event: VoiceEvent) -> bool {
        let delivered = self
            .tx
            .send(ControllerInput::Voice {
                handle: self.handle,
                event,
            })
            .await
            .is_ok();
        if !delivered {
            trace!(handle = %self.handle, "Controller inbox closed; dropping voice event");
        }
        delivered
    }
}

/// A live real-time audio/control channel.
#[async_trait]
pub trait VoiceSession: Send {
    /// Closes the channel. Safe to call on a defunct session.
    async fn end_session(&mut self) -> SessionResult<()>;
}

/// Opens voice sessions from signed URLs.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn open(
        &self,
        signed_url: &str,
        events: VoiceEventSink,
    ) -> SessionResult<Box<dyn VoiceSession>>;
}

/// Gatekeeper for microphone capture.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MicrophoneAccess: Send + Sync {
    async fn request_permission(&self) -> SessionResult<()>;
}

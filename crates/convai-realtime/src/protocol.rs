//! Wire messages exchanged with the voice agent over the WebSocket.

use serde::{Deserialize, Serialize};
use tracing::debug;
use voxlink_core::{
    SessionError,
    model::Role,
    voice::{Mode, VoiceEvent},
};

/// Frames sent by the client.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Must be the first frame after the socket opens.
    ConversationInitiationClientData,
    /// Answer to a server `ping`.
    Pong { event_id: u64 },
}

/// Frames sent by the agent service. Unrecognised types decode as `Unknown`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConversationInitiationMetadata {
        conversation_initiation_metadata_event: InitiationMetadata,
    },
    Ping {
        ping_event: PingEvent,
    },
    Audio {
        #[serde(default)]
        audio_event: Option<AudioEvent>,
    },
    AgentResponse {
        agent_response_event: AgentResponseEvent,
    },
    UserTranscript {
        user_transcription_event: UserTranscriptionEvent,
    },
    Interruption {
        #[serde(default)]
        interruption_event: Option<serde_json::Value>,
    },
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error_event: Option<ErrorEvent>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InitiationMetadata {
    pub conversation_id: String,
    #[serde(default)]
    pub agent_output_audio_format: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingEvent {
    pub event_id: u64,
    #[serde(default)]
    pub ping_ms: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AudioEvent {
    #[serde(default)]
    pub audio_base_64: String,
    #[serde(default)]
    pub event_id: Option<u64>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AgentResponseEvent {
    pub agent_response: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserTranscriptionEvent {
    pub user_transcript: String,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerMessage {
    fn error_text(&self) -> Option<String> {
        let ServerMessage::Error {
            message,
            error_event,
        } = self
        else {
            return None;
        };
        let detail = message
            .clone()
            .or_else(|| error_event.as_ref().and_then(|e| e.message.clone()))
            .or_else(|| error_event.as_ref().and_then(|e| e.error_type.clone()));
        Some(detail.unwrap_or_else(|| "unspecified agent error".to_string()))
    }
}

/// What the client should do in response to one server frame.
#[derive(Debug, Default, PartialEq)]
pub struct Reaction {
    pub reply: Option<ClientMessage>,
    pub events: Vec<VoiceEvent>,
}

/// Tracks the agent's speaking mode so mode changes are only reported on
/// transitions rather than for every audio chunk.
#[derive(Debug)]
pub struct Interpreter {
    mode: Mode,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            mode: Mode::Listening,
        }
    }
}

impl Interpreter {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Decodes and interprets a text frame. Undecodable frames become an
    /// operational error event.
    pub fn on_text(&mut self, text: &str) -> Reaction {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => self.on_message(message),
            Err(e) => Reaction {
                reply: None,
                events: vec![VoiceEvent::Error(SessionError::Operational(format!(
                    "malformed agent frame: {}",
                    e
                )))],
            },
        }
    }

    pub fn on_message(&mut self, message: ServerMessage) -> Reaction {
        let mut reaction = Reaction::default();
        match message {
            ServerMessage::ConversationInitiationMetadata {
                conversation_initiation_metadata_event,
            } => {
                debug!(
                    conversation_id = %conversation_initiation_metadata_event.conversation_id,
                    "Agent conversation initiated"
                );
                reaction.events.push(VoiceEvent::Connected);
            }
            ServerMessage::Ping { ping_event } => {
                reaction.reply = Some(ClientMessage::Pong {
                    event_id: ping_event.event_id,
                });
            }
            ServerMessage::Audio { .. } => self.switch(Mode::Speaking, &mut reaction),
            ServerMessage::AgentResponse {
                agent_response_event,
            } => reaction.events.push(VoiceEvent::Message {
                role: Role::Assistant,
                text: agent_response_event.agent_response,
            }),
            ServerMessage::UserTranscript {
                user_transcription_event,
            } => {
                // The user only speaks once the agent has stopped.
                self.switch(Mode::Listening, &mut reaction);
                reaction.events.push(VoiceEvent::Message {
                    role: Role::User,
                    text: user_transcription_event.user_transcript,
                });
            }
            ServerMessage::Interruption { .. } => self.switch(Mode::Listening, &mut reaction),
            ref error @ ServerMessage::Error { .. } => {
                let detail = error.error_text().unwrap_or_default();
                reaction
                    .events
                    .push(VoiceEvent::Error(SessionError::Operational(detail)));
            }
            ServerMessage::Unknown => {}
        }
        reaction
    }

    fn switch(&mut self, mode: Mode, reaction: &mut Reaction) {
        if self.mode != mode {
            self.mode = mode;
            reaction.events.push(VoiceEvent::ModeChange(mode));
        }
    }
}

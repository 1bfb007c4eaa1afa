//! Presentation events emitted by the controller.
//!
//! The controller never renders anything itself; a presenter consumes these
//! events and decides how to show them.

use crate::{
    model::{ConnectionState, ConversationTurn},
    voice::Mode,
};
use std::time::Duration;

/// How long a notice stays visible before it is dismissed.
pub const NOTICE_DURATION: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// A transient, auto-dismissing message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            message: message.into(),
        }
    }
}

/// Which user commands are currently available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    pub start_enabled: bool,
    pub end_enabled: bool,
}

impl Controls {
    pub const IDLE: Controls = Controls {
        start_enabled: true,
        end_enabled: false,
    };
    pub const BUSY: Controls = Controls {
        start_enabled: false,
        end_enabled: false,
    };
    pub const ACTIVE: Controls = Controls {
        start_enabled: false,
        end_enabled: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    State(ConnectionState),
    Speaking(Mode),
    Controls(Controls),
    Notice(Notice),
    Turn(ConversationTurn),
    /// Remaining seconds of an artificial reply delay, `None` when cleared.
    Delay(Option<u64>),
    AgentId(String),
}

pub(crate) mod messages {
    pub const PERMISSION_REQUIRED: &str = "Microphone permission is required for the conversation.";
    pub const START_FAILED: &str = "Failed to start conversation. Please try again.";
    pub const CONNECTED: &str = "Connected successfully! You can start speaking now.";
    pub const RECONNECTING: &str = "Connection interrupted. Reconnecting...";
    pub const RECONNECTED: &str = "Reconnected.";
    pub const CONVERSATION_ERROR: &str = "An error occurred during the conversation.";
    pub const ENDED: &str = "Conversation ended successfully.";
    pub const CONNECTION_LOST: &str = "Connection lost. Please start a new conversation.";
    pub const REPLY_DELAYED: &str = "The agent will reply after a short delay.";
}

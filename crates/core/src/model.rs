use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    DisconnectedRetrying,
    Ending,
    Failed,
}

impl ConnectionState {
    /// Whether a voice connection is established or being (re)established.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting
                | ConnectionState::Connected
                | ConnectionState::DisconnectedRetrying
        )
    }

    /// States from which a start command is accepted.
    pub fn accepts_start(self) -> bool {
        matches!(self, ConnectionState::Idle | ConnectionState::Failed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::DisconnectedRetrying => "reconnecting",
            ConnectionState::Ending => "ending",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Identity of one logical conversation, owned by the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Assigned by the backend on the first signed-URL request.
    pub session_id: Option<String>,
    /// Client-generated, stable across runs.
    pub user_id: String,
    /// Only fetched when the agent-id lookup is enabled.
    pub agent_id: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            session_id: None,
            user_id: user_id.into(),
            agent_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One entry of the local conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Identity of one opened voice-session handle.
///
/// Events are tagged with the id of the handle that produced them so that
/// callbacks from a superseded handle can be told apart and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub u64);

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "voice-{}", self.0)
    }
}

/// A backend-issued connection string for the voice-agent service.
#[derive(Debug)]
pub struct SignedUrl {
    pub url: SecretString,
    pub session_id: Option<String>,
}

/// A reminder the backend wants delivered to the user.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Reminder {
    pub task: String,
}

/// Whether the backend is artificially delaying the agent's replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayStatus {
    pub has_active_delay: bool,
    #[serde(default)]
    pub remaining_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state_predicates() {
        assert!(ConnectionState::Idle.accepts_start());
        assert!(ConnectionState::Failed.accepts_start());
        assert!(!ConnectionState::Connecting.accepts_start());
        assert!(!ConnectionState::DisconnectedRetrying.accepts_start());

        assert!(ConnectionState::Connected.is_active());
        assert!(ConnectionState::DisconnectedRetrying.is_active());
        assert!(!ConnectionState::Ending.is_active());
        assert!(!ConnectionState::Failed.is_active());
    }

    #[test]
    fn test_turn_serializes_lowercase_role() {
        let turn = ConversationTurn::new(Role::Assistant, "Hi there");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"Hi there"}"#);
    }

    #[test]
    fn test_delay_status_defaults_remaining_seconds() {
        let status: DelayStatus = serde_json::from_str(r#"{"hasActiveDelay": false}"#).unwrap();
        assert!(!status.has_active_delay);
        assert_eq!(status.remaining_seconds, 0);

        let status: DelayStatus =
            serde_json::from_str(r#"{"hasActiveDelay": true, "remainingSeconds": 12}"#).unwrap();
        assert_eq!(status.remaining_seconds, 12);
    }

    #[test]
    fn test_reminder_ignores_extra_fields() {
        let reminder: Reminder =
            serde_json::from_str(r#"{"task": "Drink water", "dueAt": "soon"}"#).unwrap();
        assert_eq!(reminder.task, "Drink water");
    }
}

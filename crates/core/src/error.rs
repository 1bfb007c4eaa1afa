//! Error taxonomy for the conversation session lifecycle.

/// Every failure the controller can observe or surface.
///
/// Cleanup-path failures (closing a voice session, notifying the backend that
/// a session ended) are logged and swallowed; they never escape the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The user (or the platform) refused microphone access.
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),
    /// A backend HTTP call failed or returned a non-2xx status.
    #[error("Backend unavailable at {endpoint}: {reason}")]
    BackendUnavailable { endpoint: String, reason: String },
    /// The real-time voice channel failed at the connection level.
    #[error("Voice transport error: {0}")]
    Transport(String),
    /// The voice service reported an error that leaves the connection usable.
    #[error("Voice session error: {0}")]
    Operational(String),
    /// Reconnection gave up after the configured number of attempts.
    #[error("Reconnection abandoned after {attempts} attempts")]
    RetryExhausted { attempts: u32 },
}

impl SessionError {
    pub fn backend(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        Self::BackendUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a voice-session error should be treated as a disconnect.
    pub fn is_connection_level(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

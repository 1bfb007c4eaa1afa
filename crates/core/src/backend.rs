//! Backend seams consumed by the session controller.
//!
//! The backend issues signed URLs and session identifiers and tracks session
//! liveness. `HttpBackend` in [`crate::backend_client`] is the production
//! implementation of both traits.

use crate::{
    error::SessionResult,
    model::{ConversationTurn, DelayStatus, Reminder, SignedUrl},
};
use async_trait::async_trait;

/// Abstracts the backend handshake that authorizes a voice session.
///
/// Repeated calls are safe; each may mint a new signed URL. Whether a
/// `session_id` is reused is up to the backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SignedUrlProvider: Send + Sync {
    /// Requests a signed URL for `user_id`, resuming `session_id` if known.
    async fn get_signed_url(
        &self,
        user_id: &str,
        session_id: Option<String>,
    ) -> SessionResult<SignedUrl>;

    /// Fetches the identifier of the conversational agent.
    async fn get_agent_id(&self) -> SessionResult<String>;
}

/// Session bookkeeping calls made while a conversation is running.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn keep_alive(&self, session_id: &str) -> SessionResult<()>;

    async fn end_session(&self, session_id: &str) -> SessionResult<()>;

    /// Fire-and-forget end-of-session notice for process teardown.
    ///
    /// Must return immediately and must not rely on the async runtime
    /// surviving long enough to complete the request.
    fn send_end_beacon(&self, session_id: &str);

    async fn store_conversation(
        &self,
        user_id: &str,
        session_id: &str,
        turns: &[ConversationTurn],
    ) -> SessionResult<()>;

    async fn check_reminders(&self, session_id: &str) -> SessionResult<Vec<Reminder>>;

    async fn check_delay(&self, session_id: &str) -> SessionResult<DelayStatus>;

    /// Forwards a user message; returns whether the backend delays the reply.
    async fn process_message(&self, session_id: &str, message: &str) -> SessionResult<bool>;
}

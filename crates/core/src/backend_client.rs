//! HTTP implementation of the backend seams.

use crate::{
    backend::{SessionBackend, SignedUrlProvider},
    error::{SessionError, SessionResult},
    model::{ConversationTurn, DelayStatus, Reminder, SignedUrl},
};
use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, warn};

const SIGNED_URL_PATH: &str = "/api/signed-url";
const AGENT_ID_PATH: &str = "/api/getAgentId";
const KEEP_ALIVE_PATH: &str = "/api/keep-alive";
const END_SESSION_PATH: &str = "/api/end-session";
const STORE_CONVERSATION_PATH: &str = "/api/store-conversation";
const CHECK_REMINDERS_PATH: &str = "/api/check-reminders";
const CHECK_DELAY_PATH: &str = "/api/check-delay";
const PROCESS_MESSAGE_PATH: &str = "/api/process-message";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const BEACON_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignedUrlResponse {
    signed_url: String,
    session_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentIdResponse {
    agent_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemindersResponse {
    #[serde(default)]
    pending_reminders: Vec<Reminder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessageResponse {
    #[serde(default)]
    has_delay: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionIdBody<'a> {
    session_id: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoreConversationBody<'a> {
    user_id: &'a str,
    session_id: &'a str,
    messages: &'a [ConversationTurn],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessMessageBody<'a> {
    session_id: &'a str,
    message: &'a str,
}

/// Talks to the conversation backend over HTTP.
#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    /// Creates a client rooted at `base_url` (a trailing `/` is ignored).
    pub fn new(base_url: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_timeout(base_url, REQUEST_TIMEOUT)
    }

    /// Like [`HttpBackend::new`], but every request is abandoned after `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> reqwest::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> SessionResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|e| SessionError::backend(path, e))?;
        Self::read_json(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> SessionResult<reqwest::Response> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| SessionError::backend(path, e))?;
        if !response.status().is_success() {
            return Err(SessionError::backend(
                path,
                format!("status {}", response.status()),
            ));
        }
        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> SessionResult<T> {
        if !response.status().is_success() {
            return Err(SessionError::backend(
                path,
                format!("status {}", response.status()),
            ));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| SessionError::backend(path, e))
    }
}

#[async_trait]
impl SignedUrlProvider for HttpBackend {
    async fn get_signed_url(
        &self,
        user_id: &str,
        session_id: Option<String>,
    ) -> SessionResult<SignedUrl> {
        let mut query = Vec::with_capacity(2);
        if !user_id.is_empty() {
            query.push(("userId", user_id));
        }
        if let Some(session_id) = session_id.as_deref() {
            query.push(("sessionId", session_id));
        }

        let body: SignedUrlResponse = self.get_json(SIGNED_URL_PATH, &query).await?;
        debug!(session_id = ?body.session_id, "Received signed URL");
        Ok(SignedUrl {
            url: SecretString::from(body.signed_url),
            session_id: body.session_id,
        })
    }

    async fn get_agent_id(&self) -> SessionResult<String> {
        let body: AgentIdResponse = self.get_json(AGENT_ID_PATH, &[]).await?;
        Ok(body.agent_id)
    }
}

#[async_trait]
impl SessionBackend for HttpBackend {
    async fn keep_alive(&self, session_id: &str) -> SessionResult<()> {
        self.post_json(KEEP_ALIVE_PATH, &SessionIdBody { session_id })
            .await?;
        Ok(())
    }

    async fn end_session(&self, session_id: &str) -> SessionResult<()> {
        self.post_json(END_SESSION_PATH, &SessionIdBody { session_id })
            .await?;
        Ok(())
    }

    fn send_end_beacon(&self, session_id: &str) {
        let url = self.url(END_SESSION_PATH);
        let payload = match serde_json::to_vec(&SessionIdBody { session_id }) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to encode end-session beacon");
                return;
            }
        };

        // A plain thread outlives the async runtime during teardown.
        let spawned = std::thread::Builder::new()
            .name("end-session-beacon".into())
            .spawn(move || {
                let client = match reqwest::blocking::Client::builder()
                    .timeout(BEACON_TIMEOUT)
                    .build()
                {
                    Ok(client) => client,
                    Err(e) => {
                        warn!(error = %e, "Failed to build beacon client");
                        return;
                    }
                };
                let result = client
                    .post(url)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(payload)
                    .send();
                if let Err(e) = result {
                    warn!(error = %e, "End-session beacon failed");
                }
            });
        if let Err(e) = spawned {
            warn!(error = %e, "Failed to dispatch end-session beacon");
        }
    }

    async fn store_conversation(
        &self,
        user_id: &str,
        session_id: &str,
        turns: &[ConversationTurn],
    ) -> SessionResult<()> {
        let body = StoreConversationBody {
            user_id,
            session_id,
            messages: turns,
        };
        self.post_json(STORE_CONVERSATION_PATH, &body).await?;
        Ok(())
    }

    async fn check_reminders(&self, session_id: &str) -> SessionResult<Vec<Reminder>> {
        let body: RemindersResponse = self
            .get_json(CHECK_REMINDERS_PATH, &[("sessionId", session_id)])
            .await?;
        Ok(body.pending_reminders)
    }

    async fn check_delay(&self, session_id: &str) -> SessionResult<DelayStatus> {
        self.get_json(CHECK_DELAY_PATH, &[("sessionId", session_id)])
            .await
    }

    async fn process_message(&self, session_id: &str, message: &str) -> SessionResult<bool> {
        let response = self
            .post_json(PROCESS_MESSAGE_PATH, &ProcessMessageBody { session_id, message })
            .await?;
        let body: ProcessMessageResponse = Self::read_json(PROCESS_MESSAGE_PATH, response).await?;
        Ok(body.has_delay)
    }
}

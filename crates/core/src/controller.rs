//! Conversation Session Controller
//!
//! `SessionController` owns the lifecycle of one conversation: start and end
//! commands from the user, callbacks from the live voice session, and the
//! maintenance timers (keep-alive, reminder and delay polling, scheduled
//! reconnection). Every input goes through a single inbox and is processed
//! to completion before the next one, so no two transitions are ever in
//! flight at once.

use crate::{
    backend::{SessionBackend, SignedUrlProvider},
    error::{SessionError, SessionResult},
    model::{ConnectionState, ConversationTurn, DelayStatus, HandleId, Reminder, Role, Session},
    retry::RetryPolicy,
    timers::{TimerKind, Timers},
    view::{Controls, Notice, UiEvent, messages},
    voice::{MicrophoneAccess, Mode, VoiceConnector, VoiceEvent, VoiceEventSink, VoiceSession},
};
use secrecy::ExposeSecret;
use std::{collections::HashMap, ops::ControlFlow, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, trace, warn};

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
const INBOX_CAPACITY: usize = 64;

/// Tunables for one controller instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub keep_alive_interval: Duration,
    pub poll_interval: Duration,
    /// Reminder and delay polling while connected.
    pub polling_enabled: bool,
    /// Also look up the agent identifier when starting.
    pub fetch_agent_id: bool,
    pub retry: RetryPolicy,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            keep_alive_interval: Duration::from_secs(20),
            poll_interval: POLL_INTERVAL,
            polling_enabled: true,
            fetch_agent_id: false,
            retry: RetryPolicy::default(),
        }
    }
}

/// Everything that can advance the controller.
#[derive(Debug)]
pub enum ControllerInput {
    Start,
    End,
    /// Process teardown: best-effort cleanup without awaiting the network.
    Unload,
    Voice {
        handle: HandleId,
        event: VoiceEvent,
    },
    Tick(TimerKind),
    ReconnectDue {
        attempt: u32,
    },
    /// Result of a backend call that ran off the inbox on behalf of `handle`.
    Backend {
        handle: HandleId,
        outcome: BackendOutcome,
    },
}

/// Results of backend calls made while a voice session is live.
#[derive(Debug)]
pub enum BackendOutcome {
    Reminders(SessionResult<Vec<Reminder>>),
    Delay(SessionResult<DelayStatus>),
    MessageProcessed(SessionResult<bool>),
}

/// The external collaborators a controller talks to.
#[derive(Clone)]
pub struct Dependencies {
    pub signed_urls: Arc<dyn SignedUrlProvider>,
    pub backend: Arc<dyn SessionBackend>,
    pub microphone: Arc<dyn MicrophoneAccess>,
    pub voice: Arc<dyn VoiceConnector>,
}

/// Cloneable front door for submitting user commands.
#[derive(Clone, Debug)]
pub struct ControllerHandle {
    tx: mpsc::Sender<ControllerInput>,
}

impl ControllerHandle {
    pub async fn start(&self) -> bool {
        self.submit(ControllerInput::Start).await
    }

    pub async fn end(&self) -> bool {
        self.submit(ControllerInput::End).await
    }

    pub async fn unload(&self) -> bool {
        self.submit(ControllerInput::Unload).await
    }

    async fn submit(&self, input: ControllerInput) -> bool {
        if self.tx.send(input).await.is_err() {
            warn!("Session controller is no longer running.");
            return false;
        }
        true
    }
}

struct LiveVoice {
    id: HandleId,
    session: Box<dyn VoiceSession>,
}

pub struct SessionController {
    config: ControllerConfig,
    deps: Dependencies,
    session: Session,
    state: ConnectionState,
    reconnect_attempts: u32,
    turns: Vec<ConversationTurn>,
    voice: Option<LiveVoice>,
    next_handle: u64,
    delay_shown: bool,
    /// Polls awaiting a result, keyed by kind, tagged with the issuing handle.
    polls_in_flight: HashMap<TimerKind, HandleId>,
    timers: Timers,
    inbox_tx: mpsc::Sender<ControllerInput>,
    inbox_rx: mpsc::Receiver<ControllerInput>,
    ui: mpsc::UnboundedSender<UiEvent>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        deps: Dependencies,
        user_id: impl Into<String>,
        ui: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(INBOX_CAPACITY);
        Self {
            config,
            deps,
            session: Session::new(user_id),
            state: ConnectionState::Idle,
            reconnect_attempts: 0,
            turns: Vec::new(),
            voice: None,
            next_handle: 0,
            delay_shown: false,
            polls_in_flight: HashMap::new(),
            timers: Timers::new(),
            inbox_tx,
            inbox_rx,
            ui,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.inbox_tx.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn live_handle(&self) -> Option<HandleId> {
        self.voice.as_ref().map(|v| v.id)
    }

    /// Processes inputs one at a time until an unload command arrives.
    pub async fn run(mut self) {
        info!(user_id = %self.session.user_id, "Session controller running.");
        while let Some(input) = self.inbox_rx.recv().await {
            if self.dispatch(input).await.is_break() {
                break;
            }
        }
        self.dispose();
    }

    pub async fn next_input(&mut self) -> Option<ControllerInput> {
        self.inbox_rx.recv().await
    }

    /// Applies one input. Returns `Break` once the controller has been unloaded.
    pub async fn dispatch(&mut self, input: ControllerInput) -> ControlFlow<()> {
        match input {
            ControllerInput::Start => self.start().await,
            ControllerInput::End => self.end().await,
            ControllerInput::Unload => {
                self.unload();
                return ControlFlow::Break(());
            }
            ControllerInput::Voice { handle, event } => self.on_voice_event(handle, event).await,
            ControllerInput::Tick(kind) => self.on_tick(kind),
            ControllerInput::ReconnectDue { attempt } => self.on_reconnect_due(attempt).await,
            ControllerInput::Backend { handle, outcome } => self.on_backend_outcome(handle, outcome),
        }
        ControlFlow::Continue(())
    }

    /// Releases everything the controller still holds.
    pub fn dispose(mut self) {
        if self.voice.is_some() || self.session.session_id.is_some() {
            self.unload();
        }
        self.timers.cancel_all();
        info!("Session controller disposed.");
    }

    #[instrument(skip(self), fields(user_id = %self.session.user_id))]
    pub async fn start(&mut self) {
        if !self.state.accepts_start() || self.voice.is_some() {
            debug!(state = %self.state, "Ignoring start command; a session is already active.");
            return;
        }

        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Connecting);
        self.emit(UiEvent::Controls(Controls::BUSY));

        if let Err(e) = self.deps.microphone.request_permission().await {
            warn!(error = %e, "Microphone permission denied.");
            self.notify(Notice::error(messages::PERMISSION_REQUIRED));
            self.set_state(ConnectionState::Idle);
            self.emit(UiEvent::Controls(Controls::IDLE));
            return;
        }

        if let Err(e) = self.open_voice_session(self.config.fetch_agent_id).await {
            self.fail_connect(e).await;
        }
    }

    #[instrument(skip(self), fields(session_id = ?self.session.session_id))]
    pub async fn end(&mut self) {
        if !self.state.is_active() {
            debug!(state = %self.state, "Ignoring end command; no active session.");
            return;
        }

        self.set_state(ConnectionState::Ending);
        self.emit(UiEvent::Controls(Controls::BUSY));
        self.timers.cancel_all();

        self.release_backend_session().await;
        self.close_voice().await;
        self.clear_session();
        self.reconnect_attempts = 0;

        self.set_state(ConnectionState::Idle);
        self.emit(UiEvent::Speaking(Mode::Listening));
        self.emit(UiEvent::Controls(Controls::IDLE));
        self.notify(Notice::info(messages::ENDED));
    }

    /// Best-effort teardown that never awaits the network.
    pub fn unload(&mut self) {
        info!(state = %self.state, "Unloading session controller.");
        if self.state.is_active() {
            self.set_state(ConnectionState::Ending);
        }
        self.timers.cancel_all();

        if let Some(session_id) = self.session.session_id.as_deref() {
            self.deps.backend.send_end_beacon(session_id);
        }

        if let Some(mut live) = self.voice.take() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    runtime.spawn(async move {
                        if let Err(e) = live.session.end_session().await {
                            debug!(handle = %live.id, error = %e, "Voice session close failed during unload.");
                        }
                    });
                }
                Err(_) => debug!(handle = %live.id, "No runtime available; dropping voice session."),
            }
        }

        self.clear_session();
        self.reconnect_attempts = 0;
        self.set_state(ConnectionState::Idle);
    }

    /// End and unload drop the live handle before returning, so late events
    /// from a session the user ended never reach the retry logic.
    async fn on_voice_event(&mut self, handle: HandleId, event: VoiceEvent) {
        if self.live_handle() != Some(handle) {
            debug!(%handle, ?event, "Ignoring event from a superseded voice session.");
            return;
        }

        match event {
            VoiceEvent::Connected => self.on_connected(),
            VoiceEvent::Disconnected => self.on_connection_lost("disconnected").await,
            VoiceEvent::Error(e) if e.is_connection_level() => {
                warn!(error = %e, "Voice session transport failure.");
                self.on_connection_lost("transport error").await;
            }
            VoiceEvent::Error(e) => {
                warn!(error = %e, "Voice session reported an error.");
                self.notify(Notice::error(messages::CONVERSATION_ERROR));
                if !self.state.is_active() {
                    self.emit(UiEvent::Controls(Controls::IDLE));
                }
            }
            VoiceEvent::ModeChange(mode) => self.emit(UiEvent::Speaking(mode)),
            VoiceEvent::Message { role, text } => self.on_message(role, text),
        }
    }

    fn on_connected(&mut self) {
        let reconnected = match self.state {
            ConnectionState::Connecting => false,
            ConnectionState::DisconnectedRetrying => true,
            other => {
                debug!(state = %other, "Ignoring connect event.");
                return;
            }
        };

        self.reconnect_attempts = 0;
        self.timers.cancel(TimerKind::Reconnect);
        self.set_state(ConnectionState::Connected);
        self.start_maintenance();
        self.emit(UiEvent::Controls(Controls::ACTIVE));
        self.notify(Notice::success(if reconnected {
            messages::RECONNECTED
        } else {
            messages::CONNECTED
        }));
    }

    async fn on_connection_lost(&mut self, reason: &str) {
        match self.state {
            ConnectionState::Connected => {
                warn!(reason, "Voice connection lost; reconnecting.");
                self.stop_maintenance();
                self.set_state(ConnectionState::DisconnectedRetrying);
                self.emit(UiEvent::Speaking(Mode::Listening));
                self.emit(UiEvent::Controls(Controls::ACTIVE));
                self.notify(Notice::info(messages::RECONNECTING));
                self.schedule_retry_or_give_up().await;
            }
            ConnectionState::Connecting => {
                self.fail_connect(SessionError::Transport(reason.to_string()))
                    .await;
            }
            ConnectionState::DisconnectedRetrying => {
                warn!(
                    reason,
                    attempt = self.reconnect_attempts,
                    "Reconnected voice session dropped before connecting."
                );
                self.schedule_retry_or_give_up().await;
            }
            other => debug!(state = %other, reason, "Ignoring connection loss."),
        }
    }

    async fn schedule_retry_or_give_up(&mut self) {
        if !self.config.retry.allows_another(self.reconnect_attempts) {
            self.give_up().await;
            return;
        }

        self.reconnect_attempts += 1;
        let attempt = self.reconnect_attempts;
        let delay = self.config.retry.delay_for(attempt);
        info!(
            attempt,
            delay_ms = delay.as_millis() as u64,
            "Scheduling reconnection attempt."
        );
        self.timers.start_once(
            TimerKind::Reconnect,
            delay,
            ControllerInput::ReconnectDue { attempt },
            self.inbox_tx.clone(),
        );
    }

    async fn on_reconnect_due(&mut self, attempt: u32) {
        if self.state != ConnectionState::DisconnectedRetrying || attempt != self.reconnect_attempts
        {
            debug!(attempt, state = %self.state, "Ignoring stale reconnection timer.");
            return;
        }

        self.timers.cancel(TimerKind::Reconnect);
        info!(attempt, "Attempting reconnection.");
        if let Err(e) = self.open_voice_session(false).await {
            warn!(attempt, error = %e, "Reconnection attempt failed.");
            self.schedule_retry_or_give_up().await;
        }
    }

    async fn give_up(&mut self) {
        let err = SessionError::RetryExhausted {
            attempts: self.reconnect_attempts,
        };
        error!(error = %err, "Giving up on the voice connection.");
        self.timers.cancel_all();
        self.close_voice().await;
        self.release_backend_session().await;
        self.clear_session();
        self.set_state(ConnectionState::Failed);
        self.emit(UiEvent::Speaking(Mode::Listening));
        self.emit(UiEvent::Controls(Controls::IDLE));
        self.notify(Notice::error(messages::CONNECTION_LOST));
    }

    /// Fetches a signed URL, retires any stale handle and opens a new one.
    ///
    /// The controller stays in its current state until the new handle
    /// reports `Connected`.
    async fn open_voice_session(&mut self, fetch_agent_id: bool) -> SessionResult<()> {
        let signed = self
            .deps
            .signed_urls
            .get_signed_url(&self.session.user_id, self.session.session_id.clone())
            .await?;
        if let Some(session_id) = signed.session_id {
            self.session.session_id = Some(session_id);
        }

        if fetch_agent_id {
            let agent_id = self.deps.signed_urls.get_agent_id().await?;
            self.emit(UiEvent::AgentId(agent_id.clone()));
            self.session.agent_id = Some(agent_id);
        }

        self.close_voice().await;

        self.next_handle += 1;
        let handle = HandleId(self.next_handle);
        let sink = VoiceEventSink::new(handle, self.inbox_tx.clone());
        let session = self
            .deps
            .voice
            .open(signed.url.expose_secret(), sink)
            .await?;
        self.voice = Some(LiveVoice { id: handle, session });
        info!(%handle, session_id = ?self.session.session_id, "Voice session opened.");
        Ok(())
    }

    async fn fail_connect(&mut self, err: SessionError) {
        error!(error = %err, "Failed to start conversation.");
        self.timers.cancel_all();
        self.close_voice().await;
        self.set_state(ConnectionState::Failed);
        self.notify(Notice::error(messages::START_FAILED));
        self.set_state(ConnectionState::Idle);
        self.emit(UiEvent::Controls(Controls::IDLE));
    }

    /// Closes the live handle, if any. Failures are logged and swallowed.
    async fn close_voice(&mut self) {
        if let Some(mut live) = self.voice.take() {
            match live.session.end_session().await {
                Ok(()) => debug!(handle = %live.id, "Voice session closed."),
                Err(e) => warn!(handle = %live.id, error = %e, "Failed to close voice session."),
            }
        }
    }

    /// Stores the history (if any) and tells the backend the session is over.
    /// Both calls are best-effort.
    async fn release_backend_session(&mut self) {
        let Some(session_id) = self.session.session_id.clone() else {
            return;
        };
        if !self.turns.is_empty() {
            if let Err(e) = self
                .deps
                .backend
                .store_conversation(&self.session.user_id, &session_id, &self.turns)
                .await
            {
                warn!(error = %e, "Failed to store conversation history.");
            }
        }
        if let Err(e) = self.deps.backend.end_session(&session_id).await {
            warn!(error = %e, "Failed to notify backend of session end.");
        }
    }

    fn clear_session(&mut self) {
        self.session.session_id = None;
        self.session.agent_id = None;
        self.turns.clear();
        self.delay_shown = false;
        self.polls_in_flight.clear();
    }

    fn start_maintenance(&mut self) {
        self.timers.start_interval(
            TimerKind::KeepAlive,
            self.config.keep_alive_interval,
            self.inbox_tx.clone(),
        );
        if self.config.polling_enabled {
            self.timers.start_interval(
                TimerKind::ReminderPoll,
                self.config.poll_interval,
                self.inbox_tx.clone(),
            );
            self.timers.start_interval(
                TimerKind::DelayPoll,
                self.config.poll_interval,
                self.inbox_tx.clone(),
            );
        }
    }

    fn stop_maintenance(&mut self) {
        self.timers.cancel(TimerKind::KeepAlive);
        self.timers.cancel(TimerKind::ReminderPoll);
        self.timers.cancel(TimerKind::DelayPoll);
    }

    /// Maintenance calls run off the inbox; poll results come back as
    /// [`ControllerInput::Backend`].
    fn on_tick(&mut self, kind: TimerKind) {
        if self.state != ConnectionState::Connected {
            trace!(?kind, state = %self.state, "Dropping maintenance tick.");
            return;
        }
        let (Some(session_id), Some(handle)) =
            (self.session.session_id.clone(), self.live_handle())
        else {
            trace!(?kind, "No session id yet; skipping maintenance tick.");
            return;
        };
        let backend = Arc::clone(&self.deps.backend);

        match kind {
            TimerKind::KeepAlive => {
                tokio::spawn(async move {
                    if let Err(e) = backend.keep_alive(&session_id).await {
                        warn!(error = %e, "Keep-alive failed.");
                    }
                });
            }
            TimerKind::ReminderPoll | TimerKind::DelayPoll => {
                if self.polls_in_flight.get(&kind) == Some(&handle) {
                    trace!(?kind, "Previous poll still in flight; skipping tick.");
                    return;
                }
                self.polls_in_flight.insert(kind, handle);
                let inbox = self.inbox_tx.clone();
                tokio::spawn(async move {
                    let outcome = if kind == TimerKind::ReminderPoll {
                        BackendOutcome::Reminders(backend.check_reminders(&session_id).await)
                    } else {
                        BackendOutcome::Delay(backend.check_delay(&session_id).await)
                    };
                    if inbox
                        .send(ControllerInput::Backend { handle, outcome })
                        .await
                        .is_err()
                    {
                        trace!(?kind, "Controller gone; dropping poll result.");
                    }
                });
            }
            TimerKind::Reconnect => {}
        }
    }

    fn on_backend_outcome(&mut self, handle: HandleId, outcome: BackendOutcome) {
        let poll = match outcome {
            BackendOutcome::Reminders(_) => Some(TimerKind::ReminderPoll),
            BackendOutcome::Delay(_) => Some(TimerKind::DelayPoll),
            BackendOutcome::MessageProcessed(_) => None,
        };
        if let Some(kind) = poll {
            if self.polls_in_flight.get(&kind) == Some(&handle) {
                self.polls_in_flight.remove(&kind);
            }
        }

        if self.live_handle() != Some(handle) {
            debug!(%handle, "Ignoring backend result for a superseded voice session.");
            return;
        }

        match outcome {
            BackendOutcome::Reminders(result) => self.deliver_reminders(result),
            BackendOutcome::Delay(result) => self.show_delay(result),
            BackendOutcome::MessageProcessed(Ok(true)) => {
                self.notify(Notice::info(messages::REPLY_DELAYED))
            }
            BackendOutcome::MessageProcessed(Ok(false)) => {}
            BackendOutcome::MessageProcessed(Err(e)) => {
                warn!(error = %e, "Failed to forward user message.")
            }
        }
    }

    fn deliver_reminders(&mut self, result: SessionResult<Vec<Reminder>>) {
        let reminders = match result {
            Ok(reminders) => reminders,
            Err(e) => {
                debug!(error = %e, "Reminder poll failed.");
                return;
            }
        };
        for reminder in reminders {
            let text = format!("Reminder: {}", reminder.task);
            info!(task = %reminder.task, "Delivering reminder.");
            self.record_turn(ConversationTurn::new(Role::Assistant, text.clone()));
            self.notify(Notice::info(text));
        }
    }

    fn show_delay(&mut self, result: SessionResult<DelayStatus>) {
        match result {
            Ok(status) if status.has_active_delay => {
                self.delay_shown = true;
                self.emit(UiEvent::Delay(Some(status.remaining_seconds)));
            }
            Ok(_) => {
                if self.delay_shown {
                    self.delay_shown = false;
                    self.emit(UiEvent::Delay(None));
                }
            }
            Err(e) => debug!(error = %e, "Delay poll failed."),
        }
    }

    fn on_message(&mut self, role: Role, text: String) {
        self.record_turn(ConversationTurn::new(role, text.clone()));
        if role != Role::User {
            return;
        }
        let (Some(session_id), Some(handle)) =
            (self.session.session_id.clone(), self.live_handle())
        else {
            return;
        };
        let backend = Arc::clone(&self.deps.backend);
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let outcome = BackendOutcome::MessageProcessed(
                backend.process_message(&session_id, &text).await,
            );
            if inbox
                .send(ControllerInput::Backend { handle, outcome })
                .await
                .is_err()
            {
                trace!("Controller gone; dropping process-message result.");
            }
        });
    }

    fn record_turn(&mut self, turn: ConversationTurn) {
        self.turns.push(turn.clone());
        self.emit(UiEvent::Turn(turn));
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }
        info!(from = %self.state, to = %state, "Session state changed.");
        self.state = state;
        self.emit(UiEvent::State(state));
    }

    fn notify(&self, notice: Notice) {
        self.emit(UiEvent::Notice(notice));
    }

    fn emit(&self, event: UiEvent) {
        if self.ui.send(event).is_err() {
            trace!("Presenter gone; dropping UI event.");
        }
    }
}
